use serde::{Deserialize, Serialize};

use codec::{impl_codec, Decoder, Encoder};
use types::block::{decode_chain, encode_chain, Block};
use types::error::CodecError;
use types::tx::Transaction;
use types::PeerId;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum MessageKind {
    QueryLatest,
    QueryAll,
    ResponseChain,
    ResponseTransaction,
}

impl MessageKind {
    pub fn tag(&self) -> u8 {
        match self {
            MessageKind::QueryLatest => 0,
            MessageKind::QueryAll => 1,
            MessageKind::ResponseChain => 2,
            MessageKind::ResponseTransaction => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::QueryLatest),
            1 => Some(MessageKind::QueryAll),
            2 => Some(MessageKind::ResponseChain),
            3 => Some(MessageKind::ResponseTransaction),
            _ => None,
        }
    }
}

/// Wire envelope: a kind tag and its payload. Chain payloads are
/// concatenated block encodings, transaction payloads the signed encoding.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct PeerMessage {
    kind: u8,
    data: Vec<u8>,
}

impl_codec!(PeerMessage);

impl PeerMessage {
    pub fn new(kind: MessageKind, data: Vec<u8>) -> Self {
        Self {
            kind: kind.tag(),
            data,
        }
    }

    pub fn query_latest() -> Self {
        Self::new(MessageKind::QueryLatest, vec![])
    }

    pub fn query_all() -> Self {
        Self::new(MessageKind::QueryAll, vec![])
    }

    pub fn response_chain<'a, I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a Block>,
    {
        Self::new(MessageKind::ResponseChain, encode_chain(blocks))
    }

    pub fn response_transaction(tx: &Transaction) -> Self {
        Self::new(MessageKind::ResponseTransaction, tx.encode(true))
    }

    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(self.kind)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn blocks(&self) -> Result<Vec<Block>, CodecError> {
        decode_chain(&self.data)
    }

    pub fn transaction(&self) -> Result<Transaction, CodecError> {
        Transaction::decode(&self.data)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PeerTarget {
    Peer(PeerId),
    All,
    AllExcept(PeerId),
}

#[derive(Debug, Clone)]
pub struct NodeToPeerMessage {
    pub target: PeerTarget,
    pub message: PeerMessage,
}

impl NodeToPeerMessage {
    pub fn new(target: PeerTarget, message: PeerMessage) -> Self {
        Self { target, message }
    }
}
