use getset::{CopyGetters, Getters, Setters};
use merkle::{Merkle, MerkleError, MerkleProof};
use rlp::Rlp;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::tx::Transaction;
use crate::{BlockHash, BlockNumber, Signature, BLOCK_CAPACITY, EMPTY_LEAF, H256};

/// Block number and the two hashes; the operator signs these bytes.
pub const UNSIGNED_HEADER_LENGTH: usize = 4 + 32 + 32;
pub const HEADER_LENGTH: usize = UNSIGNED_HEADER_LENGTH + 65;

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Getters, CopyGetters, Setters)]
pub struct BlockHeader {
    #[getset(get_copy = "pub")]
    number: BlockNumber,
    #[getset(get = "pub")]
    previous_hash: H256,
    #[getset(get = "pub")]
    merkle_root: H256,
    #[getset(get = "pub", set = "pub")]
    signature: Signature,
}

impl BlockHeader {
    pub fn new(number: BlockNumber, previous_hash: H256, merkle_root: H256) -> Self {
        Self {
            number,
            previous_hash,
            merkle_root,
            signature: Signature::zero(),
        }
    }

    pub fn encode(&self, include_signature: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LENGTH);
        out.extend_from_slice(&self.number.to_be_bytes());
        out.extend_from_slice(self.previous_hash.as_bytes());
        out.extend_from_slice(self.merkle_root.as_bytes());
        if include_signature {
            out.extend_from_slice(self.signature.as_bytes());
        }
        out
    }

    pub fn sig_message(&self) -> Vec<u8> {
        self.encode(false)
    }

    pub fn hash(&self) -> BlockHash {
        crypto::keccak256(self.encode(true))
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != HEADER_LENGTH {
            return Err(CodecError::MalformedBlock(format!(
                "header must be {} bytes, got {}",
                HEADER_LENGTH,
                buf.len()
            )));
        }
        let mut number = [0_u8; 4];
        number.copy_from_slice(&buf[..4]);
        let signature = Signature::from_slice(&buf[UNSIGNED_HEADER_LENGTH..])
            .ok_or_else(|| CodecError::MalformedBlock("bad header signature".to_string()))?;
        Ok(Self {
            number: u32::from_be_bytes(number),
            previous_hash: H256::from_slice(&buf[4..36]),
            merkle_root: H256::from_slice(&buf[36..68]),
            signature,
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &Vec<Transaction> {
        &self.transactions
    }

    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    pub fn previous_hash(&self) -> &H256 {
        &self.header.previous_hash
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// Signed encodings of the occupied slots, in slot order.
    pub fn slots(&self) -> Vec<Vec<u8>> {
        transaction_slots(&self.transactions)
    }

    pub fn merkle_tree(&self) -> Result<Merkle, MerkleError> {
        let mut tree = Merkle::new(BLOCK_CAPACITY, EMPTY_LEAF, &self.slots())?;
        tree.build_tree();
        Ok(tree)
    }

    /// Slot encoding and inclusion proof for the transaction at `tx_index`.
    pub fn transaction_proof(&self, tx_index: usize) -> Result<(Vec<u8>, MerkleProof), MerkleError> {
        let tx = self
            .transactions
            .get(tx_index)
            .ok_or(MerkleError::IndexOutOfRange(tx_index))?;
        let proof = self.merkle_tree()?.proof(tx_index)?;
        Ok((tx.encode(true), proof))
    }

    /// Header followed by every slot, unused ones as [`EMPTY_LEAF`].
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode(true);
        for slot in self.slots() {
            out.extend_from_slice(&slot);
        }
        for _ in self.transactions.len()..BLOCK_CAPACITY {
            out.extend_from_slice(EMPTY_LEAF);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let (block, consumed) = Block::decode_prefix(buf)?;
        if consumed != buf.len() {
            return Err(CodecError::MalformedBlock(
                "trailing bytes after block".to_string(),
            ));
        }
        Ok(block)
    }

    /// Decodes one block from the front of `buf`, returning the bytes consumed.
    pub fn decode_prefix(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        if buf.len() < HEADER_LENGTH {
            return Err(CodecError::MalformedBlock("truncated header".to_string()));
        }
        let header = BlockHeader::decode(&buf[..HEADER_LENGTH])?;
        let mut offset = HEADER_LENGTH;
        let mut transactions = Vec::new();
        let mut seen_empty = false;
        for slot in 0..BLOCK_CAPACITY {
            let rest = &buf[offset..];
            let total = Rlp::new(rest)
                .payload_info()
                .map(|info| info.total())
                .map_err(|e| CodecError::MalformedBlock(format!("slot {}: {}", slot, e)))?;
            if total > rest.len() {
                return Err(CodecError::MalformedBlock(format!("slot {} truncated", slot)));
            }
            let item = &rest[..total];
            if item == EMPTY_LEAF {
                seen_empty = true;
            } else if seen_empty {
                return Err(CodecError::MalformedBlock(format!(
                    "slot {} occupied after an empty slot",
                    slot
                )));
            } else {
                let tx = Transaction::decode(item)
                    .map_err(|e| CodecError::MalformedBlock(format!("slot {}: {}", slot, e)))?;
                transactions.push(tx);
            }
            offset += total;
        }
        Ok((Block::new(header, transactions), offset))
    }
}

pub fn transaction_slots(transactions: &[Transaction]) -> Vec<Vec<u8>> {
    transactions.iter().map(|tx| tx.encode(true)).collect()
}

pub fn compute_merkle_root(transactions: &[Transaction]) -> Result<H256, MerkleError> {
    let tree = Merkle::new(BLOCK_CAPACITY, EMPTY_LEAF, &transaction_slots(transactions))?;
    Ok(tree.compute_root())
}

/// Hard coded first block: number 0, zero previous hash, no transactions
/// and no signature.
pub fn genesis_block() -> Block {
    let merkle_root = compute_merkle_root(&[]).unwrap_or_default();
    Block::new(BlockHeader::new(0, H256::zero(), merkle_root), vec![])
}

pub fn encode_chain<'a, I>(blocks: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Block>,
{
    let mut out = Vec::new();
    for block in blocks {
        out.extend(block.encode());
    }
    out
}

pub fn decode_chain(mut buf: &[u8]) -> Result<Vec<Block>, CodecError> {
    let mut blocks = Vec::new();
    while !buf.is_empty() {
        let (block, consumed) = Block::decode_prefix(buf)?;
        blocks.push(block);
        buf = &buf[consumed..];
    }
    Ok(blocks)
}
