use std::sync::Arc;

use crate::block::Block;
use crate::tx::Transaction;

/// Raised by local components; the node turns these into peer traffic.
#[derive(Clone, Debug)]
pub enum LocalEventMessage {
    MinedBlock(Arc<Block>),
    BroadcastTx(Transaction),
    AddPeer(String),
}
