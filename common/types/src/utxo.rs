use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Address, BlockNumber};

/// Position of an output in the chain. Ordering follows creation order.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct UtxoKey {
    pub blk_num: BlockNumber,
    pub tx_index: u32,
    pub o_index: u8,
}

impl UtxoKey {
    pub fn new(blk_num: BlockNumber, tx_index: u32, o_index: u8) -> Self {
        Self {
            blk_num,
            tx_index,
            o_index,
        }
    }
}

impl Display for UtxoKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.blk_num, self.tx_index, self.o_index)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Utxo {
    pub key: UtxoKey,
    pub owner: Address,
    pub denom: u64,
}

impl Utxo {
    pub fn new(key: UtxoKey, owner: Address, denom: u64) -> Self {
        Self { key, owner, denom }
    }
}

/// Deposit observed on the root chain, credited in the block it was queued for.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deposit {
    pub from: Address,
    pub amount: u64,
}

/// Finalized exit observed on the root chain; the referenced output leaves
/// the child chain in the block it was queued for.
pub type Withdrawal = UtxoKey;
