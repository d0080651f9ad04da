use std::collections::HashMap;

use anyhow::Result;
use indexmap::IndexMap;
use tracing::{debug, trace};

use types::tx::Transaction;
use types::utxo::UtxoKey;
use types::TxHash;

pub use crate::error::TxPoolError;

mod error;
#[cfg(test)]
mod tests;

const TXPOOL_LOG_TARGET: &str = "txpool";

/// Pending transactions in admission order, keyed by hash. Also tracks which
/// outputs are already claimed so a second spend of the same output is
/// refused at the door.
#[derive(Debug, Clone, Default)]
pub struct TxPool {
    all: IndexMap<TxHash, Transaction>,
    claimed: HashMap<UtxoKey, TxHash>,
}

impl TxPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.all.contains_key(hash)
    }

    pub fn get(&self, hash: &TxHash) -> Option<&Transaction> {
        self.all.get(hash)
    }

    /// Appends `tx` at the tail. Validation against the ledger is the
    /// caller's job; the pool only refuses duplicates and conflicting spends.
    pub fn add(&mut self, tx: Transaction) -> Result<TxHash> {
        let hash = tx.hash();
        anyhow::ensure!(!self.all.contains_key(&hash), {
            trace!(target: TXPOOL_LOG_TARGET, hash = ?hash, "Discarding already known transaction");
            TxPoolError::PoolDuplicate(hash)
        });
        for input in tx.present_inputs() {
            if let Some(other) = self.claimed.get(&input.key()) {
                trace!(target: TXPOOL_LOG_TARGET, hash = ?hash, input = %input.key(), "Discarding conflicting transaction");
                anyhow::bail!(TxPoolError::InputAlreadyClaimed(input.key(), *other));
            }
        }
        for input in tx.present_inputs() {
            self.claimed.insert(input.key(), hash);
        }
        self.all.insert(hash, tx);
        trace!(target: TXPOOL_LOG_TARGET, hash = ?hash, pending = self.all.len(), "Pooled new transaction");
        Ok(hash)
    }

    pub fn remove(&mut self, hash: &TxHash) -> Option<Transaction> {
        let tx = self.all.shift_remove(hash)?;
        for input in tx.present_inputs() {
            if self.claimed.get(&input.key()) == Some(hash) {
                self.claimed.remove(&input.key());
            }
        }
        Some(tx)
    }

    pub fn remove_all<'a, I>(&mut self, hashes: I) -> usize
    where
        I: IntoIterator<Item = &'a TxHash>,
    {
        let removed = hashes
            .into_iter()
            .filter_map(|hash| self.remove(hash))
            .count();
        if removed > 0 {
            debug!(target: TXPOOL_LOG_TARGET, removed, pending = self.all.len(), "Removed transactions from pool");
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TxHash, &Transaction)> {
        self.all.iter()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.all.values().copied().collect()
    }
}
