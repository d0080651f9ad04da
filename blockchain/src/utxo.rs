use std::collections::{BTreeMap, HashSet};

use anyhow::Result;

use types::tx::Transaction;
use types::utxo::{Utxo, UtxoKey};
use types::{Address, BlockNumber};

use crate::errors::content_error;

/// Live outputs keyed by position. Iteration is oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: BTreeMap<UtxoKey, Utxo>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &UtxoKey) -> Option<&Utxo> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &UtxoKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utxo> {
        self.entries.values()
    }

    pub fn to_vec(&self) -> Vec<Utxo> {
        self.entries.values().copied().collect()
    }

    pub fn owned_by(&self, owner: &Address) -> Vec<Utxo> {
        self.entries
            .values()
            .filter(|utxo| utxo.owner == *owner)
            .copied()
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn balance_of(&self, owner: &Address) -> u128 {
        self.entries
            .values()
            .filter(|utxo| utxo.owner == *owner)
            .map(|utxo| utxo.denom as u128)
            .sum()
    }

    /// Spends the inputs of `tx` and creates its outputs at
    /// `(blk_num, tx_index, o_index)`. Nothing changes unless every input is
    /// live and every new key is free.
    pub fn apply(&mut self, blk_num: BlockNumber, tx_index: u32, tx: &Transaction) -> Result<()> {
        let mut spent = HashSet::new();
        for input in tx.present_inputs() {
            let key = input.key();
            if !self.entries.contains_key(&key) {
                return Err(content_error(format!("output {} is not spendable", key)));
            }
            if !spent.insert(key) {
                return Err(content_error(format!("output {} spent twice", key)));
            }
        }
        let created: Vec<Utxo> = tx
            .present_outputs()
            .map(|(o_index, output)| {
                Utxo::new(
                    UtxoKey::new(blk_num, tx_index, o_index),
                    output.owner,
                    output.denom,
                )
            })
            .collect();
        for utxo in created.iter() {
            if self.entries.contains_key(&utxo.key) && !spent.contains(&utxo.key) {
                return Err(content_error(format!("output {} already exists", utxo.key)));
            }
        }

        for key in spent {
            self.entries.remove(&key);
        }
        for utxo in created {
            self.entries.insert(utxo.key, utxo);
        }
        Ok(())
    }
}

impl FromIterator<Utxo> for UtxoSet {
    fn from_iter<T: IntoIterator<Item = Utxo>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|utxo| (utxo.key, utxo)).collect(),
        }
    }
}
