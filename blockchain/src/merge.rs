use types::tx::Transaction;
use types::Address;

use crate::utxo::UtxoSet;

/// Pairs the owner's outputs oldest first into disjoint MERGE transactions.
/// A pair whose sum would overflow is left alone.
pub fn plan_merges(utxos: &UtxoSet, owner: &Address) -> Vec<Transaction> {
    utxos
        .owned_by(owner)
        .chunks_exact(2)
        .filter(|pair| pair[0].denom.checked_add(pair[1].denom).is_some())
        .map(|pair| Transaction::merge(&pair[0], &pair[1]))
        .collect()
}
