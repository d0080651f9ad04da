use account::account_from_seed;
use types::tx::{Transaction, TxOutput};
use types::utxo::UtxoKey;

use crate::{TxPool, TxPoolError};

fn transfer(blk_num: u32, to_seed: u64, denom: u64) -> Transaction {
    let to = account_from_seed(to_seed).address;
    Transaction::new(
        &[UtxoKey::new(blk_num, 0, 0)],
        &[TxOutput::new(to, denom)],
        0,
    )
    .unwrap()
}

#[test]
fn test_pool_keeps_admission_order() {
    let mut pool = TxPool::new();
    let txs = vec![transfer(3, 1, 5), transfer(1, 2, 5), transfer(2, 3, 5)];
    for tx in txs.iter() {
        pool.add(*tx).unwrap();
    }
    assert_eq!(pool.pending(), txs);
    assert_eq!(pool.len(), 3);
}

#[test]
fn test_duplicate_is_rejected() {
    let mut pool = TxPool::new();
    let tx = transfer(1, 1, 5);
    let hash = pool.add(tx).unwrap();
    let err = pool.add(tx).unwrap_err();
    assert_eq!(
        err.downcast_ref::<TxPoolError>(),
        Some(&TxPoolError::PoolDuplicate(hash))
    );
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_conflicting_spend_is_rejected() {
    let mut pool = TxPool::new();
    let first = transfer(1, 1, 5);
    let second = transfer(1, 2, 5);
    let hash = pool.add(first).unwrap();
    let err = pool.add(second).unwrap_err();
    assert_eq!(
        err.downcast_ref::<TxPoolError>(),
        Some(&TxPoolError::InputAlreadyClaimed(UtxoKey::new(1, 0, 0), hash))
    );
    assert_eq!(pool.claimed.get(&UtxoKey::new(1, 0, 0)), Some(&hash));
}

#[test]
fn test_remove_releases_claims() {
    let mut pool = TxPool::new();
    let first = transfer(1, 1, 5);
    let keep = transfer(2, 1, 5);
    let hash = pool.add(first).unwrap();
    let kept = pool.add(keep).unwrap();
    assert_eq!(pool.remove_all([hash].iter()), 1);
    assert!(!pool.claimed.contains_key(&UtxoKey::new(1, 0, 0)));
    assert!(pool.add(transfer(1, 2, 5)).is_ok());
    assert_eq!(pool.pending()[0].hash(), kept);
    assert!(pool.remove(&hash).is_none());
}
