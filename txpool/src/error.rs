use thiserror::Error;
use types::utxo::UtxoKey;
use types::TxHash;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TxPoolError {
    #[error("PoolDuplicate `{0:?}`")]
    PoolDuplicate(TxHash),
    #[error("input {0} already claimed by pending transaction {1:?}")]
    InputAlreadyClaimed(UtxoKey, TxHash),
}
