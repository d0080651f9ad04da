pub mod assembler;
pub mod chain_state;
pub mod consensus;
pub mod errors;
pub mod merge;
pub mod root_chain;
pub mod utxo;

#[cfg(test)]
mod tests;

pub use crate::chain_state::{ChainState, ChainStatus, LedgerState};
pub use crate::errors::BlockChainError;
pub use crate::merge::plan_merges;
pub use crate::root_chain::DevRootChain;
pub use crate::utxo::UtxoSet;

pub(crate) const CHAIN_LOG_TARGET: &str = "chain";
