use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use merkle::MerkleProof;
use primitive_types::H256;
use types::block::Block;
use types::utxo::{Deposit, UtxoKey, Withdrawal};
use types::{Address, BlockNumber, PeerId, Signature};

/// Root chain contract and the signing oracle attached to it. Every call may
/// fail; callers abort the operation in progress and never retry.
#[async_trait]
pub trait RootChain: Send + Sync {
    async fn get_deposits(&self, block_number: BlockNumber) -> Result<Vec<Deposit>>;

    async fn get_withdrawals(&self, block_number: BlockNumber) -> Result<Vec<Withdrawal>>;

    async fn submit_block_header(&self, header: &[u8]) -> Result<()>;

    async fn sign_block(&self, message: &[u8]) -> Result<Signature>;

    async fn sign_transaction(&self, message: &[u8], address: &Address) -> Result<Signature>;

    async fn is_valid_signature(
        &self,
        message: &[u8],
        signature: &Signature,
        address: &Address,
    ) -> Result<bool>;
}

/// Proof that `tx` sits in slot `key.tx_index` of block `key.blk_num`.
#[derive(Debug, Clone)]
pub struct InclusionClaim {
    pub key: UtxoKey,
    pub tx: Vec<u8>,
    pub proof: MerkleProof,
    pub from: Address,
}

/// Withdrawal side of the root chain contract.
#[async_trait]
pub trait ExitGame: Send + Sync {
    /// Locks `amount` on the root chain; returns the child block that credits it.
    async fn deposit(&self, from: Address, amount: u64) -> Result<BlockNumber>;

    async fn start_withdrawal(&self, claim: InclusionClaim) -> Result<H256>;

    async fn challenge_withdrawal(&self, exit_id: H256, claim: InclusionClaim) -> Result<()>;

    async fn finalize_withdrawal(&self, from: Address) -> Result<Vec<Withdrawal>>;
}

/// Read access to the committed chain.
pub trait ChainReader: Send + Sync {
    fn head(&self) -> Arc<Block>;

    /// Every block from genesis to head.
    fn blocks(&self) -> Vec<Arc<Block>>;
}

/// Consumer of messages arriving on a peer connection.
#[async_trait]
pub trait Handler<T: Send + 'static>: Send + Sync {
    async fn handle(&self, peer_id: PeerId, msg: T);
}
