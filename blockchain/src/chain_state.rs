use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use merkle::MerkleProof;
use primitive_types::H256;
use traits::{ChainReader, RootChain};
use txpool::{TxPool, TxPoolError};
use types::block::{genesis_block, Block};
use types::tx::{Transaction, TxOutput};
use types::utxo::UtxoKey;
use types::{Address, BlockNumber, TxHash};

use crate::assembler::assemble;
use crate::consensus::{validate_block, validate_transaction};
use crate::errors::{content_error, root_chain_error, BlockChainError};
use crate::utxo::UtxoSet;
use crate::CHAIN_LOG_TARGET;

/// One consistent view of the ledger. Replaced wholesale on every commit.
#[derive(Debug, Clone)]
pub struct LedgerState {
    blocks: Vec<Arc<Block>>,
    utxos: UtxoSet,
    pool: TxPool,
}

impl LedgerState {
    fn genesis() -> Self {
        Self {
            blocks: vec![Arc::new(genesis_block())],
            utxos: UtxoSet::new(),
            pool: TxPool::new(),
        }
    }

    pub fn blocks(&self) -> &[Arc<Block>] {
        &self.blocks
    }

    pub fn head(&self) -> &Arc<Block> {
        // never empty, genesis is always present
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn pool(&self) -> &TxPool {
        &self.pool
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChainStatus {
    pub height: BlockNumber,
    pub head_hash: H256,
    pub utxos: usize,
    pub pending: usize,
}

/// Owner of the canonical chain, the UTXO set and the pool.
///
/// Mutations (admission, append, replace, assembly) are serialized by `lock`,
/// which is held across root chain calls. Each one works on a copy and
/// publishes it with a single pointer swap, so readers holding a snapshot
/// never see a half-applied block.
pub struct ChainState {
    lock: Mutex<()>,
    state: RwLock<Arc<LedgerState>>,
    oracle: Arc<dyn RootChain>,
    operator: Address,
    is_operator: bool,
}

impl ChainState {
    pub fn new(oracle: Arc<dyn RootChain>, operator: Address, is_operator: bool) -> Self {
        let state = LedgerState::genesis();
        info!(target: CHAIN_LOG_TARGET, genesis = ?state.head().hash(), operator = ?operator, "Chain state started from genesis");
        Self {
            lock: Mutex::new(()),
            state: RwLock::new(Arc::new(state)),
            oracle,
            operator,
            is_operator,
        }
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn is_operator(&self) -> bool {
        self.is_operator
    }

    pub fn snapshot(&self) -> Arc<LedgerState> {
        self.state.read().clone()
    }

    pub fn head(&self) -> Arc<Block> {
        self.snapshot().head().clone()
    }

    pub fn blocks(&self) -> Vec<Arc<Block>> {
        self.snapshot().blocks.clone()
    }

    pub fn block(&self, number: BlockNumber) -> Result<Arc<Block>> {
        match self.snapshot().blocks.get(number as usize) {
            Some(block) => Ok(block.clone()),
            None => bail!(BlockChainError::BlockNotFound(number)),
        }
    }

    pub fn height(&self) -> BlockNumber {
        self.snapshot().head().number()
    }

    pub fn utxos(&self) -> UtxoSet {
        self.snapshot().utxos.clone()
    }

    pub fn pool(&self) -> Vec<Transaction> {
        self.snapshot().pool.pending()
    }

    pub fn status(&self) -> ChainStatus {
        let snapshot = self.snapshot();
        ChainStatus {
            height: snapshot.head().number(),
            head_hash: snapshot.head().hash(),
            utxos: snapshot.utxos.len(),
            pending: snapshot.pool.len(),
        }
    }

    /// Signed encoding and inclusion proof of a committed transaction.
    pub fn transaction_proof(
        &self,
        number: BlockNumber,
        tx_index: u32,
    ) -> Result<(Vec<u8>, MerkleProof)> {
        let block = self.block(number)?;
        Ok(block.transaction_proof(tx_index as usize)?)
    }

    fn commit(&self, next: LedgerState) {
        *self.state.write() = Arc::new(next);
    }

    /// Admits a NORMAL transaction at the tail of the pool.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<TxHash> {
        let _guard = self.lock.lock().await;
        let snapshot = self.snapshot();
        let hash = tx.hash();
        if snapshot.pool.contains(&hash) {
            bail!(TxPoolError::PoolDuplicate(hash));
        }
        if !tx.is_normal() {
            return Err(content_error(format!(
                "{} transactions are created by the operator only",
                tx.tx_type
            )));
        }
        validate_transaction(&tx, &snapshot.utxos, self.oracle.as_ref()).await?;

        let mut pool = snapshot.pool.clone();
        if let Err(error) = pool.add(tx) {
            return match error.downcast_ref::<TxPoolError>() {
                Some(TxPoolError::InputAlreadyClaimed(key, other)) => Err(content_error(format!(
                    "output {} already spent by pending {:?}",
                    key, other
                ))),
                _ => Err(error),
            };
        }
        self.commit(LedgerState {
            blocks: snapshot.blocks.clone(),
            utxos: snapshot.utxos.clone(),
            pool,
        });
        debug!(target: CHAIN_LOG_TARGET, hash = ?hash, "Transaction admitted");
        Ok(hash)
    }

    /// Builds a transaction spending `inputs`, has the oracle sign every input
    /// for `from`, then admits it.
    pub async fn create_transaction(
        &self,
        inputs: &[UtxoKey],
        outputs: &[TxOutput],
        fee: u64,
        from: &Address,
    ) -> Result<Transaction> {
        let mut tx = Transaction::new(inputs, outputs, fee)?;
        let message = tx.sig_message();
        for slot in 0..inputs.len() {
            let signature = self
                .oracle
                .sign_transaction(&message, from)
                .await
                .map_err(root_chain_error)?;
            tx.set_signature(slot, signature);
        }
        self.submit_transaction(tx).await?;
        Ok(tx)
    }

    /// Extends the chain by one block that validates against the head.
    pub async fn append(&self, block: Block) -> Result<Arc<Block>> {
        let _guard = self.lock.lock().await;
        let snapshot = self.snapshot();
        let utxos = validate_block(
            &block,
            snapshot.head(),
            &snapshot.utxos,
            self.oracle.as_ref(),
            &self.operator,
        )
        .await?;

        let block = Arc::new(block);
        let mut pool = snapshot.pool.clone();
        let pruned = prune_pool(&mut pool, &utxos);
        let mut blocks = snapshot.blocks.clone();
        blocks.push(block.clone());
        self.commit(LedgerState {
            blocks,
            utxos,
            pool,
        });
        info!(target: CHAIN_LOG_TARGET, number = block.number(), hash = ?block.hash(), pruned, "Appended block");
        Ok(block)
    }

    /// Swaps in `candidate` if it starts at our genesis, is strictly longer
    /// than the local chain and validates from genesis to tip.
    pub async fn replace(&self, candidate: Vec<Block>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let snapshot = self.snapshot();

        let first = match candidate.first() {
            Some(first) => first,
            None => bail!(BlockChainError::EmptyChain),
        };
        if first.encode() != genesis_block().encode() {
            bail!(BlockChainError::GenesisMismatch(first.hash()));
        }
        if candidate.len() <= snapshot.blocks.len() {
            bail!(BlockChainError::ChainInvalid(format!(
                "candidate length {} does not exceed local length {}",
                candidate.len(),
                snapshot.blocks.len()
            )));
        }

        let mut utxos = UtxoSet::new();
        for pair in candidate.windows(2) {
            let (previous, block) = (&pair[0], &pair[1]);
            utxos = match validate_block(
                block,
                previous,
                &utxos,
                self.oracle.as_ref(),
                &self.operator,
            )
            .await
            {
                Ok(utxos) => utxos,
                Err(error) => {
                    if let Some(BlockChainError::RootChainError(_)) =
                        error.downcast_ref::<BlockChainError>()
                    {
                        return Err(error);
                    }
                    warn!(target: CHAIN_LOG_TARGET, number = block.number(), error = %error, "Rejected candidate chain");
                    bail!(BlockChainError::ChainInvalid(format!(
                        "block {}: {}",
                        block.number(),
                        error
                    )));
                }
            };
        }

        let mut pool = TxPool::new();
        for tx in snapshot.pool.pending() {
            let readmitted = validate_transaction(&tx, &utxos, self.oracle.as_ref())
                .await
                .is_ok()
                && pool.add(tx).is_ok();
            if !readmitted {
                debug!(target: CHAIN_LOG_TARGET, hash = ?tx.hash(), "Dropped pending transaction after replace");
            }
        }

        let blocks: Vec<Arc<Block>> = candidate.into_iter().map(Arc::new).collect();
        info!(
            target: CHAIN_LOG_TARGET,
            from = snapshot.head().number(),
            to = blocks.len() - 1,
            pending = pool.len(),
            "Replaced chain"
        );
        self.commit(LedgerState {
            blocks,
            utxos,
            pool,
        });
        Ok(())
    }

    /// Assembles, signs, submits and appends the next block.
    pub async fn assemble_block(&self) -> Result<Arc<Block>> {
        if !self.is_operator {
            bail!(BlockChainError::NotOperator);
        }
        let _guard = self.lock.lock().await;
        let snapshot = self.snapshot();
        let assembled = assemble(
            snapshot.head(),
            &snapshot.utxos,
            &snapshot.pool,
            self.oracle.as_ref(),
        )
        .await?;

        let mut pool = snapshot.pool.clone();
        pool.remove_all(assembled.included.iter().chain(assembled.stale.iter()));
        prune_pool(&mut pool, &assembled.utxos);
        let block = Arc::new(assembled.block);
        let mut blocks = snapshot.blocks.clone();
        blocks.push(block.clone());
        self.commit(LedgerState {
            blocks,
            utxos: assembled.utxos,
            pool,
        });
        Ok(block)
    }
}

impl ChainReader for ChainState {
    fn head(&self) -> Arc<Block> {
        ChainState::head(self)
    }

    fn blocks(&self) -> Vec<Arc<Block>> {
        ChainState::blocks(self)
    }
}

/// Drops pending transactions that spend outputs no longer in `utxos`.
fn prune_pool(pool: &mut TxPool, utxos: &UtxoSet) -> usize {
    let dead: Vec<TxHash> = pool
        .iter()
        .filter(|(_, tx)| {
            tx.present_inputs()
                .any(|input| !utxos.contains(&input.key()))
        })
        .map(|(hash, _)| *hash)
        .collect();
    pool.remove_all(dead.iter())
}
