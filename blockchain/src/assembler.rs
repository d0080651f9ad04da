use std::collections::HashSet;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use traits::RootChain;
use txpool::TxPool;
use types::block::{compute_merkle_root, Block, BlockHeader};
use types::tx::Transaction;
use types::{Address, BlockNumber, TxHash, BLOCK_CAPACITY};

use crate::consensus::{is_content_error, validate_transaction};
use crate::errors::root_chain_error;
use crate::merge::plan_merges;
use crate::utxo::UtxoSet;
use crate::CHAIN_LOG_TARGET;

/// Result of a successful assembly. Nothing is committed yet.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub block: Block,
    pub utxos: UtxoSet,
    /// Pool transactions that made it into the block.
    pub included: Vec<TxHash>,
    /// Pool transactions that no longer validate.
    pub stale: Vec<TxHash>,
}

struct Batch {
    number: BlockNumber,
    utxos: UtxoSet,
    transactions: Vec<Transaction>,
}

impl Batch {
    fn is_full(&self) -> bool {
        self.transactions.len() >= BLOCK_CAPACITY
    }

    fn push(&mut self, tx: Transaction) -> Result<()> {
        if self.is_full() {
            bail!("block {} is full", self.number);
        }
        self.utxos
            .apply(self.number, self.transactions.len() as u32, &tx)?;
        self.transactions.push(tx);
        Ok(())
    }

    /// Folds the owner's outputs together until one is left or the block fills up.
    fn merge_owner(&mut self, owner: &Address) -> Result<()> {
        while !self.is_full() && self.utxos.owned_by(owner).len() > 1 {
            let merges = plan_merges(&self.utxos, owner);
            if merges.is_empty() {
                break;
            }
            for merge in merges {
                if self.is_full() {
                    break;
                }
                self.push(merge)?;
            }
        }
        Ok(())
    }
}

/// Builds, signs and submits the successor of `previous`. `utxos` and `pool`
/// are the committed state and are only read.
pub async fn assemble(
    previous: &Block,
    utxos: &UtxoSet,
    pool: &TxPool,
    oracle: &dyn RootChain,
) -> Result<Assembled> {
    let number = match previous.number().checked_add(1) {
        Some(number) => number,
        None => bail!("block number overflow after {}", previous.number()),
    };
    let deposits = oracle
        .get_deposits(number)
        .await
        .map_err(root_chain_error)?;
    let withdrawals = oracle
        .get_withdrawals(number)
        .await
        .map_err(root_chain_error)?;

    let mut batch = Batch {
        number,
        utxos: utxos.clone(),
        transactions: Vec::with_capacity(BLOCK_CAPACITY),
    };

    let queued = deposits.len() + withdrawals.len();
    for deposit in deposits {
        if batch.is_full() {
            break;
        }
        if deposit.amount == 0 || deposit.from.is_zero() {
            warn!(target: CHAIN_LOG_TARGET, from = ?deposit.from, amount = deposit.amount, "Skipping empty deposit");
            continue;
        }
        batch.push(Transaction::deposit(deposit.from, deposit.amount))?;
    }
    for key in withdrawals {
        if batch.is_full() {
            break;
        }
        if !batch.utxos.contains(&key) {
            warn!(target: CHAIN_LOG_TARGET, utxo = %key, "Skipping withdrawal of unknown output");
            continue;
        }
        batch.push(Transaction::withdrawal(key))?;
    }
    if batch.is_full() && queued > BLOCK_CAPACITY {
        warn!(target: CHAIN_LOG_TARGET, number, queued, "Root chain events exceed block capacity, overflow dropped");
    }

    let mut included = Vec::new();
    let mut stale = Vec::new();
    for (hash, tx) in pool.iter() {
        if batch.is_full() {
            break;
        }
        if let Err(error) = validate_transaction(tx, &batch.utxos, oracle).await {
            if is_content_error(&error) {
                debug!(target: CHAIN_LOG_TARGET, hash = ?hash, error = %error, "Dropping stale transaction");
                stale.push(*hash);
                continue;
            }
            return Err(error);
        }
        let spenders: HashSet<Address> = tx
            .present_inputs()
            .filter_map(|input| batch.utxos.get(&input.key()).map(|utxo| utxo.owner))
            .collect();
        batch.push(*tx)?;
        included.push(*hash);

        let mut merged = HashSet::new();
        for (_, output) in tx.present_outputs() {
            if spenders.contains(&output.owner) && merged.insert(output.owner) {
                batch.merge_owner(&output.owner)?;
            }
        }
    }

    let merkle_root = compute_merkle_root(&batch.transactions)?;
    let mut header = BlockHeader::new(number, previous.hash(), merkle_root);
    let signature = oracle
        .sign_block(&header.sig_message())
        .await
        .map_err(root_chain_error)?;
    header.set_signature(signature);
    oracle
        .submit_block_header(&header.encode(true))
        .await
        .map_err(root_chain_error)?;

    info!(
        target: CHAIN_LOG_TARGET,
        number,
        transactions = batch.transactions.len(),
        included = included.len(),
        stale = stale.len(),
        "Assembled block"
    );
    Ok(Assembled {
        block: Block::new(header, batch.transactions),
        utxos: batch.utxos,
        included,
        stale,
    })
}
