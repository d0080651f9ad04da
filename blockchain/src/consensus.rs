use std::collections::HashSet;

use anyhow::Result;

use traits::RootChain;
use types::block::{compute_merkle_root, Block};
use types::tx::{Transaction, TxType};
use types::Address;

use crate::errors::{content_error, root_chain_error, BlockChainError};
use crate::utxo::UtxoSet;

/// Checks `tx` against `utxos` without applying it. NORMAL transactions
/// need a valid owner signature per input and an exact balance; the
/// synthesized kinds only need to reference live state of the right shape.
pub async fn validate_transaction(
    tx: &Transaction,
    utxos: &UtxoSet,
    oracle: &dyn RootChain,
) -> Result<()> {
    let mut seen = HashSet::new();
    for input in tx.present_inputs() {
        anyhow::ensure!(
            seen.insert(input.key()),
            BlockChainError::ContentError(format!("input {} referenced twice", input.key()))
        );
    }

    match tx.tx_type {
        TxType::Normal => validate_normal(tx, utxos, oracle).await,
        TxType::Deposit => {
            anyhow::ensure!(
                tx.is_deposit() && tx.fee == 0,
                BlockChainError::ContentError("deposit must not spend or pay fees".to_string())
            );
            anyhow::ensure!(
                !tx.outputs[0].is_empty() && tx.outputs[1].is_empty(),
                BlockChainError::ContentError("deposit must credit exactly one output".to_string())
            );
            Ok(())
        }
        TxType::Withdraw => {
            anyhow::ensure!(
                tx.is_withdrawal() && tx.fee == 0 && seen.len() == 1,
                BlockChainError::ContentError("withdrawal must consume exactly one output".to_string())
            );
            let key = tx.inputs[0].key();
            anyhow::ensure!(
                !tx.inputs[0].is_empty() && utxos.contains(&key),
                BlockChainError::ContentError(format!("withdrawn output {} is not live", key))
            );
            Ok(())
        }
        TxType::Merge => validate_merge(tx, utxos),
    }
}

async fn validate_normal(tx: &Transaction, utxos: &UtxoSet, oracle: &dyn RootChain) -> Result<()> {
    anyhow::ensure!(
        tx.present_inputs().count() > 0,
        BlockChainError::ContentError("transaction spends nothing".to_string())
    );
    let message = tx.sig_message();
    let mut input_sum: u128 = 0;
    for input in tx.present_inputs() {
        let utxo = utxos
            .get(&input.key())
            .ok_or_else(|| content_error(format!("output {} is not spendable", input.key())))?;
        let valid = oracle
            .is_valid_signature(&message, &input.signature, &utxo.owner)
            .await
            .map_err(root_chain_error)?;
        anyhow::ensure!(
            valid,
            BlockChainError::ContentError(format!(
                "signature for {} does not match owner {:?}",
                input.key(),
                utxo.owner
            ))
        );
        input_sum += utxo.denom as u128;
    }
    let spent = tx.output_sum() + tx.fee as u128;
    anyhow::ensure!(
        input_sum == spent,
        BlockChainError::ContentError(format!(
            "inputs {} do not equal outputs plus fee {}",
            input_sum, spent
        ))
    );
    Ok(())
}

fn validate_merge(tx: &Transaction, utxos: &UtxoSet) -> Result<()> {
    anyhow::ensure!(
        tx.is_merge() && tx.present_inputs().count() == 2,
        BlockChainError::ContentError("merge must combine two outputs".to_string())
    );
    let output = tx.outputs[0];
    anyhow::ensure!(
        !output.is_empty() && tx.outputs[1].is_empty(),
        BlockChainError::ContentError("merge must produce exactly one output".to_string())
    );
    let mut total: u128 = 0;
    for input in tx.present_inputs() {
        let utxo = utxos
            .get(&input.key())
            .ok_or_else(|| content_error(format!("merged output {} is not live", input.key())))?;
        anyhow::ensure!(
            utxo.owner == output.owner,
            BlockChainError::ContentError(format!("merged output {} has another owner", input.key()))
        );
        total += utxo.denom as u128;
    }
    anyhow::ensure!(
        total == output.denom as u128,
        BlockChainError::ContentError(format!(
            "merge of {} produced {}",
            total, output.denom
        ))
    );
    Ok(())
}

/// Validates `block` as the successor of `previous` and returns the UTXO
/// set after applying it. `utxos` itself is never modified.
pub async fn validate_block(
    block: &Block,
    previous: &Block,
    utxos: &UtxoSet,
    oracle: &dyn RootChain,
    operator: &Address,
) -> Result<UtxoSet> {
    let expected = previous.number() + 1;
    anyhow::ensure!(
        block.number() == expected,
        BlockChainError::SequenceError {
            expected,
            actual: block.number(),
        }
    );
    let previous_hash = previous.hash();
    anyhow::ensure!(
        *block.previous_hash() == previous_hash,
        BlockChainError::LinkageError {
            expected: previous_hash,
            actual: *block.previous_hash(),
        }
    );
    anyhow::ensure!(
        block.transactions().len() <= types::BLOCK_CAPACITY,
        BlockChainError::ContentError("block over capacity".to_string())
    );
    let merkle_root = compute_merkle_root(block.transactions())?;
    anyhow::ensure!(
        merkle_root == *block.header().merkle_root(),
        BlockChainError::MerkleRootMismatch {
            expected: merkle_root,
            actual: *block.header().merkle_root(),
        }
    );
    let header = block.header();
    let signed = oracle
        .is_valid_signature(&header.sig_message(), header.signature(), operator)
        .await
        .map_err(root_chain_error)?;
    anyhow::ensure!(
        signed,
        BlockChainError::InvalidOperatorSignature(block.number())
    );

    let mut working = utxos.clone();
    for (tx_index, tx) in block.transactions().iter().enumerate() {
        let tx_index = tx_index as u32;
        validate_transaction(tx, &working, oracle)
            .await
            .map_err(|e| in_slot(e, tx_index))?;
        working
            .apply(block.number(), tx_index, tx)
            .map_err(|e| in_slot(e, tx_index))?;
    }
    Ok(working)
}

pub(crate) fn is_content_error(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<BlockChainError>(),
        Some(BlockChainError::ContentError(_))
    )
}

fn in_slot(error: anyhow::Error, tx_index: u32) -> anyhow::Error {
    match error.downcast_ref::<BlockChainError>() {
        Some(BlockChainError::ContentError(msg)) => {
            content_error(format!("slot {}: {}", tx_index, msg))
        }
        _ => error,
    }
}
