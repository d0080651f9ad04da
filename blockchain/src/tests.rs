use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use account::{account_from_seed, Account};
use primitive_types::H256;
use traits::{ExitGame, RootChain};
use txpool::TxPoolError;
use types::block::{compute_merkle_root, genesis_block, Block, BlockHeader};
use types::tx::{Transaction, TxOutput};
use types::utxo::{Deposit, UtxoKey, Withdrawal};
use types::{Address, BlockNumber, Signature, BLOCK_CAPACITY};

use crate::{BlockChainError, ChainState, DevRootChain};

fn sign(mut tx: Transaction, owners: &[&Account]) -> Transaction {
    let message = tx.sig_message();
    for (slot, owner) in owners.iter().enumerate() {
        tx.set_signature(slot, owner.sign(&message).unwrap());
    }
    tx
}

struct Fixture {
    operator: Account,
    root: Arc<DevRootChain>,
    chain: ChainState,
}

fn operator_node() -> Fixture {
    let operator = account_from_seed(1);
    let root = Arc::new(DevRootChain::new(Some(operator.clone())));
    let chain = ChainState::new(root.clone(), operator.address, true);
    Fixture {
        operator,
        root,
        chain,
    }
}

fn follower(operator: &Address) -> ChainState {
    ChainState::new(Arc::new(DevRootChain::new(None)), *operator, false)
}

fn owned_blocks(chain: &ChainState) -> Vec<Block> {
    chain.blocks().iter().map(|block| block.as_ref().clone()).collect()
}

fn blockchain_error(error: &anyhow::Error) -> Option<&BlockChainError> {
    error.downcast_ref::<BlockChainError>()
}

fn is_content_error(error: &anyhow::Error) -> bool {
    matches!(blockchain_error(error), Some(BlockChainError::ContentError(_)))
}

#[tokio::test]
async fn test_genesis_only() {
    let node = operator_node();
    assert_eq!(node.chain.height(), 0);
    assert!(node.chain.utxos().is_empty());
    assert!(node.chain.pool().is_empty());
    assert_eq!(*node.chain.head(), genesis_block());
}

#[tokio::test]
async fn test_deposit_is_credited_in_block_one() {
    let node = operator_node();
    let x = account_from_seed(2).address;
    assert_eq!(node.root.deposit(x, 10).await.unwrap(), 1);

    let block = node.chain.assemble_block().await.unwrap();
    assert_eq!(block.number(), 1);
    assert_eq!(*block.previous_hash(), genesis_block().hash());
    assert!(block.transactions()[0].is_deposit());

    let utxos = node.chain.utxos().to_vec();
    assert_eq!(utxos.len(), 1);
    assert_eq!(utxos[0].key, UtxoKey::new(1, 0, 0));
    assert_eq!(utxos[0].owner, x);
    assert_eq!(utxos[0].denom, 10);
    assert_eq!(
        node.root.submitted_header(1).as_ref(),
        Some(block.header())
    );
}

#[tokio::test]
async fn test_spend_with_fee() {
    let node = operator_node();
    let x = account_from_seed(2);
    let y = account_from_seed(3).address;
    node.root.deposit(x.address, 10).await.unwrap();
    node.chain.assemble_block().await.unwrap();

    let spend = sign(
        Transaction::new(&[UtxoKey::new(1, 0, 0)], &[TxOutput::new(y, 9)], 1).unwrap(),
        &[&x],
    );
    let hash = node.chain.submit_transaction(spend).await.unwrap();
    assert_eq!(hash, spend.hash());
    assert_eq!(node.chain.pool(), vec![spend]);

    let block = node.chain.assemble_block().await.unwrap();
    assert_eq!(block.number(), 2);
    let utxos = node.chain.utxos();
    assert_eq!(utxos.len(), 1);
    assert_eq!(utxos.balance_of(&y), 9);
    assert!(utxos.owned_by(&x.address).is_empty());
    assert!(node.chain.pool().is_empty());
}

#[tokio::test]
async fn test_admission_rejections() {
    let node = operator_node();
    let x = account_from_seed(2);
    let y = account_from_seed(3);
    node.root.deposit(x.address, 10).await.unwrap();
    node.chain.assemble_block().await.unwrap();
    let key = UtxoKey::new(1, 0, 0);

    let forged = sign(
        Transaction::new(&[key], &[TxOutput::new(y.address, 10)], 0).unwrap(),
        &[&y],
    );
    let err = node.chain.submit_transaction(forged).await.unwrap_err();
    assert!(is_content_error(&err));

    let unbalanced = sign(
        Transaction::new(&[key], &[TxOutput::new(y.address, 10)], 1).unwrap(),
        &[&x],
    );
    assert!(is_content_error(
        &node.chain.submit_transaction(unbalanced).await.unwrap_err()
    ));

    let missing = sign(
        Transaction::new(&[UtxoKey::new(1, 1, 0)], &[TxOutput::new(y.address, 1)], 0).unwrap(),
        &[&x],
    );
    assert!(is_content_error(
        &node.chain.submit_transaction(missing).await.unwrap_err()
    ));

    let deposit = Transaction::deposit(y.address, 100);
    assert!(is_content_error(
        &node.chain.submit_transaction(deposit).await.unwrap_err()
    ));

    let spend = sign(
        Transaction::new(&[key], &[TxOutput::new(y.address, 10)], 0).unwrap(),
        &[&x],
    );
    node.chain.submit_transaction(spend).await.unwrap();
    let err = node.chain.submit_transaction(spend).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<TxPoolError>(),
        Some(&TxPoolError::PoolDuplicate(spend.hash()))
    );

    let double_spend = sign(
        Transaction::new(&[key], &[TxOutput::new(x.address, 10)], 0).unwrap(),
        &[&x],
    );
    assert!(is_content_error(
        &node.chain.submit_transaction(double_spend).await.unwrap_err()
    ));
    assert_eq!(node.chain.pool(), vec![spend]);
}

#[tokio::test]
async fn test_create_transaction_signs_through_oracle() {
    let node = operator_node();
    let x = account_from_seed(2);
    let y = account_from_seed(3).address;
    node.root.deposit(x.address, 10).await.unwrap();
    node.chain.assemble_block().await.unwrap();

    let inputs = [UtxoKey::new(1, 0, 0)];
    let outputs = [TxOutput::new(y, 10)];
    assert!(node
        .chain
        .create_transaction(&inputs, &outputs, 0, &x.address)
        .await
        .is_err());

    node.root.unlock(x.clone());
    let tx = node
        .chain
        .create_transaction(&inputs, &outputs, 0, &x.address)
        .await
        .unwrap();
    assert!(account::verify_signature(
        &tx.sig_message(),
        &tx.inputs[0].signature,
        &x.address
    ));
    assert_eq!(node.chain.pool(), vec![tx]);
}

#[tokio::test]
async fn test_assembly_merges_remainders() {
    let node = operator_node();
    let x = account_from_seed(2);
    let y = account_from_seed(3).address;
    node.root.deposit(x.address, 3).await.unwrap();
    node.root.deposit(x.address, 4).await.unwrap();
    node.chain.assemble_block().await.unwrap();
    assert_eq!(node.chain.utxos().owned_by(&x.address).len(), 2);

    let spend = sign(
        Transaction::new(
            &[UtxoKey::new(1, 0, 0)],
            &[TxOutput::new(y, 2), TxOutput::new(x.address, 1)],
            0,
        )
        .unwrap(),
        &[&x],
    );
    node.chain.submit_transaction(spend).await.unwrap();
    let block = node.chain.assemble_block().await.unwrap();

    assert_eq!(block.transactions().len(), 2);
    assert!(block.transactions()[1].is_merge());
    let remaining = node.chain.utxos().owned_by(&x.address);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].key, UtxoKey::new(2, 1, 0));
    assert_eq!(remaining[0].denom, 5);
}

#[tokio::test]
async fn test_deposits_beyond_capacity_fill_consecutive_blocks() {
    let node = operator_node();
    let x = account_from_seed(2).address;
    for _ in 0..=BLOCK_CAPACITY {
        node.root.deposit(x, 1).await.unwrap();
    }

    let first = node.chain.assemble_block().await.unwrap();
    assert_eq!(first.number(), 1);
    assert_eq!(first.transactions().len(), BLOCK_CAPACITY);
    let second = node.chain.assemble_block().await.unwrap();
    assert_eq!(second.number(), 2);
    assert_eq!(second.transactions().len(), 1);

    assert_eq!(node.chain.height(), 2);
    assert_eq!(node.chain.utxos().len(), BLOCK_CAPACITY + 1);
    assert_eq!(node.chain.utxos().balance_of(&x), BLOCK_CAPACITY as u128 + 1);
}

#[tokio::test]
async fn test_pool_drain_stops_at_capacity() {
    let node = operator_node();
    let y = account_from_seed(3).address;
    let owners: Vec<Account> = (0..BLOCK_CAPACITY as u64 + 4)
        .map(|seed| account_from_seed(100 + seed))
        .collect();
    for owner in &owners {
        node.root.deposit(owner.address, 1).await.unwrap();
    }
    node.chain.assemble_block().await.unwrap();
    node.chain.assemble_block().await.unwrap();

    for (i, owner) in owners.iter().enumerate() {
        let key = if i < BLOCK_CAPACITY {
            UtxoKey::new(1, i as u32, 0)
        } else {
            UtxoKey::new(2, (i - BLOCK_CAPACITY) as u32, 0)
        };
        let spend = sign(
            Transaction::new(&[key], &[TxOutput::new(y, 1)], 0).unwrap(),
            &[owner],
        );
        node.chain.submit_transaction(spend).await.unwrap();
    }
    let pending = node.chain.pool();
    assert_eq!(pending.len(), owners.len());

    let full = node.chain.assemble_block().await.unwrap();
    assert_eq!(full.transactions().len(), BLOCK_CAPACITY);
    assert_eq!(full.transactions(), &pending[..BLOCK_CAPACITY]);
    assert_eq!(node.chain.pool(), pending[BLOCK_CAPACITY..].to_vec());

    let rest = node.chain.assemble_block().await.unwrap();
    assert_eq!(rest.transactions(), &pending[BLOCK_CAPACITY..]);
    assert!(node.chain.pool().is_empty());
    assert_eq!(node.chain.utxos().owned_by(&y).len(), owners.len());
}

#[tokio::test]
async fn test_merging_stops_when_block_is_full() {
    let node = operator_node();
    let w = account_from_seed(2);
    let z = account_from_seed(3);
    let y = account_from_seed(4).address;
    node.root.deposit(w.address, 5).await.unwrap();
    for _ in 0..300 {
        node.root.deposit(z.address, 1).await.unwrap();
    }
    node.chain.assemble_block().await.unwrap();
    node.chain.assemble_block().await.unwrap();
    assert_eq!(node.chain.utxos().owned_by(&z.address).len(), 300);

    let change = sign(
        Transaction::new(&[UtxoKey::new(1, 1, 0)], &[TxOutput::new(z.address, 1)], 0).unwrap(),
        &[&z],
    );
    let transfer = sign(
        Transaction::new(&[UtxoKey::new(1, 0, 0)], &[TxOutput::new(y, 5)], 0).unwrap(),
        &[&w],
    );
    node.chain.submit_transaction(change).await.unwrap();
    node.chain.submit_transaction(transfer).await.unwrap();

    // 150 + 75 merges, then 30 of the next 37 fit
    let block = node.chain.assemble_block().await.unwrap();
    assert_eq!(block.transactions().len(), BLOCK_CAPACITY);
    assert_eq!(block.transactions()[0], change);
    assert!(block.transactions()[1..].iter().all(Transaction::is_merge));
    assert_eq!(node.chain.utxos().owned_by(&z.address).len(), 45);
    assert_eq!(node.chain.utxos().balance_of(&z.address), 300);
    assert_eq!(node.chain.pool(), vec![transfer]);

    let next = node.chain.assemble_block().await.unwrap();
    assert_eq!(next.transactions(), &[transfer]);
    assert!(node.chain.pool().is_empty());
}

#[tokio::test]
async fn test_finalized_withdrawal_removes_output() {
    let node = operator_node();
    let x = account_from_seed(2);
    node.root.deposit(x.address, 10).await.unwrap();
    node.chain.assemble_block().await.unwrap();

    let (tx, proof) = node.chain.transaction_proof(1, 0).unwrap();
    assert!(proof.verify(&tx, node.chain.head().header().merkle_root()));
    node.root
        .start_withdrawal(traits::InclusionClaim {
            key: UtxoKey::new(1, 0, 0),
            tx,
            proof,
            from: x.address,
        })
        .await
        .unwrap();
    node.root.finalize_withdrawal(x.address).await.unwrap();

    let block = node.chain.assemble_block().await.unwrap();
    assert!(block.transactions()[0].is_withdrawal());
    assert!(node.chain.utxos().is_empty());
}

#[tokio::test]
async fn test_append_follows_operator() {
    let node = operator_node();
    let x = account_from_seed(2);
    node.root.deposit(x.address, 10).await.unwrap();
    let block = node.chain.assemble_block().await.unwrap();

    let peer = follower(&node.operator.address);
    peer.append(block.as_ref().clone()).await.unwrap();
    assert_eq!(peer.head(), block);
    assert_eq!(peer.utxos(), node.chain.utxos());

    let err = peer.append(block.as_ref().clone()).await.unwrap_err();
    assert_eq!(
        blockchain_error(&err),
        Some(&BlockChainError::SequenceError {
            expected: 2,
            actual: 1
        })
    );
}

#[tokio::test]
async fn test_append_rejects_foreign_signer() {
    let node = operator_node();
    let x = account_from_seed(2);
    node.root.deposit(x.address, 10).await.unwrap();
    let block = node.chain.assemble_block().await.unwrap();

    let peer = follower(&account_from_seed(9).address);
    let err = peer.append(block.as_ref().clone()).await.unwrap_err();
    assert_eq!(
        blockchain_error(&err),
        Some(&BlockChainError::InvalidOperatorSignature(1))
    );
    assert_eq!(peer.height(), 0);
}

#[tokio::test]
async fn test_append_rejects_tampered_block() {
    let node = operator_node();
    let x = account_from_seed(2);
    node.root.deposit(x.address, 10).await.unwrap();
    let block = node.chain.assemble_block().await.unwrap();

    let tampered = Block::new(
        *block.header(),
        vec![Transaction::deposit(x.address, 1_000)],
    );
    let peer = follower(&node.operator.address);
    let err = peer.append(tampered).await.unwrap_err();
    assert!(matches!(
        blockchain_error(&err),
        Some(BlockChainError::MerkleRootMismatch { .. })
    ));

    let unlinked = Block::new(
        BlockHeader::new(1, H256::repeat_byte(7), *block.header().merkle_root()),
        block.transactions().clone(),
    );
    let err = peer.append(unlinked).await.unwrap_err();
    assert!(matches!(
        blockchain_error(&err),
        Some(BlockChainError::LinkageError { .. })
    ));
    assert!(peer.utxos().is_empty());
}

#[tokio::test]
async fn test_append_prunes_spent_pool_entries() {
    let node = operator_node();
    let x = account_from_seed(2);
    let y = account_from_seed(3).address;
    node.root.deposit(x.address, 10).await.unwrap();
    let block1 = node.chain.assemble_block().await.unwrap();

    let peer = follower(&node.operator.address);
    peer.append(block1.as_ref().clone()).await.unwrap();

    let spend = sign(
        Transaction::new(&[UtxoKey::new(1, 0, 0)], &[TxOutput::new(y, 10)], 0).unwrap(),
        &[&x],
    );
    node.chain.submit_transaction(spend).await.unwrap();
    peer.submit_transaction(spend).await.unwrap();
    let block2 = node.chain.assemble_block().await.unwrap();

    peer.append(block2.as_ref().clone()).await.unwrap();
    assert!(peer.pool().is_empty());
    assert_eq!(peer.utxos(), node.chain.utxos());
}

#[tokio::test]
async fn test_replace_revalidates_from_genesis() {
    let node = operator_node();
    let x = account_from_seed(2);
    let y = account_from_seed(3).address;
    node.root.deposit(x.address, 10).await.unwrap();
    node.root.deposit(x.address, 5).await.unwrap();
    node.chain.assemble_block().await.unwrap();
    let spend = sign(
        Transaction::new(&[UtxoKey::new(1, 1, 0)], &[TxOutput::new(y, 4)], 1).unwrap(),
        &[&x],
    );
    node.chain.submit_transaction(spend).await.unwrap();
    node.chain.assemble_block().await.unwrap();
    node.chain.assemble_block().await.unwrap();

    let peer = follower(&node.operator.address);
    peer.replace(owned_blocks(&node.chain)).await.unwrap();
    assert_eq!(peer.height(), 3);
    assert_eq!(peer.head(), node.chain.head());
    assert_eq!(peer.utxos(), node.chain.utxos());
}

#[tokio::test]
async fn test_replace_requires_longer_chain() {
    let node = operator_node();
    node.chain.assemble_block().await.unwrap();

    let peer = follower(&node.operator.address);
    peer.replace(owned_blocks(&node.chain)).await.unwrap();
    let err = peer
        .replace(owned_blocks(&node.chain))
        .await
        .unwrap_err();
    assert!(matches!(
        blockchain_error(&err),
        Some(BlockChainError::ChainInvalid(_))
    ));
    assert!(matches!(
        blockchain_error(&peer.replace(vec![]).await.unwrap_err()),
        Some(BlockChainError::EmptyChain)
    ));
}

#[tokio::test]
async fn test_replace_rejects_foreign_genesis() {
    let node = operator_node();
    for _ in 0..4 {
        node.chain.assemble_block().await.unwrap();
    }
    let mut candidate = owned_blocks(&node.chain);
    assert_eq!(candidate.len(), 5);
    candidate[0] = Block::new(
        BlockHeader::new(0, H256::repeat_byte(1), compute_merkle_root(&[]).unwrap()),
        vec![],
    );

    let peer = follower(&node.operator.address);
    let err = peer.replace(candidate).await.unwrap_err();
    assert!(matches!(
        blockchain_error(&err),
        Some(BlockChainError::GenesisMismatch(_))
    ));
    assert_eq!(peer.height(), 0);
    assert_eq!(*peer.head(), genesis_block());
}

#[tokio::test]
async fn test_replace_is_all_or_nothing() {
    let node = operator_node();
    let x = account_from_seed(2);
    node.root.deposit(x.address, 10).await.unwrap();
    node.chain.assemble_block().await.unwrap();
    node.chain.assemble_block().await.unwrap();

    let peer = follower(&node.operator.address);
    let mut candidate = owned_blocks(&node.chain);
    candidate[2] = Block::new(*candidate[2].header(), vec![Transaction::deposit(x.address, 1)]);
    let err = peer.replace(candidate).await.unwrap_err();
    assert!(matches!(
        blockchain_error(&err),
        Some(BlockChainError::ChainInvalid(_))
    ));
    assert_eq!(peer.height(), 0);
    assert!(peer.utxos().is_empty());
}

#[tokio::test]
async fn test_replace_readmits_pending_transactions() {
    let node = operator_node();
    let x = account_from_seed(2);
    let y = account_from_seed(3).address;
    node.root.deposit(x.address, 10).await.unwrap();
    let block1 = node.chain.assemble_block().await.unwrap();
    node.chain.assemble_block().await.unwrap();

    let peer = follower(&node.operator.address);
    peer.append(block1.as_ref().clone()).await.unwrap();
    let spend = sign(
        Transaction::new(&[UtxoKey::new(1, 0, 0)], &[TxOutput::new(y, 10)], 0).unwrap(),
        &[&x],
    );
    peer.submit_transaction(spend).await.unwrap();

    peer.replace(owned_blocks(&node.chain)).await.unwrap();
    assert_eq!(peer.height(), 2);
    assert_eq!(peer.pool(), vec![spend]);
}

#[tokio::test]
async fn test_follower_cannot_assemble() {
    let peer = follower(&account_from_seed(1).address);
    let err = peer.assemble_block().await.unwrap_err();
    assert_eq!(blockchain_error(&err), Some(&BlockChainError::NotOperator));
}

struct FlakyRootChain {
    inner: DevRootChain,
    fail: AtomicBool,
}

impl FlakyRootChain {
    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("root chain unreachable");
        }
        Ok(())
    }
}

#[async_trait]
impl RootChain for FlakyRootChain {
    async fn get_deposits(&self, block_number: BlockNumber) -> Result<Vec<Deposit>> {
        self.check()?;
        self.inner.get_deposits(block_number).await
    }

    async fn get_withdrawals(&self, block_number: BlockNumber) -> Result<Vec<Withdrawal>> {
        self.check()?;
        self.inner.get_withdrawals(block_number).await
    }

    async fn submit_block_header(&self, header: &[u8]) -> Result<()> {
        self.check()?;
        self.inner.submit_block_header(header).await
    }

    async fn sign_block(&self, message: &[u8]) -> Result<Signature> {
        self.check()?;
        self.inner.sign_block(message).await
    }

    async fn sign_transaction(&self, message: &[u8], address: &Address) -> Result<Signature> {
        self.check()?;
        self.inner.sign_transaction(message, address).await
    }

    async fn is_valid_signature(
        &self,
        message: &[u8],
        signature: &Signature,
        address: &Address,
    ) -> Result<bool> {
        self.check()?;
        self.inner
            .is_valid_signature(message, signature, address)
            .await
    }
}

#[tokio::test]
async fn test_root_chain_failure_changes_nothing() {
    let operator = account_from_seed(1);
    let x = account_from_seed(2);
    let y = account_from_seed(3).address;
    let root = Arc::new(FlakyRootChain {
        inner: DevRootChain::new(Some(operator.clone())),
        fail: AtomicBool::new(false),
    });
    let chain = ChainState::new(root.clone(), operator.address, true);
    root.inner.deposit(x.address, 10).await.unwrap();
    chain.assemble_block().await.unwrap();
    let spend = sign(
        Transaction::new(&[UtxoKey::new(1, 0, 0)], &[TxOutput::new(y, 10)], 0).unwrap(),
        &[&x],
    );
    chain.submit_transaction(spend).await.unwrap();
    let before = chain.status();

    root.fail.store(true, Ordering::SeqCst);
    let err = chain.assemble_block().await.unwrap_err();
    assert!(matches!(
        blockchain_error(&err),
        Some(BlockChainError::RootChainError(_))
    ));
    assert_eq!(chain.status(), before);
    assert_eq!(chain.pool(), vec![spend]);

    root.fail.store(false, Ordering::SeqCst);
    chain.assemble_block().await.unwrap();
    assert_eq!(chain.utxos().balance_of(&y), 10);
}
