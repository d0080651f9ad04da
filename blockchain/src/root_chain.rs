use std::collections::BTreeMap;

use anyhow::{anyhow, bail, ensure, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use account::{Account, Keystore};
use primitive_types::H256;
use traits::{ExitGame, InclusionClaim, RootChain};
use types::block::BlockHeader;
use types::tx::Transaction;
use types::utxo::{Deposit, UtxoKey, Withdrawal};
use types::{Address, BlockNumber, Signature, BLOCK_CAPACITY};

const ROOT_CHAIN_LOG_TARGET: &str = "rootchain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exit {
    pub key: UtxoKey,
    pub owner: Address,
    pub amount: u64,
}

#[derive(Default)]
struct ContractState {
    headers: BTreeMap<BlockNumber, BlockHeader>,
    deposits: BTreeMap<BlockNumber, Vec<Deposit>>,
    withdrawals: BTreeMap<BlockNumber, Vec<Withdrawal>>,
    exits: IndexMap<H256, Exit>,
    /// Highest block whose events were already handed out.
    sealed: BlockNumber,
}

impl ContractState {
    /// First child block whose events are still open.
    fn open_block(&self) -> BlockNumber {
        let submitted = self.headers.keys().next_back().copied().unwrap_or(0);
        submitted.max(self.sealed) + 1
    }

    fn queued_events(&self, number: BlockNumber) -> usize {
        self.deposits.get(&number).map_or(0, Vec::len)
            + self.withdrawals.get(&number).map_or(0, Vec::len)
    }

    /// First open block that still has room for another event.
    fn queue_block(&self) -> BlockNumber {
        let mut number = self.open_block();
        while self.queued_events(number) >= BLOCK_CAPACITY {
            number += 1;
        }
        number
    }

    fn check_inclusion(&self, claim: &InclusionClaim) -> Result<Transaction> {
        let header = self
            .headers
            .get(&claim.key.blk_num)
            .ok_or_else(|| anyhow!("block {} was never submitted", claim.key.blk_num))?;
        ensure!(
            claim.proof.index == claim.key.tx_index,
            "proof is for slot {} not {}",
            claim.proof.index,
            claim.key.tx_index
        );
        ensure!(
            claim.proof.verify(&claim.tx, header.merkle_root()),
            "transaction is not included in block {}",
            claim.key.blk_num
        );
        Ok(Transaction::decode(&claim.tx)?)
    }
}

/// In-memory root chain contract with the operator key and an unlocked
/// keystore acting as the signing oracle. Used for local networks and tests.
pub struct DevRootChain {
    operator: Option<Account>,
    keystore: Keystore,
    state: Mutex<ContractState>,
}

impl DevRootChain {
    pub fn new(operator: Option<Account>) -> Self {
        Self {
            operator,
            keystore: Keystore::new(),
            state: Mutex::new(ContractState::default()),
        }
    }

    pub fn operator(&self) -> Option<Address> {
        self.operator.as_ref().map(|account| account.address)
    }

    pub fn unlock(&self, account: Account) -> Address {
        self.keystore.unlock(account)
    }

    pub fn exits(&self) -> Vec<(H256, Exit)> {
        let state = self.state.lock();
        state
            .exits
            .iter()
            .map(|(id, exit)| (*id, exit.clone()))
            .collect()
    }

    pub fn submitted_header(&self, number: BlockNumber) -> Option<BlockHeader> {
        self.state.lock().headers.get(&number).copied()
    }
}

#[async_trait]
impl RootChain for DevRootChain {
    async fn get_deposits(&self, block_number: BlockNumber) -> Result<Vec<Deposit>> {
        let mut state = self.state.lock();
        state.sealed = state.sealed.max(block_number);
        Ok(state
            .deposits
            .get(&block_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_withdrawals(&self, block_number: BlockNumber) -> Result<Vec<Withdrawal>> {
        let mut state = self.state.lock();
        state.sealed = state.sealed.max(block_number);
        Ok(state
            .withdrawals
            .get(&block_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_block_header(&self, header: &[u8]) -> Result<()> {
        let header = BlockHeader::decode(header)?;
        let operator = self
            .operator()
            .ok_or_else(|| anyhow!("no operator registered with the root chain"))?;
        ensure!(
            account::verify_signature(&header.sig_message(), header.signature(), &operator),
            "header {} is not signed by the operator",
            header.number()
        );
        let mut state = self.state.lock();
        if let Some(last) = state.headers.keys().next_back() {
            ensure!(
                header.number() > *last,
                "header {} does not extend submitted block {}",
                header.number(),
                last
            );
        }
        info!(target: ROOT_CHAIN_LOG_TARGET, number = header.number(), merkle_root = ?header.merkle_root(), "Block header submitted");
        state.headers.insert(header.number(), header);
        Ok(())
    }

    async fn sign_block(&self, message: &[u8]) -> Result<Signature> {
        match &self.operator {
            Some(operator) => operator.sign(message),
            None => bail!("no operator key loaded"),
        }
    }

    async fn sign_transaction(&self, message: &[u8], address: &Address) -> Result<Signature> {
        self.keystore.sign(address, message)
    }

    async fn is_valid_signature(
        &self,
        message: &[u8],
        signature: &Signature,
        address: &Address,
    ) -> Result<bool> {
        Ok(account::verify_signature(message, signature, address))
    }
}

#[async_trait]
impl ExitGame for DevRootChain {
    async fn deposit(&self, from: Address, amount: u64) -> Result<BlockNumber> {
        ensure!(amount > 0, "deposit amount must be positive");
        ensure!(!from.is_zero(), "deposit owner must not be zero");
        let mut state = self.state.lock();
        let number = state.queue_block();
        state
            .deposits
            .entry(number)
            .or_default()
            .push(Deposit { from, amount });
        info!(target: ROOT_CHAIN_LOG_TARGET, from = ?from, amount, block = number, "Deposit queued");
        Ok(number)
    }

    async fn start_withdrawal(&self, claim: InclusionClaim) -> Result<H256> {
        let mut state = self.state.lock();
        let tx = state.check_inclusion(&claim)?;
        let output = tx
            .outputs
            .get(claim.key.o_index as usize)
            .filter(|output| !output.is_empty())
            .copied()
            .ok_or_else(|| anyhow!("output {} does not exist", claim.key))?;
        ensure!(
            output.owner == claim.from,
            "output {} is not owned by {:?}",
            claim.key,
            claim.from
        );
        let exit_id = crypto::keccak256(claim.key.to_string());
        ensure!(
            !state.exits.contains_key(&exit_id),
            "exit for {} already started",
            claim.key
        );
        state.exits.insert(
            exit_id,
            Exit {
                key: claim.key,
                owner: output.owner,
                amount: output.denom,
            },
        );
        info!(target: ROOT_CHAIN_LOG_TARGET, utxo = %claim.key, exit_id = ?exit_id, "Withdrawal started");
        Ok(exit_id)
    }

    async fn challenge_withdrawal(&self, exit_id: H256, claim: InclusionClaim) -> Result<()> {
        let mut state = self.state.lock();
        let exit = state
            .exits
            .get(&exit_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown exit {:?}", exit_id))?;
        let tx = state.check_inclusion(&claim)?;
        ensure!(
            tx.present_inputs().any(|input| input.key() == exit.key),
            "challenge does not spend {}",
            exit.key
        );
        state.exits.shift_remove(&exit_id);
        info!(target: ROOT_CHAIN_LOG_TARGET, utxo = %exit.key, exit_id = ?exit_id, "Withdrawal challenged");
        Ok(())
    }

    async fn finalize_withdrawal(&self, from: Address) -> Result<Vec<Withdrawal>> {
        let mut state = self.state.lock();
        let finalized: Vec<H256> = state
            .exits
            .iter()
            .filter(|(_, exit)| exit.owner == from)
            .map(|(id, _)| *id)
            .collect();
        let mut keys = Vec::with_capacity(finalized.len());
        for id in finalized {
            if let Some(exit) = state.exits.shift_remove(&id) {
                let number = state.queue_block();
                state.withdrawals.entry(number).or_default().push(exit.key);
                keys.push(exit.key);
            }
        }
        debug!(target: ROOT_CHAIN_LOG_TARGET, from = ?from, count = keys.len(), "Withdrawals finalized");
        Ok(keys)
    }
}
