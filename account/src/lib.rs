use anyhow::Result;
use dashmap::DashMap;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use thiserror::Error;

use crypto::ecdsa::Keypair;
use types::{Address, Signature};

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("invalid secret key `{0}`")]
    InvalidSecret(String),
    #[error("account {0:?} is not unlocked")]
    Locked(Address),
    #[error("signing failed `{0}`")]
    Signing(String),
}

#[derive(Clone, Debug)]
pub struct Account {
    pub address: Address,
    keypair: Keypair,
}

impl Account {
    fn from_keypair(keypair: Keypair) -> Self {
        Self {
            address: keypair.address(),
            keypair,
        }
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim().trim_start_matches("0x"))
            .map_err(|e| AccountError::InvalidSecret(e.to_string()))?;
        let keypair =
            Keypair::from_secret(&bytes).map_err(|e| AccountError::InvalidSecret(e.to_string()))?;
        Ok(Account::from_keypair(keypair))
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.keypair.secret.to_bytes())
    }

    pub fn sign(&self, msg: &[u8]) -> Result<Signature> {
        let sig = self
            .keypair
            .secret
            .sign(msg)
            .map_err(|e| AccountError::Signing(e.to_string()))?;
        Ok(Signature(sig.to_bytes()))
    }
}

pub fn create_account() -> Account {
    let mut csprng = ChaCha20Rng::from_entropy();
    Account::from_keypair(Keypair::generate(&mut csprng))
}

/// Deterministic account, for tests and local networks.
pub fn account_from_seed(seed: u64) -> Account {
    let mut csprng = ChaCha20Rng::seed_from_u64(seed);
    Account::from_keypair(Keypair::generate(&mut csprng))
}

pub fn verify_signature(msg: &[u8], signature: &Signature, address: &Address) -> bool {
    crypto::ecdsa::verify_address(msg, signature.as_bytes(), address)
}

/// Unlocked accounts the signing oracle may sign for.
#[derive(Default, Debug)]
pub struct Keystore {
    accounts: DashMap<Address, Account>,
}

impl Keystore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unlock(&self, account: Account) -> Address {
        let address = account.address;
        self.accounts.insert(address, account);
        address
    }

    pub fn sign(&self, address: &Address, msg: &[u8]) -> Result<Signature> {
        let account = self
            .accounts
            .get(address)
            .ok_or(AccountError::Locked(*address))?;
        account.sign(msg)
    }
}
