use std::fmt::{Debug, Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use primitive_types::{H160, H256};

pub mod block;
pub mod config;
pub mod error;
pub mod events;
pub mod tx;
pub mod utxo;

pub type Address = H160;
pub type Hash = H256;
pub type TxHash = H256;
pub type BlockHash = H256;
pub type BlockNumber = u32;
pub type PeerId = u64;

/// Slots per block, padded with [`EMPTY_LEAF`] when unused.
pub const BLOCK_CAPACITY: usize = 256;

/// RLP empty string; encoding of an unused block slot.
pub const EMPTY_LEAF: &[u8] = &[0x80];

pub const SIGNATURE_LENGTH: usize = 65;

/// `r (32) || s (32) || v (1)`. All zero means unsigned.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn zero() -> Self {
        Signature([0; SIGNATURE_LENGTH])
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SIGNATURE_LENGTH {
            return None;
        }
        let mut sig = [0_u8; SIGNATURE_LENGTH];
        sig.copy_from_slice(bytes);
        Some(Signature(sig))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature::zero()
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bytes = hex::decode(raw.trim_start_matches("0x")).map_err(D::Error::custom)?;
        Signature::from_slice(&bytes)
            .ok_or_else(|| D::Error::custom(format!("expected {} bytes", SIGNATURE_LENGTH)))
    }
}
