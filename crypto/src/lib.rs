pub mod ecdsa;
mod error;

pub use error::Error;

use primitive_types::{H160, H256};
use tiny_keccak::Hasher;

pub fn keccak256<B: AsRef<[u8]>>(bytes: B) -> H256 {
    let mut out = H256::zero();
    let mut keccak = tiny_keccak::Keccak::v256();
    keccak.update(bytes.as_ref());
    keccak.finalize(out.as_bytes_mut());
    out
}

/// Ethereum style address: the last 20 bytes of the keccak digest of the
/// uncompressed public key without its `0x04` prefix.
pub fn address_from_uncompressed(public_key: &[u8]) -> H160 {
    let digest = keccak256(public_key.get(1..).unwrap_or_default());
    H160::from_slice(&digest.as_bytes()[12..])
}
