use k256::ecdsa::recoverable;
use k256::ecdsa::signature::Signature as Sig;
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::{CryptoRng, RngCore};

use primitive_types::{H160, H256};

use crate::error::Error;

pub const SECRET_KEY_LENGTH: usize = 32;
pub const SIG_LENGTH: usize = 65;

#[derive(Clone, Debug)]
pub struct Keypair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl Keypair {
    pub fn generate<T>(csprng: &mut T) -> Self
    where
        T: CryptoRng + RngCore,
    {
        let secret = SecretKey::generate(csprng);
        let public = secret.public();
        Self { secret, public }
    }

    pub fn from_secret(bytes: &[u8]) -> Result<Self, Error> {
        let secret = SecretKey::from_bytes(bytes)?;
        let public = secret.public();
        Ok(Self { secret, public })
    }

    pub fn address(&self) -> H160 {
        self.public.address()
    }
}

#[derive(Clone, Debug)]
pub struct SecretKey {
    inner: SigningKey,
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for SecretKey {}

impl SecretKey {
    pub fn generate<T>(csprng: &mut T) -> SecretKey
    where
        T: CryptoRng + RngCore,
    {
        Self {
            inner: SigningKey::random(csprng),
        }
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(Error::InvalidLength {
                expected: SECRET_KEY_LENGTH,
                actual: bytes.len(),
            });
        }
        let inner = SigningKey::from_bytes(bytes)?;
        Ok(SecretKey { inner })
    }

    /// Signs the keccak digest of `msg`.
    pub fn sign(&self, msg: &[u8]) -> Result<Signature, Error> {
        let sig: recoverable::Signature = self.inner.try_sign(msg)?;
        Ok(Signature { inner: sig })
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        let mut secret_key = [0_u8; SECRET_KEY_LENGTH];
        secret_key.copy_from_slice(self.inner.to_bytes().as_slice());
        secret_key
    }

    pub fn public(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    pub fn to_uncompressed(&self) -> Vec<u8> {
        self.inner.to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn address(&self) -> H160 {
        crate::address_from_uncompressed(&self.to_uncompressed())
    }
}

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct Signature {
    inner: recoverable::Signature,
}

impl Signature {
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != SIG_LENGTH {
            return Err(Error::InvalidLength {
                expected: SIG_LENGTH,
                actual: bytes.len(),
            });
        }
        let sig = recoverable::Signature::from_bytes(bytes)?;
        Ok(Self { inner: sig })
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; SIG_LENGTH] {
        let mut sig = [0_u8; SIG_LENGTH];
        sig.copy_from_slice(self.inner.as_bytes());
        sig
    }

    pub fn recover_public_key(&self, msg: &[u8]) -> Result<PublicKey, Error> {
        let pk = self.inner.recover_verifying_key(msg)?;
        Ok(PublicKey { inner: pk })
    }

    pub fn rsv(&self) -> (H256, H256, u8) {
        let bytes = self.to_bytes();
        (
            H256::from_slice(&bytes[..32]),
            H256::from_slice(&bytes[32..64]),
            bytes[64],
        )
    }
}

/// Recovers the signer of `msg` and compares it with `address`. Any parse or
/// recovery failure counts as a mismatch.
pub fn verify_address(msg: &[u8], signature: &[u8], address: &H160) -> bool {
    Signature::from_bytes(signature)
        .and_then(|sig| sig.recover_public_key(msg))
        .map(|public| public.address() == *address)
        .unwrap_or(false)
}
