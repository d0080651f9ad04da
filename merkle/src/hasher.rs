use primitive_types::H256;

pub trait HashFunction {
    fn digest(&self, input: &[u8]) -> H256;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256;

impl HashFunction for Keccak256 {
    fn digest(&self, input: &[u8]) -> H256 {
        crypto::keccak256(input)
    }
}
