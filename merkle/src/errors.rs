use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MerkleError {
    #[error("tree levels not built, call build_tree first")]
    TreeNotReady,
    #[error("capacity {0} is not a power of two")]
    CapacityNotPowerOfTwo(usize),
    #[error("{0} leaves exceed capacity {1}")]
    TooManyLeaves(usize, usize),
    #[error("leaf index {0} out of range")]
    IndexOutOfRange(usize),
    #[error("malformed proof encoding")]
    MalformedProof,
}
