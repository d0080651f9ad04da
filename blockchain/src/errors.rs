use thiserror::Error;

use primitive_types::H256;
use types::error::CodecError;
use types::BlockNumber;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockChainError {
    #[error("SequenceError expected block {expected} got {actual}")]
    SequenceError {
        expected: BlockNumber,
        actual: BlockNumber,
    },
    #[error("LinkageError expected previous hash {expected:?} got {actual:?}")]
    LinkageError { expected: H256, actual: H256 },
    #[error("MerkleRootMismatch expected {expected:?} got {actual:?}")]
    MerkleRootMismatch { expected: H256, actual: H256 },
    #[error("InvalidOperatorSignature on block {0}")]
    InvalidOperatorSignature(BlockNumber),
    #[error("ContentError `{0}`")]
    ContentError(String),
    #[error("ChainInvalid `{0}`")]
    ChainInvalid(String),
    #[error("GenesisMismatch candidate genesis {0:?} differs from ours")]
    GenesisMismatch(H256),
    #[error("EmptyChain candidate has no blocks")]
    EmptyChain,
    #[error("RootChainError `{0}`")]
    RootChainError(String),
    #[error("NotOperator this node cannot sign blocks")]
    NotOperator,
    #[error("BlockNotFound {0}")]
    BlockNotFound(BlockNumber),
    #[error("`{0}`")]
    Codec(#[from] CodecError),
}

pub(crate) fn content_error<S: Into<String>>(msg: S) -> anyhow::Error {
    BlockChainError::ContentError(msg.into()).into()
}

pub(crate) fn root_chain_error(error: anyhow::Error) -> anyhow::Error {
    BlockChainError::RootChainError(format!("{:#}", error)).into()
}
