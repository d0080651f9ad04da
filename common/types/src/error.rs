use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("MalformedTransaction `{0}`")]
    MalformedTransaction(String),
    #[error("MalformedBlock `{0}`")]
    MalformedBlock(String),
}

impl From<rlp::DecoderError> for CodecError {
    fn from(error: rlp::DecoderError) -> Self {
        CodecError::MalformedTransaction(error.to_string())
    }
}
