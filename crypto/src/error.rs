use core::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum Error {
    EcdsaError(k256::ecdsa::Error),
    InvalidLength { expected: usize, actual: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::EcdsaError(t) => {
                write!(f, "EcdsaError {}", t)
            }
            Error::InvalidLength { expected, actual } => {
                write!(f, "InvalidLength expected {} got {}", expected, actual)
            }
        }
    }
}

impl From<k256::ecdsa::Error> for Error {
    fn from(value: k256::ecdsa::Error) -> Self {
        Error::EcdsaError(value)
    }
}

impl std::error::Error for Error {}
