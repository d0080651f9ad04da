use std::convert::Infallible;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::reject::Reject;
use warp::{Rejection, Reply};

use blockchain::BlockChainError;
use txpool::TxPoolError;
use types::error::CodecError;

use crate::RPC_LOG_TARGET;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl Reject for RpcError {}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RpcError::Conflict(_) => StatusCode::CONFLICT,
            RpcError::Forbidden(_) => StatusCode::FORBIDDEN,
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for RpcError {
    fn from(error: anyhow::Error) -> Self {
        let message = format!("{:#}", error);
        if let Some(error) = error.downcast_ref::<BlockChainError>() {
            return match error {
                BlockChainError::NotOperator => RpcError::Forbidden(message),
                BlockChainError::BlockNotFound(_) => RpcError::NotFound(message),
                BlockChainError::RootChainError(_) => RpcError::Internal(message),
                BlockChainError::Codec(_) => RpcError::BadRequest(message),
                _ => RpcError::Rejected(message),
            };
        }
        if error.downcast_ref::<TxPoolError>().is_some() {
            return RpcError::Conflict(message);
        }
        if error.downcast_ref::<CodecError>().is_some() {
            return RpcError::BadRequest(message);
        }
        RpcError::Internal(message)
    }
}

pub(crate) fn reject<E: Into<RpcError>>(error: E) -> Rejection {
    warp::reject::custom(error.into())
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub(crate) async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(error) = rejection.find::<RpcError>() {
        (error.status(), error.to_string())
    } else if let Some(error) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, error.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        warn!(target: RPC_LOG_TARGET, rejection = ?rejection, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorResponse { error: message }),
        status,
    ))
}
