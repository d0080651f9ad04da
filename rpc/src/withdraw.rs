use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use warp::{Filter, Rejection, Reply};

use blockchain::ChainState;
use primitive_types::H256;
use traits::{ExitGame, InclusionClaim};
use types::utxo::{UtxoKey, Withdrawal};
use types::{Address, BlockNumber};

use crate::error::{reject, RpcError};
use crate::{with_service, RPC_LOG_TARGET};

#[derive(Deserialize, Debug)]
pub struct DepositRequest {
    pub address: Address,
    pub amount: u64,
}

#[derive(Serialize, Debug)]
pub struct DepositResponse {
    pub block: BlockNumber,
}

/// Output to exit, proven against the committed chain.
#[derive(Deserialize, Debug)]
pub struct WithdrawRequest {
    pub blk_num: BlockNumber,
    pub tx_index: u32,
    pub o_index: u8,
    pub from: Address,
}

/// Names the exit and the transaction spending its output.
#[derive(Deserialize, Debug)]
pub struct ChallengeRequest {
    pub exit_id: H256,
    pub blk_num: BlockNumber,
    pub tx_index: u32,
    pub o_index: u8,
    pub from: Address,
}

#[derive(Deserialize, Debug)]
pub struct FinalizeRequest {
    pub from: Address,
}

#[derive(Serialize, Debug)]
pub struct ExitResponse {
    pub exit_id: H256,
}

#[derive(Serialize, Debug)]
pub struct FinalizeResponse {
    pub withdrawals: Vec<Withdrawal>,
}

fn exit_error(error: anyhow::Error) -> RpcError {
    RpcError::Rejected(format!("{:#}", error))
}

pub(crate) struct ExitServiceImpl {
    chain: Arc<ChainState>,
    exit_game: Arc<dyn ExitGame>,
}

impl ExitServiceImpl {
    pub(crate) fn new(chain: Arc<ChainState>, exit_game: Arc<dyn ExitGame>) -> Self {
        Self { chain, exit_game }
    }

    fn claim(
        &self,
        blk_num: BlockNumber,
        tx_index: u32,
        o_index: u8,
        from: Address,
    ) -> Result<InclusionClaim, RpcError> {
        let (tx, proof) = self
            .chain
            .transaction_proof(blk_num, tx_index)
            .map_err(|e| match RpcError::from(e) {
                RpcError::Internal(message) => RpcError::NotFound(message),
                other => other,
            })?;
        Ok(InclusionClaim {
            key: UtxoKey::new(blk_num, tx_index, o_index),
            tx,
            proof,
            from,
        })
    }

    async fn deposit(&self, request: DepositRequest) -> Result<DepositResponse, RpcError> {
        let block = self
            .exit_game
            .deposit(request.address, request.amount)
            .await
            .map_err(exit_error)?;
        info!(target: RPC_LOG_TARGET, address = ?request.address, amount = request.amount, block, "Deposit requested");
        Ok(DepositResponse { block })
    }

    async fn start(&self, request: WithdrawRequest) -> Result<ExitResponse, RpcError> {
        let claim = self.claim(
            request.blk_num,
            request.tx_index,
            request.o_index,
            request.from,
        )?;
        let exit_id = self
            .exit_game
            .start_withdrawal(claim)
            .await
            .map_err(exit_error)?;
        Ok(ExitResponse { exit_id })
    }

    async fn challenge(&self, request: ChallengeRequest) -> Result<ExitResponse, RpcError> {
        let claim = self.claim(
            request.blk_num,
            request.tx_index,
            request.o_index,
            request.from,
        )?;
        self.exit_game
            .challenge_withdrawal(request.exit_id, claim)
            .await
            .map_err(exit_error)?;
        Ok(ExitResponse {
            exit_id: request.exit_id,
        })
    }

    async fn finalize(&self, request: FinalizeRequest) -> Result<FinalizeResponse, RpcError> {
        let withdrawals = self
            .exit_game
            .finalize_withdrawal(request.from)
            .await
            .map_err(exit_error)?;
        Ok(FinalizeResponse { withdrawals })
    }
}

pub(crate) fn routes(
    service: Arc<ExitServiceImpl>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let deposit = warp::path!("deposit")
        .and(warp::post())
        .and(with_service(service.clone()))
        .and(warp::body::json())
        .and_then(
            |service: Arc<ExitServiceImpl>, request: DepositRequest| async move {
                service
                    .deposit(request)
                    .await
                    .map(|response| warp::reply::json(&response))
                    .map_err(reject)
            },
        );

    let start = warp::path!("withdraw" / "create")
        .and(warp::post())
        .and(with_service(service.clone()))
        .and(warp::body::json())
        .and_then(
            |service: Arc<ExitServiceImpl>, request: WithdrawRequest| async move {
                service
                    .start(request)
                    .await
                    .map(|response| warp::reply::json(&response))
                    .map_err(reject)
            },
        );

    let challenge = warp::path!("withdraw" / "challenge")
        .and(warp::post())
        .and(with_service(service.clone()))
        .and(warp::body::json())
        .and_then(
            |service: Arc<ExitServiceImpl>, request: ChallengeRequest| async move {
                service
                    .challenge(request)
                    .await
                    .map(|response| warp::reply::json(&response))
                    .map_err(reject)
            },
        );

    let finalize = warp::path!("withdraw" / "finalize")
        .and(warp::post())
        .and(with_service(service))
        .and(warp::body::json())
        .and_then(
            |service: Arc<ExitServiceImpl>, request: FinalizeRequest| async move {
                service
                    .finalize(request)
                    .await
                    .map(|response| warp::reply::json(&response))
                    .map_err(reject)
            },
        );

    deposit.or(start).or(challenge).or(finalize)
}
