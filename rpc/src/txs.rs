use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use warp::{Filter, Rejection, Reply};

use blockchain::ChainState;
use primitive_types::H256;
use types::events::LocalEventMessage;
use types::tx::{Transaction, TxOutput};
use types::utxo::UtxoKey;
use types::Address;

use crate::error::{reject, RpcError};
use crate::{with_service, RPC_LOG_TARGET};

#[derive(Deserialize, Debug)]
pub struct TransactRequest {
    pub inputs: Vec<UtxoKey>,
    pub outputs: Vec<TxOutput>,
    #[serde(default)]
    pub fee: u64,
    pub from: Address,
}

/// Hex of a signed transaction encoding, with or without `0x`.
#[derive(Deserialize, Debug)]
pub struct RawTransactionRequest {
    pub tx: String,
}

#[derive(Serialize, Debug)]
pub struct TransactionResponse {
    pub hash: H256,
    pub tx: Transaction,
}

pub(crate) struct TransactionsServiceImpl {
    chain: Arc<ChainState>,
    sender: UnboundedSender<LocalEventMessage>,
}

impl TransactionsServiceImpl {
    pub(crate) fn new(chain: Arc<ChainState>, sender: UnboundedSender<LocalEventMessage>) -> Self {
        Self { chain, sender }
    }

    async fn transact(&self, request: TransactRequest) -> Result<TransactionResponse, RpcError> {
        let tx = self
            .chain
            .create_transaction(&request.inputs, &request.outputs, request.fee, &request.from)
            .await?;
        Ok(self.announce(tx))
    }

    async fn submit_raw(
        &self,
        request: RawTransactionRequest,
    ) -> Result<TransactionResponse, RpcError> {
        let bytes = hex::decode(request.tx.trim().trim_start_matches("0x"))
            .map_err(|e| RpcError::BadRequest(format!("invalid hex: {}", e)))?;
        let tx = Transaction::decode(&bytes).map_err(|e| RpcError::BadRequest(e.to_string()))?;
        self.chain.submit_transaction(tx).await?;
        Ok(self.announce(tx))
    }

    fn announce(&self, tx: Transaction) -> TransactionResponse {
        let hash = tx.hash();
        debug!(target: RPC_LOG_TARGET, hash = ?hash, "Transaction accepted");
        if self.sender.send(LocalEventMessage::BroadcastTx(tx)).is_err() {
            warn!(target: RPC_LOG_TARGET, hash = ?hash, "Local event channel closed, transaction not broadcast");
        }
        TransactionResponse { hash, tx }
    }
}

pub(crate) fn routes(
    service: Arc<TransactionsServiceImpl>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let transact = warp::path!("transact")
        .and(warp::post())
        .and(with_service(service.clone()))
        .and(warp::body::json())
        .and_then(
            |service: Arc<TransactionsServiceImpl>, request: TransactRequest| async move {
                service
                    .transact(request)
                    .await
                    .map(|response| warp::reply::json(&response))
                    .map_err(reject)
            },
        );

    let submit = warp::path!("transactions")
        .and(warp::post())
        .and(with_service(service))
        .and(warp::body::json())
        .and_then(
            |service: Arc<TransactionsServiceImpl>, request: RawTransactionRequest| async move {
                service
                    .submit_raw(request)
                    .await
                    .map(|response| warp::reply::json(&response))
                    .map_err(reject)
            },
        );

    transact.or(submit)
}
