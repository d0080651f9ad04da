mod blockchain;
mod error;
mod txs;
mod withdraw;


use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;
use warp::{Filter, Reply};

use ::blockchain::ChainState;
use traits::ExitGame;
use types::config::EnvironmentConfig;
use types::events::LocalEventMessage;

use crate::blockchain::ChainServiceImpl;
use crate::error::{handle_rejection, reject};
use crate::txs::TransactionsServiceImpl;
use crate::withdraw::ExitServiceImpl;

pub use crate::blockchain::{BlockView, PendingTransaction};
pub use crate::error::RpcError;

pub(crate) const RPC_LOG_TARGET: &str = "rpc";

pub(crate) fn with_service<S: Send + Sync>(
    service: Arc<S>,
) -> impl Filter<Extract = (Arc<S>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

#[derive(Deserialize, Debug)]
pub struct AddPeerRequest {
    pub peer: String,
}

#[derive(Serialize, Debug)]
pub struct AddPeerResponse {
    pub peer: String,
}

fn add_peer(
    sender: UnboundedSender<LocalEventMessage>,
    request: AddPeerRequest,
) -> Result<AddPeerResponse, RpcError> {
    let peer = request.peer.trim().to_string();
    if peer.is_empty() {
        return Err(RpcError::BadRequest("peer address is empty".to_string()));
    }
    sender
        .send(LocalEventMessage::AddPeer(peer.clone()))
        .map_err(|_| RpcError::Internal("node is shutting down".to_string()))?;
    info!(target: RPC_LOG_TARGET, peer = %peer, "Peer requested");
    Ok(AddPeerResponse { peer })
}

/// Every endpoint of the node API, with rejections rendered as JSON errors.
pub fn routes(
    chain: Arc<ChainState>,
    exit_game: Arc<dyn ExitGame>,
    sender: UnboundedSender<LocalEventMessage>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let chain_service = Arc::new(ChainServiceImpl::new(chain.clone(), sender.clone()));
    let transaction_service = Arc::new(TransactionsServiceImpl::new(chain.clone(), sender.clone()));
    let exit_service = Arc::new(ExitServiceImpl::new(chain, exit_game));

    let peers = warp::path!("addPeer")
        .and(warp::post())
        .and(warp::any().map(move || sender.clone()))
        .and(warp::body::json())
        .and_then(
            |sender: UnboundedSender<LocalEventMessage>, request: AddPeerRequest| async move {
                add_peer(sender, request)
                    .map(|response| warp::reply::json(&response))
                    .map_err(reject)
            },
        );

    blockchain::routes(chain_service)
        .or(txs::routes(transaction_service))
        .or(withdraw::routes(exit_service))
        .or(peers)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

pub async fn start_rpc_server(
    env: Arc<EnvironmentConfig>,
    chain: Arc<ChainState>,
    exit_game: Arc<dyn ExitGame>,
    sender: UnboundedSender<LocalEventMessage>,
) -> Result<SocketAddr> {
    let addr: SocketAddr = env.rpc_address().parse()?;
    let (bound, server) =
        warp::serve(routes(chain, exit_game, sender)).try_bind_ephemeral(addr)?;
    info!(target: RPC_LOG_TARGET, addr = ?bound, "RPC server running at");
    tokio::spawn(server);
    Ok(bound)
}
