use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use warp::{Filter, Rejection, Reply};

use blockchain::ChainState;
use primitive_types::H256;
use types::block::{Block, BlockHeader};
use types::events::LocalEventMessage;
use types::tx::Transaction;

use crate::error::{reject, RpcError};
use crate::{with_service, RPC_LOG_TARGET};

#[derive(Serialize, Debug, Clone)]
pub struct BlockView {
    pub hash: H256,
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            hash: block.hash(),
            header: *block.header(),
            transactions: block.transactions().clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct PendingTransaction {
    pub hash: H256,
    pub tx: Transaction,
}

pub(crate) struct ChainServiceImpl {
    chain: Arc<ChainState>,
    sender: UnboundedSender<LocalEventMessage>,
}

impl ChainServiceImpl {
    pub(crate) fn new(chain: Arc<ChainState>, sender: UnboundedSender<LocalEventMessage>) -> Self {
        Self { chain, sender }
    }

    async fn mine_block(&self) -> Result<BlockView, RpcError> {
        let block = self.chain.assemble_block().await?;
        info!(target: RPC_LOG_TARGET, number = block.number(), hash = ?block.hash(), "Block mined on request");
        let view = BlockView::from(block.as_ref());
        if self.sender.send(LocalEventMessage::MinedBlock(block)).is_err() {
            warn!(target: RPC_LOG_TARGET, "Local event channel closed, block not broadcast");
        }
        Ok(view)
    }
}

pub(crate) fn routes(
    service: Arc<ChainServiceImpl>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let blocks = warp::path!("blocks")
        .and(warp::get())
        .and(with_service(service.clone()))
        .map(|service: Arc<ChainServiceImpl>| {
            let blocks: Vec<BlockView> = service
                .chain
                .blocks()
                .iter()
                .map(|block| BlockView::from(block.as_ref()))
                .collect();
            warp::reply::json(&blocks)
        });

    let latest = warp::path!("blocks" / "latest")
        .and(warp::get())
        .and(with_service(service.clone()))
        .map(|service: Arc<ChainServiceImpl>| {
            warp::reply::json(&BlockView::from(service.chain.head().as_ref()))
        });

    let status = warp::path!("status")
        .and(warp::get())
        .and(with_service(service.clone()))
        .map(|service: Arc<ChainServiceImpl>| warp::reply::json(&service.chain.status()));

    let utxos = warp::path!("utxo")
        .and(warp::get())
        .and(with_service(service.clone()))
        .map(|service: Arc<ChainServiceImpl>| warp::reply::json(&service.chain.utxos().to_vec()));

    let pool = warp::path!("pool")
        .and(warp::get())
        .and(with_service(service.clone()))
        .map(|service: Arc<ChainServiceImpl>| {
            let pending: Vec<PendingTransaction> = service
                .chain
                .pool()
                .into_iter()
                .map(|tx| PendingTransaction { hash: tx.hash(), tx })
                .collect();
            warp::reply::json(&pending)
        });

    let mine = warp::path!("mineBlock")
        .and(warp::post())
        .and(with_service(service))
        .and_then(|service: Arc<ChainServiceImpl>| async move {
            service
                .mine_block()
                .await
                .map(|view| warp::reply::json(&view))
                .map_err(reject)
        });

    blocks.or(latest).or(status).or(utxos).or(pool).or(mine)
}
