use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace, warn};

use blockchain::ChainState;
use traits::{ChainReader, Handler};
use types::block::Block;
use types::PeerId;

use crate::message::{MessageKind, NodeToPeerMessage, PeerMessage, PeerTarget};
use crate::request_handler::RequestHandler;

const SYNC_LOG_TARGET: &str = "sync";

/// What reconciling a received chain did to the local chain.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SyncOutcome {
    Ignored,
    Appended,
    RequestedFullChain,
    Replaced,
}

/// Per-message gossip logic shared by every connection.
pub struct SyncService {
    chain: Arc<ChainState>,
    requests: RequestHandler,
    sender: UnboundedSender<NodeToPeerMessage>,
}

impl SyncService {
    pub fn new(chain: Arc<ChainState>, sender: UnboundedSender<NodeToPeerMessage>) -> Self {
        let reader: Arc<dyn ChainReader> = chain.clone();
        Self {
            chain,
            requests: RequestHandler::new(reader),
            sender,
        }
    }

    pub async fn handle_remote_message(&self, peer_id: PeerId, msg: PeerMessage) -> Result<()> {
        let kind = match msg.kind() {
            Some(kind) => kind,
            None => bail!("unknown message kind from peer {}", peer_id),
        };
        trace!(target: SYNC_LOG_TARGET, peer_id, kind = ?kind, size = msg.data().len(), "Received peer message");
        match kind {
            MessageKind::QueryLatest | MessageKind::QueryAll => {
                if let Some(reply) = self.requests.handle(&msg) {
                    self.send_peer_message(PeerTarget::Peer(peer_id), reply)?;
                }
                Ok(())
            }
            MessageKind::ResponseChain => {
                let blocks = msg.blocks()?;
                self.reconcile(peer_id, blocks).await.map(|_| ())
            }
            MessageKind::ResponseTransaction => self.import_transaction(peer_id, &msg).await,
        }
    }

    pub async fn reconcile(&self, peer_id: PeerId, mut blocks: Vec<Block>) -> Result<SyncOutcome> {
        blocks.sort_by_key(|block| block.number());
        let remote_head = match blocks.last() {
            Some(head) => head.clone(),
            None => {
                debug!(target: SYNC_LOG_TARGET, peer_id, "Peer sent an empty chain");
                return Ok(SyncOutcome::Ignored);
            }
        };
        let local_head = self.chain.head();
        if remote_head.number() <= local_head.number() {
            trace!(target: SYNC_LOG_TARGET, peer_id, remote = remote_head.number(), local = local_head.number(), "Received chain is not longer");
            return Ok(SyncOutcome::Ignored);
        }

        if *remote_head.previous_hash() == local_head.hash() {
            let head = self.chain.append(remote_head).await?;
            info!(target: SYNC_LOG_TARGET, peer_id, number = head.number(), "Extended chain from peer");
            self.broadcast_head(&head)?;
            return Ok(SyncOutcome::Appended);
        }

        if blocks.len() == 1 {
            debug!(target: SYNC_LOG_TARGET, peer_id, remote = remote_head.number(), local = local_head.number(), "Peer is ahead, requesting full chain");
            self.send_peer_message(PeerTarget::Peer(peer_id), PeerMessage::query_all())?;
            return Ok(SyncOutcome::RequestedFullChain);
        }

        self.chain.replace(blocks).await?;
        let head = self.chain.head();
        info!(target: SYNC_LOG_TARGET, peer_id, number = head.number(), "Replaced chain with peer chain");
        self.broadcast_head(&head)?;
        Ok(SyncOutcome::Replaced)
    }

    async fn import_transaction(&self, peer_id: PeerId, msg: &PeerMessage) -> Result<()> {
        let tx = msg.transaction()?;
        let hash = tx.hash();
        if self.chain.snapshot().pool().contains(&hash) {
            trace!(target: SYNC_LOG_TARGET, peer_id, hash = ?hash, "Transaction already pooled");
            return Ok(());
        }
        self.chain.submit_transaction(tx).await?;
        debug!(target: SYNC_LOG_TARGET, peer_id, hash = ?hash, "Imported transaction from peer");
        self.send_peer_message(
            PeerTarget::AllExcept(peer_id),
            PeerMessage::response_transaction(&tx),
        )
    }

    fn broadcast_head(&self, head: &Block) -> Result<()> {
        self.send_peer_message(PeerTarget::All, PeerMessage::response_chain([head]))
    }

    fn send_peer_message(&self, target: PeerTarget, message: PeerMessage) -> Result<()> {
        self.sender
            .send(NodeToPeerMessage::new(target, message))
            .map_err(|e| anyhow::anyhow!("peer channel closed: {}", e))
    }
}

#[async_trait]
impl Handler<PeerMessage> for SyncService {
    async fn handle(&self, peer_id: PeerId, msg: PeerMessage) {
        if let Err(error) = self.handle_remote_message(peer_id, msg).await {
            warn!(target: SYNC_LOG_TARGET, peer_id, error = %error, "Failed to handle remote message");
        }
    }
}
