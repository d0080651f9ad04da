use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

use codec::{Decoder, Encoder};
use traits::Handler;
use types::PeerId;

use crate::message::{NodeToPeerMessage, PeerMessage};
use crate::peer_manager::PeerList;

pub mod message;
pub mod peer_manager;
pub mod request_handler;
pub mod sync;

#[cfg(test)]
mod tests;

pub(crate) const P2P_LOG_TARGET: &str = "p2p";

/// Largest accepted frame. A full chain response travels in one frame, and
/// every block encodes all `BLOCK_CAPACITY` slots, so a chain of roughly a
/// thousand blocks with full slots no longer fits. Such a QUERY_ALL is left
/// unanswered.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// TCP transport. Every connection gets a writer task draining its queue
/// and a reader task that hands messages to the handler one at a time.
#[derive(Clone)]
pub struct Network {
    handler: Arc<dyn Handler<PeerMessage>>,
    peers: Arc<PeerList>,
}

impl Network {
    pub fn new(handler: Arc<dyn Handler<PeerMessage>>, peers: Arc<PeerList>) -> Self {
        Self { handler, peers }
    }

    pub fn peers(&self) -> Arc<PeerList> {
        self.peers.clone()
    }

    /// Binds `address` and accepts connections in the background.
    pub async fn listen(&self, address: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(address).await?;
        let local = listener.local_addr()?;
        info!(target: P2P_LOG_TARGET, address = %local, "Listening for peers");
        let network = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        network.start_connection(stream, remote);
                    }
                    Err(error) => {
                        warn!(target: P2P_LOG_TARGET, error = %error, "Failed to accept connection");
                    }
                }
            }
        });
        Ok(local)
    }

    pub async fn connect(&self, address: &str) -> Result<PeerId> {
        let stream = TcpStream::connect(address).await?;
        let remote = stream.peer_addr()?;
        Ok(self.start_connection(stream, remote))
    }

    /// Dials every address, logging the ones that cannot be reached.
    pub async fn connect_all(&self, addresses: &[String]) -> usize {
        let mut connected = 0;
        for address in addresses {
            match self.connect(address).await {
                Ok(_) => connected += 1,
                Err(error) => {
                    warn!(target: P2P_LOG_TARGET, peer = %address, error = %error, "Failed to connect to peer");
                }
            }
        }
        connected
    }

    fn start_connection(&self, stream: TcpStream, remote: SocketAddr) -> PeerId {
        let (mut sink, mut inbound) = Framed::new(stream, frame_codec()).split();
        let (sender, mut outbound) = unbounded_channel::<PeerMessage>();
        let peer_id = self.peers.register(remote, sender);
        info!(target: P2P_LOG_TARGET, peer_id, address = %remote, "Connection established");

        tokio::spawn(async move {
            while let Some(msg) = outbound.recv().await {
                let bytes = match msg.encode() {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        warn!(target: P2P_LOG_TARGET, peer_id, error = %error, "Failed to encode message");
                        continue;
                    }
                };
                if let Err(error) = sink.send(Bytes::from(bytes)).await {
                    debug!(target: P2P_LOG_TARGET, peer_id, error = %error, "Write failed");
                    break;
                }
            }
        });

        let handler = self.handler.clone();
        let peers = self.peers.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbound.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(error) => {
                        debug!(target: P2P_LOG_TARGET, peer_id, error = %error, "Read failed");
                        break;
                    }
                };
                match PeerMessage::decode(&frame) {
                    Ok(msg) => handler.handle(peer_id, msg).await,
                    Err(error) => {
                        warn!(target: P2P_LOG_TARGET, peer_id, error = %error, "Dropping undecodable message");
                    }
                }
            }
            peers.remove_peer(&peer_id);
            info!(target: P2P_LOG_TARGET, peer_id, address = %remote, "Connection closed");
        });

        self.peers.send(peer_id, PeerMessage::query_latest());
        peer_id
    }
}

/// Routes node-to-peer messages to the peer list until the channel closes.
pub fn start_dispatcher(
    peers: Arc<PeerList>,
    mut node_to_peer: UnboundedReceiver<NodeToPeerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = node_to_peer.recv().await {
            peers.dispatch(msg);
        }
    })
}
