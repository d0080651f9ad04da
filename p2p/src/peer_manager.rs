use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use types::PeerId;

use crate::message::{NodeToPeerMessage, PeerMessage, PeerTarget};
use crate::P2P_LOG_TARGET;

#[derive(Debug, Clone)]
pub struct Peer {
    pub address: SocketAddr,
    sender: UnboundedSender<PeerMessage>,
}

/// Open connections and the outbound queue of each.
#[derive(Debug, Default)]
pub struct PeerList {
    peers: DashMap<PeerId, Peer>,
    next_id: AtomicU64,
}

impl PeerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: SocketAddr, sender: UnboundedSender<PeerMessage>) -> PeerId {
        let peer_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.peers.insert(peer_id, Peer { address, sender });
        debug!(target: P2P_LOG_TARGET, peer_id, address = %address, peers = self.peers.len(), "Registered peer");
        peer_id
    }

    pub fn remove_peer(&self, peer_id: &PeerId) -> Option<SocketAddr> {
        self.peers.remove(peer_id).map(|(_, peer)| peer.address)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn get_peer(&self, peer_id: &PeerId) -> Option<SocketAddr> {
        self.peers.get(peer_id).map(|peer| peer.address)
    }

    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.peers.iter().map(|peer| peer.address).collect()
    }

    /// Queues `msg` for `peer_id`. A peer whose queue is closed is dropped.
    pub fn send(&self, peer_id: PeerId, msg: PeerMessage) -> bool {
        let delivered = match self.peers.get(&peer_id) {
            Some(peer) => peer.sender.send(msg).is_ok(),
            None => return false,
        };
        if !delivered {
            self.remove_peer(&peer_id);
        }
        delivered
    }

    pub fn broadcast(&self, msg: &PeerMessage, except: Option<PeerId>) -> usize {
        let targets: Vec<PeerId> = self
            .peers
            .iter()
            .map(|peer| *peer.key())
            .filter(|peer_id| Some(*peer_id) != except)
            .collect();
        targets
            .into_iter()
            .filter(|peer_id| self.send(*peer_id, msg.clone()))
            .count()
    }

    pub fn dispatch(&self, msg: NodeToPeerMessage) -> usize {
        let sent = match msg.target {
            PeerTarget::Peer(peer_id) => self.send(peer_id, msg.message) as usize,
            PeerTarget::All => self.broadcast(&msg.message, None),
            PeerTarget::AllExcept(peer_id) => self.broadcast(&msg.message, Some(peer_id)),
        };
        trace!(target: P2P_LOG_TARGET, target_peers = ?msg.target, sent, "Dispatched peer message");
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn address(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_broadcast_skips_origin() {
        let peers = PeerList::new();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        let a = peers.register(address(1), tx_a);
        let b = peers.register(address(2), tx_b);
        assert_ne!(a, b);

        let sent = peers.dispatch(NodeToPeerMessage::new(
            PeerTarget::AllExcept(a),
            PeerMessage::query_all(),
        ));
        assert_eq!(sent, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), PeerMessage::query_all());

        assert_eq!(peers.broadcast(&PeerMessage::query_latest(), None), 2);
        assert_eq!(peers.dispatch(NodeToPeerMessage::new(PeerTarget::Peer(b), PeerMessage::query_all())), 1);
    }

    #[test]
    fn test_closed_peer_is_removed() {
        let peers = PeerList::new();
        let (tx, rx) = unbounded_channel();
        let peer_id = peers.register(address(1), tx);
        drop(rx);
        assert!(!peers.send(peer_id, PeerMessage::query_latest()));
        assert!(peers.is_empty());
        assert_eq!(peers.get_peer(&peer_id), None);
    }
}
