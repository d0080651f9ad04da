use std::sync::Arc;

use tracing::warn;

use traits::ChainReader;

use crate::message::{MessageKind, PeerMessage};
use crate::{MAX_FRAME_LENGTH, P2P_LOG_TARGET};

/// Envelope bytes bincode adds around the payload: the kind tag and the
/// payload length.
const ENVELOPE_OVERHEAD: usize = 1 + 8;

/// Answers the two chain queries straight from the committed chain.
pub struct RequestHandler {
    chain: Arc<dyn ChainReader>,
    max_frame: usize,
}

impl RequestHandler {
    pub fn new(chain: Arc<dyn ChainReader>) -> Self {
        Self {
            chain,
            max_frame: MAX_FRAME_LENGTH,
        }
    }

    pub fn handle(&self, request: &PeerMessage) -> Option<PeerMessage> {
        match request.kind()? {
            MessageKind::QueryLatest => {
                let head = self.chain.head();
                Some(PeerMessage::response_chain([head.as_ref()]))
            }
            MessageKind::QueryAll => {
                let blocks = self.chain.blocks();
                let response =
                    PeerMessage::response_chain(blocks.iter().map(|block| block.as_ref()));
                if response.data().len() + ENVELOPE_OVERHEAD > self.max_frame {
                    warn!(
                        target: P2P_LOG_TARGET,
                        blocks = blocks.len(),
                        bytes = response.data().len(),
                        "Full chain does not fit in one frame, query left unanswered"
                    );
                    return None;
                }
                Some(response)
            }
            _ => None,
        }
    }
}
