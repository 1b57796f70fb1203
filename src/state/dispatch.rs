//! Broadcast dispatcher.
//!
//! Bridges the ledger and the realtime layer: every committed
//! [`LedgerEvent`] becomes room frames for the session's room plus direct
//! alerts for individual participants. Delivery is best-effort and
//! at-most-once; absent clients get nothing and nothing is buffered.

use crate::ledger::{EventSink, LedgerEvent};
use crate::state::managers::{ConnectionManager, RoomRegistry};
use crate::state::ConnId;
use pitboss_proto::{ParticipantId, ServerMessage, SessionId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

pub struct Dispatcher {
    connections: Arc<ConnectionManager>,
    rooms: Arc<RoomRegistry>,
    disconnect_tx: mpsc::Sender<(ConnId, String)>,
}

impl Dispatcher {
    pub fn new(
        connections: Arc<ConnectionManager>,
        rooms: Arc<RoomRegistry>,
        disconnect_tx: mpsc::Sender<(ConnId, String)>,
    ) -> Self {
        Self {
            connections,
            rooms,
            disconnect_tx,
        }
    }

    /// Push frames to every member of a session's room, in order.
    pub fn broadcast(&self, session_id: SessionId, messages: Vec<ServerMessage>) -> bool {
        let frames = messages.into_iter().map(Arc::new).collect();
        self.rooms.broadcast(session_id, frames)
    }

    /// Deliver a frame to every connection authenticated as `participant`,
    /// whatever room they are in. Returns how many connections accepted it.
    pub fn unicast(&self, participant: ParticipantId, message: ServerMessage) -> usize {
        let targets = self.connections.senders_for(participant);
        if targets.is_empty() {
            return 0;
        }
        let message = Arc::new(message);
        let mut delivered = 0;
        for (conn, sender) in targets {
            match sender.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(conn = %conn, participant = %participant, "send queue exceeded");
                    crate::metrics::record_slow_consumer();
                    crate::metrics::record_dropped(1);
                    let _ = self
                        .disconnect_tx
                        .try_send((conn, "send queue exceeded".to_string()));
                }
                Err(TrySendError::Closed(_)) => crate::metrics::record_dropped(1),
            }
        }
        delivered
    }
}

impl EventSink for Dispatcher {
    fn publish(&self, event: LedgerEvent) {
        let session_id = event.session_id();
        if !self.broadcast(session_id, event.room_messages()) {
            debug!(session = %session_id, event = event.name(), "no listeners");
        }
        for (participant, alert) in event.direct_alerts() {
            self.unicast(participant, alert);
        }
    }
}
