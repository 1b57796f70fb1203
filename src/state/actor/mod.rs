//! Actor model for room state.
//!
//! Each room is a `RoomActor` running in its own tokio task. The actor owns
//! the member set and processes [`RoomEvent`]s one at a time from an
//! unbounded FIFO mailbox, so frames pushed by the dispatcher reach every
//! member in the order they were published.
//!
//! - **Fan-out**: `try_send` into each member's bounded queue. A full queue
//!   marks the member as a slow consumer: it is dropped from the room and a
//!   disconnect is requested. Fan-out never waits on a client.
//! - **Lifecycle**: when the last member leaves, the actor starts draining.
//!   It removes itself from the registry and answers later joins with
//!   [`RoomError::Tombstone`] so the registry retries on a fresh actor.

use crate::error::RoomError;
use crate::state::{ConnId, Outbound};
use dashmap::DashMap;
use pitboss_proto::SessionId;
use std::collections::HashMap;
use std::sync::Weak;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

mod types;

pub use types::RoomEvent;

/// Mailbox address of a room actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub tx: mpsc::UnboundedSender<RoomEvent>,
    /// Distinguishes successive actors for the same session.
    pub generation: u64,
}

/// Live room actors keyed by session.
pub type RoomMap = DashMap<SessionId, RoomHandle>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActorState {
    Active,
    Draining,
}

/// The Room Actor.
pub struct RoomActor {
    session_id: SessionId,
    generation: u64,
    members: HashMap<ConnId, mpsc::Sender<Outbound>>,
    rooms: Weak<RoomMap>,
    disconnect_tx: mpsc::Sender<(ConnId, String)>,
    state: ActorState,
}

impl RoomActor {
    /// Create a room actor and spawn it.
    pub fn spawn(
        session_id: SessionId,
        generation: u64,
        rooms: Weak<RoomMap>,
        disconnect_tx: mpsc::Sender<(ConnId, String)>,
    ) -> RoomHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = Self {
            session_id,
            generation,
            members: HashMap::new(),
            rooms,
            disconnect_tx,
            state: ActorState::Active,
        };
        tokio::spawn(actor.run(rx));
        RoomHandle { tx, generation }
    }

    /// The main actor loop. Ends once every handle has been dropped.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event);
        }
        debug!(session = %self.session_id, generation = self.generation, "room actor stopped");
    }

    fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Join {
                conn,
                sender,
                reply_tx,
            } => self.handle_join(conn, sender, reply_tx),
            RoomEvent::Leave { conn, reply_tx } => {
                self.members.remove(&conn);
                self.cleanup_if_empty();
                if let Some(reply_tx) = reply_tx {
                    let _ = reply_tx.send(self.members.len());
                }
            }
            RoomEvent::Broadcast { messages } => self.handle_broadcast(&messages),
            RoomEvent::Members { reply_tx } => {
                let _ = reply_tx.send(self.members.keys().cloned().collect());
            }
        }
    }

    fn handle_join(
        &mut self,
        conn: ConnId,
        sender: mpsc::Sender<Outbound>,
        reply_tx: oneshot::Sender<Result<usize, RoomError>>,
    ) {
        if self.state == ActorState::Draining {
            let _ = reply_tx.send(Err(RoomError::Tombstone));
            return;
        }
        self.members.insert(conn, sender);
        let _ = reply_tx.send(Ok(self.members.len()));
    }

    fn handle_broadcast(&mut self, messages: &[Outbound]) {
        for msg in messages {
            let mut delivered = 0usize;
            let mut gone = Vec::new();
            for (conn, sender) in &self.members {
                match sender.try_send(msg.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(session = %self.session_id, conn = %conn, "send queue exceeded");
                        crate::metrics::record_slow_consumer();
                        self.request_disconnect(conn, "send queue exceeded");
                        gone.push(conn.clone());
                    }
                    Err(TrySendError::Closed(_)) => gone.push(conn.clone()),
                }
            }
            crate::metrics::record_fanout(delivered);
            if !gone.is_empty() {
                crate::metrics::record_dropped(gone.len() as u64);
                for conn in &gone {
                    self.members.remove(conn);
                }
            }
        }
        self.cleanup_if_empty();
    }

    fn request_disconnect(&self, conn: &ConnId, reason: &str) {
        let _ = self
            .disconnect_tx
            .try_send((conn.clone(), reason.to_string()));
    }

    fn cleanup_if_empty(&mut self) {
        if self.state == ActorState::Draining || !self.members.is_empty() {
            return;
        }
        self.state = ActorState::Draining;
        if let Some(rooms) = self.rooms.upgrade() {
            let generation = self.generation;
            rooms.remove_if(&self.session_id, |_, handle| handle.generation == generation);
            crate::metrics::set_active_rooms(rooms.len());
        }
        debug!(session = %self.session_id, "room drained");
    }
}
