//! Room registry.
//!
//! Maps session ids to room actors, creating an actor on first join. The
//! registry itself never blocks on members: broadcasts are posted to the
//! actor's unbounded mailbox and return immediately.

use crate::error::RoomError;
use crate::state::actor::{RoomActor, RoomEvent, RoomHandle, RoomMap};
use crate::state::{ConnId, Outbound};
use pitboss_proto::SessionId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Attempts before a join against draining actors gives up.
const JOIN_ATTEMPTS: usize = 3;

/// Room management state and behavior.
pub struct RoomRegistry {
    rooms: Arc<RoomMap>,
    generation: AtomicU64,
    closed: AtomicBool,
    disconnect_tx: mpsc::Sender<(ConnId, String)>,
}

impl RoomRegistry {
    pub fn new(disconnect_tx: mpsc::Sender<(ConnId, String)>) -> Self {
        Self {
            rooms: Arc::new(RoomMap::new()),
            generation: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            disconnect_tx,
        }
    }

    /// Get an existing room actor or spawn a new one.
    fn get_or_create(&self, session_id: SessionId) -> RoomHandle {
        let handle = self
            .rooms
            .entry(session_id)
            .or_insert_with(|| {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                RoomActor::spawn(
                    session_id,
                    generation,
                    Arc::downgrade(&self.rooms),
                    self.disconnect_tx.clone(),
                )
            })
            .clone();
        crate::metrics::set_active_rooms(self.rooms.len());
        handle
    }

    fn forget(&self, session_id: SessionId, generation: u64) {
        self.rooms
            .remove_if(&session_id, |_, h| h.generation == generation);
    }

    /// Add a connection to a room. Returns the member count.
    ///
    /// A draining actor rejects the join; the stale handle is dropped and the
    /// join retried against a fresh actor.
    pub async fn join(
        &self,
        session_id: SessionId,
        conn: ConnId,
        sender: mpsc::Sender<Outbound>,
    ) -> Result<usize, RoomError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RoomError::Closed);
        }
        let mut last = RoomError::Closed;
        for _ in 0..JOIN_ATTEMPTS {
            let handle = self.get_or_create(session_id);
            let (reply_tx, reply_rx) = oneshot::channel();
            let event = RoomEvent::Join {
                conn: conn.clone(),
                sender: sender.clone(),
                reply_tx,
            };
            if handle.tx.send(event).is_err() {
                self.forget(session_id, handle.generation);
                last = RoomError::Closed;
                continue;
            }
            match reply_rx.await {
                Ok(Ok(count)) => return Ok(count),
                Ok(Err(err)) => {
                    debug!(session = %session_id, error = %err, "retrying join on a fresh room");
                    self.forget(session_id, handle.generation);
                    last = err;
                }
                Err(_) => {
                    self.forget(session_id, handle.generation);
                    last = RoomError::Closed;
                }
            }
        }
        Err(last)
    }

    /// Remove a connection from a room. Returns the remaining member count.
    pub async fn leave(&self, session_id: SessionId, conn: ConnId) -> usize {
        let Some(handle) = self.rooms.get(&session_id).map(|h| h.value().clone()) else {
            return 0;
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        let event = RoomEvent::Leave {
            conn,
            reply_tx: Some(reply_tx),
        };
        if handle.tx.send(event).is_err() {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }

    /// Post frames to a room. Returns `false` when nobody is in it.
    pub fn broadcast(&self, session_id: SessionId, messages: Vec<Outbound>) -> bool {
        let Some(handle) = self.rooms.get(&session_id).map(|h| h.value().clone()) else {
            return false;
        };
        handle.tx.send(RoomEvent::Broadcast { messages }).is_ok()
    }

    /// Current members of a room.
    pub async fn members(&self, session_id: SessionId) -> Vec<ConnId> {
        let Some(handle) = self.rooms.get(&session_id).map(|h| h.value().clone()) else {
            return Vec::new();
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if handle.tx.send(RoomEvent::Members { reply_tx }).is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.rooms.contains_key(&session_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Drop every actor handle; actors stop once their mailboxes drain.
    /// Drop every room and refuse further joins.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.rooms.clear();
        crate::metrics::set_active_rooms(0);
    }
}
