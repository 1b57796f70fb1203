//! Connection registry.
//!
//! Tracks every live connection: its outbound queue, the participant it
//! authenticated as, the room it is in and when it was last heard from. A
//! secondary index maps participants to all of their connections so direct
//! alerts reach every device.
//!
//! Lock order: `connections` shard, then `by_participant` shard. Neither is
//! held across an await.

use crate::state::ConnId;
use dashmap::DashMap;
use parking_lot::Mutex;
use pitboss_proto::{ParticipantId, ServerMessage, SessionId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One frame queued for a connection's writer.
pub type Outbound = Arc<ServerMessage>;

/// Asks a connection task to close. The first reason given wins.
#[derive(Default)]
pub struct CloseSignal {
    token: CancellationToken,
    reason: Mutex<Option<String>>,
}

impl CloseSignal {
    pub fn close(&self, reason: &str) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.to_string());
            }
        }
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`CloseSignal::close`] has been called.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

struct ConnectionEntry {
    sender: mpsc::Sender<Outbound>,
    close: Arc<CloseSignal>,
    participant: Option<ParticipantId>,
    room: Option<SessionId>,
    last_seen: Instant,
}

/// Live connections, indexed by id and by participant.
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnId, ConnectionEntry>,
    by_participant: DashMap<ParticipantId, HashSet<ConnId>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ConnId, sender: mpsc::Sender<Outbound>, close: Arc<CloseSignal>) {
        self.connections.insert(
            id,
            ConnectionEntry {
                sender,
                close,
                participant: None,
                room: None,
                last_seen: Instant::now(),
            },
        );
        crate::metrics::set_connected_clients(self.connections.len());
    }

    /// Bind a connection to a participant. Returns `false` for unknown ids.
    pub fn authenticate(&self, id: &ConnId, participant: ParticipantId) -> bool {
        let Some(mut entry) = self.connections.get_mut(id) else {
            return false;
        };
        entry.participant = Some(participant);
        self.by_participant
            .entry(participant)
            .or_default()
            .insert(id.clone());
        true
    }

    pub fn participant(&self, id: &ConnId) -> Option<ParticipantId> {
        self.connections.get(id).and_then(|e| e.participant)
    }

    pub fn room(&self, id: &ConnId) -> Option<SessionId> {
        self.connections.get(id).and_then(|e| e.room)
    }

    /// Record the connection's room and return the previous one.
    pub fn set_room(&self, id: &ConnId, room: Option<SessionId>) -> Option<SessionId> {
        self.connections
            .get_mut(id)
            .and_then(|mut e| std::mem::replace(&mut e.room, room))
    }

    pub fn sender(&self, id: &ConnId) -> Option<mpsc::Sender<Outbound>> {
        self.connections.get(id).map(|e| e.sender.clone())
    }

    /// Record inbound activity.
    pub fn touch(&self, id: &ConnId) {
        if let Some(mut e) = self.connections.get_mut(id) {
            e.last_seen = Instant::now();
        }
    }

    /// Queues of every connection authenticated as `participant`.
    pub fn senders_for(&self, participant: ParticipantId) -> Vec<(ConnId, mpsc::Sender<Outbound>)> {
        let ids: Vec<ConnId> = match self.by_participant.get(&participant) {
            Some(set) => set.iter().cloned().collect(),
            None => return Vec::new(),
        };
        ids.into_iter()
            .filter_map(|id| {
                let sender = self.connections.get(&id)?.sender.clone();
                Some((id, sender))
            })
            .collect()
    }

    /// Ask a connection to close. Returns `false` for unknown ids.
    pub fn close(&self, id: &ConnId, reason: &str) -> bool {
        match self.connections.get(id) {
            Some(e) => {
                e.close.close(reason);
                true
            }
            None => false,
        }
    }

    /// Ask every connection to close.
    pub fn close_all(&self, reason: &str) {
        for e in self.connections.iter() {
            e.close.close(reason);
        }
    }

    /// Forget a connection. Returns the room it was in, if any.
    pub fn remove(&self, id: &ConnId) -> Option<SessionId> {
        let (_, entry) = self.connections.remove(id)?;
        if let Some(participant) = entry.participant {
            self.by_participant.remove_if_mut(&participant, |_, set| {
                set.remove(id);
                set.is_empty()
            });
        }
        crate::metrics::set_connected_clients(self.connections.len());
        entry.room
    }

    /// Connections silent for longer than `timeout`.
    pub fn idle(&self, timeout: Duration) -> Vec<ConnId> {
        let now = Instant::now();
        self.connections
            .iter()
            .filter(|e| now.saturating_duration_since(e.last_seen) > timeout)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of connections authenticated as `participant`.
    pub fn devices(&self, participant: ParticipantId) -> usize {
        self.by_participant
            .get(&participant)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}
