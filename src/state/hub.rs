//! The Hub: process-scoped realtime state.
//!
//! Constructed once at startup and shared as `Arc<Hub>` by the gateway,
//! every connection task and the background workers. It owns the
//! connection and room registries, the dispatcher and the ledger engine,
//! and implements the connection contract (`on_connect`,
//! `on_authenticate`, `on_heartbeat`, `on_disconnect`) plus room
//! membership.

use crate::config::LimitsConfig;
use crate::db::Database;
use crate::error::{ConnectionError, LedgerError};
use crate::ledger::LedgerEngine;
use crate::security::{AuthFailure, IdentityVerifier};
use crate::state::managers::{CloseSignal, ConnectionManager, Outbound, RoomRegistry};
use crate::state::{ConnId, ConnIdGenerator, Dispatcher};
use pitboss_proto::{ParticipantId, ServerMessage, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Disconnect requests buffered between room actors and the worker.
const DISCONNECT_CHANNEL_SIZE: usize = 1024;

/// A freshly registered connection.
pub struct Connected {
    pub id: ConnId,
    pub sender: mpsc::Sender<Outbound>,
    pub outbound: mpsc::Receiver<Outbound>,
    pub close: Arc<CloseSignal>,
}

/// Result of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    pub session_id: SessionId,
    /// Room implicitly left to join this one.
    pub left: Option<SessionId>,
    pub members: usize,
}

pub struct Hub {
    pub connections: Arc<ConnectionManager>,
    pub rooms: Arc<RoomRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub ledger: Arc<LedgerEngine>,
    verifier: Arc<dyn IdentityVerifier>,
    ids: ConnIdGenerator,
    limits: LimitsConfig,
    shutdown: CancellationToken,
}

impl Hub {
    /// Build the hub and start its disconnect worker. Must be called inside
    /// a tokio runtime.
    pub fn new(
        db: Database,
        verifier: Arc<dyn IdentityVerifier>,
        limits: LimitsConfig,
    ) -> Arc<Self> {
        let (disconnect_tx, mut disconnect_rx) =
            mpsc::channel::<(ConnId, String)>(DISCONNECT_CHANNEL_SIZE);

        let connections = Arc::new(ConnectionManager::new());
        let rooms = Arc::new(RoomRegistry::new(disconnect_tx.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&connections),
            Arc::clone(&rooms),
            disconnect_tx,
        ));
        let ledger = Arc::new(LedgerEngine::new(
            db,
            dispatcher.clone(),
            limits.snapshot_transactions,
        ));

        // Process disconnect requests outside room actors.
        {
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Some((conn, reason)) = disconnect_rx.recv().await {
                    if connections.close(&conn, &reason) {
                        info!(conn = %conn, reason = %reason, "disconnect requested");
                    }
                }
            });
        }

        Arc::new(Self {
            connections,
            rooms,
            dispatcher,
            ledger,
            verifier,
            ids: ConnIdGenerator::new("C"),
            limits,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ========================================================================
    // Connection contract
    // ========================================================================

    /// Register a new unauthenticated connection.
    pub fn on_connect(&self) -> Connected {
        let id = self.ids.next();
        let (tx, outbound) = mpsc::channel(self.limits.outbound_queue);
        let close = Arc::new(CloseSignal::default());
        self.connections
            .register(id.clone(), tx.clone(), Arc::clone(&close));
        debug!(conn = %id, "connection registered");
        Connected {
            id,
            sender: tx,
            outbound,
            close,
        }
    }

    /// Verify a credential and bind the connection to its participant.
    pub async fn on_authenticate(
        &self,
        conn: &ConnId,
        credential: &str,
    ) -> Result<ParticipantId, AuthFailure> {
        let result = self.verifier.verify(credential).await;
        match &result {
            Ok(participant) => {
                self.connections.authenticate(conn, *participant);
                crate::metrics::record_auth("ok");
                info!(conn = %conn, participant = %participant, "authenticated");
            }
            Err(failure) => {
                crate::metrics::record_auth(failure.reason().as_str());
                debug!(conn = %conn, reason = %failure, "authentication failed");
            }
        }
        result
    }

    pub fn on_heartbeat(&self, conn: &ConnId) {
        self.connections.touch(conn);
    }

    /// Forget a connection and release its room membership.
    pub async fn on_disconnect(&self, conn: &ConnId) {
        if let Some(room) = self.connections.remove(conn) {
            self.rooms.leave(room, conn.clone()).await;
        }
        debug!(conn = %conn, "connection removed");
    }

    // ========================================================================
    // Rooms
    // ========================================================================

    /// Join a session's room, leaving the current one first. Joining the
    /// room the connection is already in changes nothing.
    pub async fn join_room(
        &self,
        conn: &ConnId,
        session_id: SessionId,
    ) -> Result<Joined, ConnectionError> {
        if self.connections.participant(conn).is_none() {
            return Err(ConnectionError::NotAuthenticated);
        }
        match self.ledger.session(session_id).await {
            Ok(_) => {}
            Err(LedgerError::SessionNotFound(id)) => {
                return Err(ConnectionError::SessionNotFound(id));
            }
            Err(e) => return Err(ConnectionError::Internal(e.to_string())),
        }

        let sender = self
            .connections
            .sender(conn)
            .ok_or_else(|| ConnectionError::Internal("connection is gone".into()))?;

        let current = self.connections.room(conn);
        if current == Some(session_id) {
            let members = self
                .rooms
                .join(session_id, conn.clone(), sender)
                .await
                .map_err(|e| ConnectionError::Internal(e.to_string()))?;
            return Ok(Joined {
                session_id,
                left: None,
                members,
            });
        }

        if let Some(previous) = current {
            self.rooms.leave(previous, conn.clone()).await;
            self.connections.set_room(conn, None);
        }
        let members = self
            .rooms
            .join(session_id, conn.clone(), sender)
            .await
            .map_err(|e| ConnectionError::Internal(e.to_string()))?;
        self.connections.set_room(conn, Some(session_id));
        debug!(conn = %conn, session = %session_id, members, "joined room");

        Ok(Joined {
            session_id,
            left: current,
            members,
        })
    }

    /// Leave the current room, if any.
    pub async fn leave_room(&self, conn: &ConnId) -> Option<SessionId> {
        let room = self.connections.set_room(conn, None)?;
        self.rooms.leave(room, conn.clone()).await;
        Some(room)
    }

    /// Send frames to a session's room.
    pub fn broadcast(&self, session_id: SessionId, messages: Vec<ServerMessage>) -> bool {
        self.dispatcher.broadcast(session_id, messages)
    }

    /// Send a frame to every connection of a participant.
    pub fn unicast(&self, participant: ParticipantId, message: ServerMessage) -> usize {
        self.dispatcher.unicast(participant, message)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Close connections silent for longer than `timeout`. Returns how many.
    pub fn reap_idle(&self, timeout: Duration) -> usize {
        let idle = self.connections.idle(timeout);
        for conn in &idle {
            self.connections.close(conn, "heartbeat timeout");
        }
        idle.len()
    }

    /// Stop accepting work and close every connection and room.
    pub async fn shutdown(&self) {
        info!("hub shutting down");
        self.shutdown.cancel();
        self.connections.close_all("server shutting down");
        self.rooms.close();
    }
}
