//! Transport-agnostic processing of client frames.
//!
//! A `ConnectionHandler` owns the per-connection protocol state and turns
//! each inbound text frame into zero or more outbound frames. It never
//! touches the socket; the transport loop feeds it frames and drains the
//! outbound queue.

use crate::error::ConnectionError;
use crate::network::limit::{FloodLimiter, Verdict};
use crate::reconcile;
use crate::state::{ConnId, Hub, Outbound};
use chrono::Utc;
use pitboss_proto::{ClientMessage, Operation, ParticipantId, ServerMessage, SessionId, codec};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// What the transport loop should do after a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close(String),
}

pub struct ConnectionHandler {
    hub: Arc<Hub>,
    id: ConnId,
    outbound: mpsc::Sender<Outbound>,
    participant: Option<ParticipantId>,
    limiter: FloodLimiter,
}

impl ConnectionHandler {
    pub fn new(hub: Arc<Hub>, id: ConnId, outbound: mpsc::Sender<Outbound>) -> Self {
        let limits = hub.limits();
        let limiter = FloodLimiter::new(limits.message_rate_per_second, limits.message_burst);
        Self {
            hub,
            id,
            outbound,
            participant: None,
            limiter,
        }
    }

    pub fn id(&self) -> &ConnId {
        &self.id
    }

    pub fn participant(&self) -> Option<ParticipantId> {
        self.participant
    }

    /// Greeting sent right after the upgrade.
    pub fn greet(&self) -> Flow {
        self.send(ServerMessage::Connected {
            connection_id: self.id.clone(),
        })
    }

    /// Binary frames are not part of the protocol.
    pub fn reject_binary(&mut self) -> Flow {
        self.hub.on_heartbeat(&self.id);
        self.send(ConnectionError::Malformed("binary frames are not supported".into()).to_frame())
    }

    /// Any frame counts as activity, including transport pings.
    pub fn note_activity(&self) {
        self.hub.on_heartbeat(&self.id);
    }

    /// Process one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) -> Flow {
        self.hub.on_heartbeat(&self.id);

        match self.limiter.check() {
            Verdict::Allow => {}
            Verdict::Throttle => {
                crate::metrics::record_rate_limited();
                return self.send(ConnectionError::RateLimited.to_frame());
            }
            Verdict::Disconnect => {
                crate::metrics::record_rate_limited();
                return Flow::Close("excess flood".to_string());
            }
        }

        let msg = match codec::decode_client(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn = %self.id, error = %e, "malformed frame");
                return self.send(ConnectionError::Malformed(e.to_string()).to_frame());
            }
        };
        debug!(conn = %self.id, kind = msg.kind(), "frame received");

        match self.dispatch(msg).await {
            Ok(flow) => flow,
            Err(e) => self.send(e.to_frame()),
        }
    }

    async fn dispatch(&mut self, msg: ClientMessage) -> Result<Flow, ConnectionError> {
        match msg {
            ClientMessage::Heartbeat => Ok(self.send(ServerMessage::HeartbeatAck {
                timestamp: Utc::now().timestamp_millis(),
            })),
            ClientMessage::Authenticate {
                credential,
                resume_session,
            } => self.authenticate(&credential, resume_session).await,
            ClientMessage::JoinRoom { session_id } => {
                self.require_auth()?;
                let joined = self.hub.join_room(&self.id, session_id).await?;
                if let Some(left) = joined.left
                    && let Flow::Close(reason) = self.send(ServerMessage::RoomLeft { session_id: left })
                {
                    return Ok(Flow::Close(reason));
                }
                Ok(self.send(ServerMessage::RoomJoined { session_id }))
            }
            ClientMessage::LeaveRoom => {
                self.require_auth()?;
                match self.hub.leave_room(&self.id).await {
                    Some(session_id) => Ok(self.send(ServerMessage::RoomLeft { session_id })),
                    None => Ok(Flow::Continue),
                }
            }
            ClientMessage::RequestSnapshot { session_id } => {
                self.require_auth()?;
                self.snapshot(session_id).await
            }
            ClientMessage::Submit {
                request_id,
                operation,
            } => {
                let caller = self.require_auth()?;
                self.submit(caller, request_id, operation);
                Ok(Flow::Continue)
            }
        }
    }

    async fn authenticate(
        &mut self,
        credential: &str,
        resume_session: Option<SessionId>,
    ) -> Result<Flow, ConnectionError> {
        if self.participant.is_some() {
            return Err(ConnectionError::AlreadyAuthenticated);
        }

        let participant = match self.hub.on_authenticate(&self.id, credential).await {
            Ok(participant) => participant,
            Err(failure) => {
                if let Flow::Close(reason) = self.send(ServerMessage::AuthResult {
                    success: false,
                    participant_id: None,
                    reason: Some(failure.reason()),
                }) {
                    return Ok(Flow::Close(reason));
                }
                return Err(ConnectionError::Auth(failure));
            }
        };
        self.participant = Some(participant);

        if let Flow::Close(reason) = self.send(ServerMessage::AuthResult {
            success: true,
            participant_id: Some(participant),
            reason: None,
        }) {
            return Ok(Flow::Close(reason));
        }

        if let Some(session_id) = resume_session {
            for frame in reconcile::resume(&self.hub, &self.id, session_id).await? {
                if let Flow::Close(reason) = self.send(frame) {
                    return Ok(Flow::Close(reason));
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn snapshot(&self, session_id: SessionId) -> Result<Flow, ConnectionError> {
        match self.hub.ledger.snapshot(session_id).await {
            Ok(snapshot) => Ok(self.send(ServerMessage::Snapshot { snapshot })),
            Err(e) => Ok(self.send(ServerMessage::error(e.code(), e.to_string()))),
        }
    }

    /// Run a ledger operation on its own task so a disconnect never cancels
    /// it halfway; the result goes back through the outbound queue.
    fn submit(&self, caller: ParticipantId, request_id: String, operation: Operation) {
        let hub = Arc::clone(&self.hub);
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let reply = match hub.ledger.submit(operation, caller).await {
                Ok(receipt) => ServerMessage::SubmitResult {
                    request_id,
                    receipt: Some(receipt),
                    error: None,
                },
                Err(e) => ServerMessage::SubmitResult {
                    request_id,
                    receipt: None,
                    error: Some(e.to_body()),
                },
            };
            let _ = outbound.send(Arc::new(reply)).await;
        });
    }

    fn require_auth(&self) -> Result<ParticipantId, ConnectionError> {
        self.participant.ok_or(ConnectionError::NotAuthenticated)
    }

    /// Queue a frame for this connection. A full queue means the client is
    /// not keeping up.
    fn send(&self, msg: ServerMessage) -> Flow {
        match self.outbound.try_send(Arc::new(msg)) {
            Ok(()) => Flow::Continue,
            Err(TrySendError::Full(_)) => {
                warn!(conn = %self.id, "send queue exceeded");
                crate::metrics::record_slow_consumer();
                Flow::Close("send queue exceeded".to_string())
            }
            Err(TrySendError::Closed(_)) => Flow::Close("connection closed".to_string()),
        }
    }

    /// Release everything the connection holds.
    pub async fn on_disconnect(&self) {
        self.hub.on_disconnect(&self.id).await;
    }
}
