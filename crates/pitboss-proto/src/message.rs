//! Client and server frames.

use crate::model::{
    ParticipantId, ParticipantRecord, SessionId, SessionSnapshot, SessionStatus, TopUpRequest,
    Transaction,
};
use crate::operation::{Operation, Receipt};
use serde::{Deserialize, Serialize};

wire_enum! {
    /// Why an authentication attempt failed.
    AuthFailureReason {
        /// Credential was well formed and signed, but past its expiry.
        Expired => "EXPIRED",
        /// Credential could not be verified.
        Invalid => "INVALID",
    }
}

wire_enum! {
    /// Stable machine-readable error codes.
    ErrorCode {
        /// Credential expired.
        AuthExpired => "AUTH_EXPIRED",
        /// Credential invalid.
        AuthInvalid => "AUTH_INVALID",
        /// Operation requires an authenticated connection.
        NotAuthenticated => "NOT_AUTHENTICATED",
        /// Connection is already authenticated.
        AlreadyAuthenticated => "ALREADY_AUTHENTICATED",
        /// Frame could not be decoded.
        Malformed => "MALFORMED",
        /// Too many frames in too short a time.
        RateLimited => "RATE_LIMITED",
        /// Unknown session.
        SessionNotFound => "SESSION_NOT_FOUND",
        /// Caller may not perform this operation.
        NotAuthorized => "NOT_AUTHORIZED",
        /// Lifecycle action not allowed from the current status.
        InvalidTransition => "INVALID_TRANSITION",
        /// Amount out of range or too precise.
        InvalidAmount => "INVALID_AMOUNT",
        /// Correction reason missing.
        InvalidReason => "INVALID_REASON",
        /// Session status does not accept this operation.
        SessionNotMutable => "SESSION_NOT_MUTABLE",
        /// Participant already cashed out.
        AlreadySettled => "ALREADY_SETTLED",
        /// Participant has no record in the session.
        ParticipantNotFound => "PARTICIPANT_NOT_FOUND",
        /// Participant already has a record in the session.
        ParticipantExists => "PARTICIPANT_EXISTS",
        /// Unknown top-up request.
        TopUpNotFound => "TOP_UP_NOT_FOUND",
        /// Top-up request already resolved.
        TopUpNotPending => "TOP_UP_NOT_PENDING",
        /// Store temporarily unavailable; nothing was committed.
        StoreUnavailable => "STORE_UNAVAILABLE",
        /// Unexpected server failure.
        Internal => "INTERNAL",
    }
}

wire_enum! {
    /// Kind of a participant-addressed alert.
    AlertKind {
        /// A participant asked the operator for a top-up.
        TopUpRequested => "TOP_UP_REQUESTED",
        /// The operator approved or declined the participant's top-up.
        TopUpResolved => "TOP_UP_RESOLVED",
        /// The participant was invited to a session.
        Invitation => "INVITATION",
    }
}

/// Error code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl ErrorBody {
    /// Build an error body.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Present a credential, optionally resuming a previously joined room.
    Authenticate {
        /// Signed token.
        credential: String,
        /// Session room to rejoin after a reconnect.
        #[serde(default)]
        resume_session: Option<SessionId>,
    },
    /// Subscribe to a session's room.
    JoinRoom {
        /// Session to watch.
        session_id: SessionId,
    },
    /// Leave the current room.
    LeaveRoom,
    /// Keep-alive.
    Heartbeat,
    /// Fetch the current state of a session.
    RequestSnapshot {
        /// Session to fetch.
        session_id: SessionId,
    },
    /// Submit a ledger operation.
    Submit {
        /// Caller-chosen correlation id echoed in the result.
        request_id: String,
        /// The operation.
        operation: Operation,
    },
}

impl ClientMessage {
    /// Frame type name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Authenticate { .. } => "AUTHENTICATE",
            ClientMessage::JoinRoom { .. } => "JOIN_ROOM",
            ClientMessage::LeaveRoom => "LEAVE_ROOM",
            ClientMessage::Heartbeat => "HEARTBEAT",
            ClientMessage::RequestSnapshot { .. } => "REQUEST_SNAPSHOT",
            ClientMessage::Submit { .. } => "SUBMIT",
        }
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(clippy::large_enum_variant)]
pub enum ServerMessage {
    /// Sent once when the transport is established.
    Connected {
        /// Server-assigned connection id.
        connection_id: String,
    },
    /// Outcome of an `AUTHENTICATE` frame.
    AuthResult {
        /// Whether the credential was accepted.
        success: bool,
        /// Authenticated participant on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_id: Option<ParticipantId>,
        /// Failure reason otherwise.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<AuthFailureReason>,
    },
    /// The connection is now a member of the session's room.
    RoomJoined {
        /// Joined session.
        session_id: SessionId,
    },
    /// The connection left the session's room.
    RoomLeft {
        /// Left session.
        session_id: SessionId,
    },
    /// Reply to `HEARTBEAT`.
    HeartbeatAck {
        /// Server time in unix milliseconds.
        timestamp: i64,
    },
    /// Connection-level failure.
    Error {
        /// Machine-readable code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
    /// A transaction was committed.
    LedgerEvent {
        /// Session the transaction belongs to.
        session_id: SessionId,
        /// The new entry.
        transaction: Transaction,
        /// Participant aggregate after the entry.
        participant: ParticipantRecord,
    },
    /// The session changed status.
    SessionStatusChanged {
        /// Affected session.
        session_id: SessionId,
        /// New status.
        status: SessionStatus,
        /// Status-specific details, e.g. the settlement on completion.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<serde_json::Value>,
    },
    /// A participant record changed without a transaction.
    ParticipantUpdated {
        /// Affected session.
        session_id: SessionId,
        /// Updated record.
        participant: ParticipantRecord,
    },
    /// Participants were invited.
    ParticipantsInvited {
        /// Affected session.
        session_id: SessionId,
        /// New records.
        participants: Vec<ParticipantRecord>,
    },
    /// A participant asked for a top-up.
    TopUpRequested {
        /// Affected session.
        session_id: SessionId,
        /// The request.
        request: TopUpRequest,
    },
    /// The operator resolved a top-up request.
    TopUpResolved {
        /// Affected session.
        session_id: SessionId,
        /// The resolved request.
        request: TopUpRequest,
    },
    /// Alert addressed to a single participant, on every device.
    DirectAlert {
        /// Alert kind.
        kind: AlertKind,
        /// Alert payload.
        payload: serde_json::Value,
    },
    /// Client state may be stale; fetch a snapshot.
    RefreshRequired {
        /// Session to refresh.
        session_id: SessionId,
    },
    /// Reply to `REQUEST_SNAPSHOT`.
    Snapshot {
        /// Current state.
        snapshot: SessionSnapshot,
    },
    /// Reply to `SUBMIT`.
    SubmitResult {
        /// Correlation id from the request.
        request_id: String,
        /// Receipt on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receipt: Option<Receipt>,
        /// Error on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },
}

impl ServerMessage {
    /// Build an `ERROR` frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }

    /// Frame type name, for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "CONNECTED",
            ServerMessage::AuthResult { .. } => "AUTH_RESULT",
            ServerMessage::RoomJoined { .. } => "ROOM_JOINED",
            ServerMessage::RoomLeft { .. } => "ROOM_LEFT",
            ServerMessage::HeartbeatAck { .. } => "HEARTBEAT_ACK",
            ServerMessage::Error { .. } => "ERROR",
            ServerMessage::LedgerEvent { .. } => "LEDGER_EVENT",
            ServerMessage::SessionStatusChanged { .. } => "SESSION_STATUS_CHANGED",
            ServerMessage::ParticipantUpdated { .. } => "PARTICIPANT_UPDATED",
            ServerMessage::ParticipantsInvited { .. } => "PARTICIPANTS_INVITED",
            ServerMessage::TopUpRequested { .. } => "TOP_UP_REQUESTED",
            ServerMessage::TopUpResolved { .. } => "TOP_UP_RESOLVED",
            ServerMessage::DirectAlert { .. } => "DIRECT_ALERT",
            ServerMessage::RefreshRequired { .. } => "REFRESH_REQUIRED",
            ServerMessage::Snapshot { .. } => "SNAPSHOT",
            ServerMessage::SubmitResult { .. } => "SUBMIT_RESULT",
        }
    }
}
