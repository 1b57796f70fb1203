//! Unified error handling for pitboss.
//!
//! Two families of errors reach clients: connection-level failures, sent as
//! `ERROR` frames, and ledger failures, returned from `submit` and carried in
//! `SUBMIT_RESULT`. Both map onto the protocol's stable [`ErrorCode`]s, which
//! double as metric labels.

use crate::db::DbError;
use crate::security::AuthFailure;
use pitboss_proto::{
    ErrorBody, ErrorCode, ParticipantId, ParticipantStatus, ServerMessage, SessionAction,
    SessionId, SessionStatus,
};
use thiserror::Error;

// ============================================================================
// Connection Errors (per-connection protocol handling)
// ============================================================================

/// Errors raised while handling a client frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("authentication failed: {0}")]
    Auth(AuthFailure),

    #[error("authenticate first")]
    NotAuthenticated,

    #[error("already authenticated")]
    AlreadyAuthenticated,

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("too many messages")]
    RateLimited,

    #[error("no such session: {0}")]
    SessionNotFound(SessionId),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConnectionError {
    /// Stable protocol code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Auth(AuthFailure::Expired) => ErrorCode::AuthExpired,
            Self::Auth(AuthFailure::Invalid) => ErrorCode::AuthInvalid,
            Self::NotAuthenticated => ErrorCode::NotAuthenticated,
            Self::AlreadyAuthenticated => ErrorCode::AlreadyAuthenticated,
            Self::Malformed(_) => ErrorCode::Malformed,
            Self::RateLimited => ErrorCode::RateLimited,
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Convert to an `ERROR` frame.
    pub fn to_frame(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}

// ============================================================================
// Ledger Errors (engine operations)
// ============================================================================

/// Ledger operation errors.
///
/// Every variant except [`LedgerError::StoreUnavailable`] is a deterministic
/// rejection; nothing was written and retrying the same operation fails the
/// same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("only the session operator may do this")]
    NotAuthorized,

    #[error("cannot {action} a session that is {from}")]
    InvalidTransition {
        from: SessionStatus,
        action: SessionAction,
    },

    #[error("participant cannot go from {from} to {to}")]
    InvalidStatusChange {
        from: ParticipantStatus,
        to: ParticipantStatus,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("a correction needs a non-empty reason")]
    InvalidReason,

    #[error("session is {0} and does not accept this operation")]
    SessionNotMutable(SessionStatus),

    #[error("participant {0} has already cashed out")]
    AlreadySettled(ParticipantId),

    #[error("participant {0} is not in this session")]
    ParticipantNotFound(ParticipantId),

    #[error("no such session: {0}")]
    SessionNotFound(SessionId),

    #[error("participant {0} is already in this session")]
    ParticipantExists(ParticipantId),

    #[error("no such top-up request: {0}")]
    TopUpNotFound(i64),

    #[error("top-up request {0} was already resolved")]
    TopUpNotPending(i64),

    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// Stable protocol code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotAuthorized => ErrorCode::NotAuthorized,
            Self::InvalidTransition { .. } | Self::InvalidStatusChange { .. } => {
                ErrorCode::InvalidTransition
            }
            Self::InvalidAmount(_) => ErrorCode::InvalidAmount,
            Self::InvalidReason => ErrorCode::InvalidReason,
            Self::SessionNotMutable(_) => ErrorCode::SessionNotMutable,
            Self::AlreadySettled(_) => ErrorCode::AlreadySettled,
            Self::ParticipantNotFound(_) => ErrorCode::ParticipantNotFound,
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::ParticipantExists(_) => ErrorCode::ParticipantExists,
            Self::TopUpNotFound(_) => ErrorCode::TopUpNotFound,
            Self::TopUpNotPending(_) => ErrorCode::TopUpNotPending,
            Self::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
        }
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        self.code().as_str()
    }

    /// Whether the caller may retry the identical operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Convert to the error body of a `SUBMIT_RESULT`.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.to_string())
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        LedgerError::StoreUnavailable(err.to_string())
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::from(DbError::from(err))
    }
}

// ============================================================================
// Room Errors (actor operations)
// ============================================================================

/// Room actor errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// The actor is shutting down; the registry should retry with a fresh one.
    #[error("room is draining")]
    Tombstone,

    #[error("room actor is gone")]
    Closed,
}
