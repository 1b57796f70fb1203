//! Identity verification for connecting clients.
//!
//! The connection layer only sees the [`IdentityVerifier`] trait; the bundled
//! [`HmacTokenVerifier`] checks HMAC-SHA256 signed bearer tokens minted by
//! `pitboss-token`.

pub mod token;

pub use token::HmacTokenVerifier;

use async_trait::async_trait;
use pitboss_proto::{AuthFailureReason, ParticipantId};
use thiserror::Error;

/// Why a credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("credential expired")]
    Expired,
    #[error("credential invalid")]
    Invalid,
}

impl AuthFailure {
    /// Wire reason for an `AUTH_RESULT` frame.
    pub fn reason(self) -> AuthFailureReason {
        match self {
            Self::Expired => AuthFailureReason::Expired,
            Self::Invalid => AuthFailureReason::Invalid,
        }
    }
}

/// Resolves a bearer credential to a participant.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<ParticipantId, AuthFailure>;
}
