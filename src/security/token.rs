//! HMAC-SHA256 signed bearer tokens.
//!
//! Format: `<participant-uuid>.<expiry-unix-secs>.<signature>` where the
//! signature is the unpadded base64url HMAC of `<participant-uuid>.<expiry>`
//! under the server secret.

use super::{AuthFailure, IdentityVerifier};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use pitboss_proto::ParticipantId;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Verifies and mints signed participant tokens.
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
}

impl HmacTokenVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn sign(&self, payload: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Mint a token for `participant` valid until `expires_at`.
    pub fn issue(&self, participant: ParticipantId, expires_at: DateTime<Utc>) -> String {
        let payload = format!("{participant}.{}", expires_at.timestamp());
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&payload));
        format!("{payload}.{signature}")
    }

    /// Check a token against the clock `now`.
    ///
    /// The signature is checked before the expiry, so a forged token with a
    /// past expiry is reported as invalid rather than expired.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<ParticipantId, AuthFailure> {
        let (payload, signature) = token.trim().rsplit_once('.').ok_or(AuthFailure::Invalid)?;
        let (participant, expiry) = payload.split_once('.').ok_or(AuthFailure::Invalid)?;

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthFailure::Invalid)?;
        let expected = self.sign(payload);
        if !bool::from(expected.as_slice().ct_eq(&provided)) {
            return Err(AuthFailure::Invalid);
        }

        let participant = Uuid::parse_str(participant).map_err(|_| AuthFailure::Invalid)?;
        let expiry: i64 = expiry.parse().map_err(|_| AuthFailure::Invalid)?;
        if expiry <= now.timestamp() {
            return Err(AuthFailure::Expired);
        }
        Ok(participant)
    }
}

#[async_trait]
impl IdentityVerifier for HmacTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<ParticipantId, AuthFailure> {
        self.verify_at(credential, Utc::now())
    }
}
