//! WebSocket upgrade policy.
//!
//! Browser clients connect cross-origin, so the upgrade request is checked
//! against an origin allow-list before the connection is accepted, and the
//! `pitboss.v1` subprotocol is echoed back when the client offers it.

use std::fmt;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};

/// Subprotocol name advertised by the server.
pub const SUBPROTOCOL: &str = "pitboss.v1";

/// Origin and subprotocol policy for incoming upgrades.
#[derive(Debug, Clone)]
pub struct UpgradePolicy {
    /// Allowed `Origin` values; empty allows any.
    pub allowed_origins: Vec<String>,
    /// Reject upgrades without an `Origin` header.
    pub require_origin: bool,
    /// Subprotocol to select when offered.
    pub subprotocol: Option<String>,
    /// Emit CORS headers on accepted upgrades.
    pub enable_cors: bool,
}

impl Default for UpgradePolicy {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            require_origin: false,
            subprotocol: Some(SUBPROTOCOL.to_string()),
            enable_cors: true,
        }
    }
}

impl UpgradePolicy {
    /// Policy restricted to the given origins.
    pub fn with_origins(origins: Vec<String>) -> Self {
        Self {
            require_origin: !origins.is_empty(),
            allowed_origins: origins,
            ..Self::default()
        }
    }
}

/// Outcome of checking an upgrade request.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum UpgradeDecision {
    /// Accept the upgrade.
    Accept {
        /// Selected subprotocol.
        subprotocol: Option<String>,
        /// Client origin, if sent.
        origin: Option<String>,
    },
    /// Refuse the upgrade.
    Reject {
        /// HTTP status.
        status: StatusCode,
        /// Explanation.
        reason: String,
    },
}

impl fmt::Display for UpgradeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeDecision::Accept { origin, .. } => match origin {
                Some(o) => write!(f, "accept (origin: {o})"),
                None => write!(f, "accept"),
            },
            UpgradeDecision::Reject { status, reason } => {
                write!(f, "reject {} - {}", status.as_u16(), reason)
            }
        }
    }
}

fn select_subprotocol(req: &Request, wanted: &str) -> Option<String> {
    req.headers()
        .get_all("Sec-WebSocket-Protocol")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .find(|p| *p == wanted)
        .map(str::to_string)
}

/// Check an upgrade request against the policy.
pub fn check_upgrade(req: &Request, policy: &UpgradePolicy) -> UpgradeDecision {
    let origin = req
        .headers()
        .get("Origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match &origin {
        None if policy.require_origin => {
            return UpgradeDecision::Reject {
                status: StatusCode::FORBIDDEN,
                reason: "Origin header required".to_string(),
            };
        }
        Some(o)
            if !policy.allowed_origins.is_empty()
                && !policy.allowed_origins.iter().any(|a| a == o) =>
        {
            return UpgradeDecision::Reject {
                status: StatusCode::FORBIDDEN,
                reason: format!("origin '{o}' not allowed"),
            };
        }
        _ => {}
    }

    let subprotocol = policy
        .subprotocol
        .as_deref()
        .and_then(|wanted| select_subprotocol(req, wanted));

    UpgradeDecision::Accept {
        subprotocol,
        origin,
    }
}

/// Apply a decision to the handshake response produced by tungstenite.
#[allow(clippy::result_large_err)]
pub fn apply_decision(
    decision: &UpgradeDecision,
    policy: &UpgradePolicy,
    mut response: Response,
) -> Result<Response, ErrorResponse> {
    match decision {
        UpgradeDecision::Accept {
            subprotocol,
            origin,
        } => {
            let headers = response.headers_mut();
            if policy.enable_cors
                && let Some(value) = origin.as_deref().and_then(|o| HeaderValue::from_str(o).ok())
            {
                headers.insert("Access-Control-Allow-Origin", value);
                headers.insert(
                    "Access-Control-Allow-Credentials",
                    HeaderValue::from_static("true"),
                );
            }
            if let Some(value) = subprotocol
                .as_deref()
                .and_then(|p| HeaderValue::from_str(p).ok())
            {
                headers.insert("Sec-WebSocket-Protocol", value);
            }
            Ok(response)
        }
        UpgradeDecision::Reject { status, reason } => {
            let mut err = ErrorResponse::new(Some(reason.clone()));
            *err.status_mut() = *status;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::http::Request as HttpRequest;

    fn upgrade_request(origin: Option<&str>, protocols: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder()
            .uri("/ws")
            .method("GET")
            .header("Host", "localhost:8080")
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .header("Sec-WebSocket-Version", "13");
        if let Some(o) = origin {
            builder = builder.header("Origin", o);
        }
        if let Some(p) = protocols {
            builder = builder.header("Sec-WebSocket-Protocol", p);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn open_policy_accepts_any_origin() {
        let req = upgrade_request(Some("https://table.example"), Some(SUBPROTOCOL));
        let decision = check_upgrade(&req, &UpgradePolicy::default());
        assert_eq!(
            decision,
            UpgradeDecision::Accept {
                subprotocol: Some(SUBPROTOCOL.to_string()),
                origin: Some("https://table.example".to_string()),
            }
        );
    }

    #[test]
    fn allow_list_rejects_foreign_origin() {
        let policy = UpgradePolicy::with_origins(vec!["https://host.example".into()]);
        let req = upgrade_request(Some("https://evil.example"), None);
        match check_upgrade(&req, &policy) {
            UpgradeDecision::Reject { status, reason } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert!(reason.contains("not allowed"));
            }
            other => panic!("expected reject, got {other}"),
        }
    }

    #[test]
    fn allow_list_requires_origin() {
        let policy = UpgradePolicy::with_origins(vec!["https://host.example".into()]);
        let req = upgrade_request(None, None);
        assert!(matches!(
            check_upgrade(&req, &policy),
            UpgradeDecision::Reject { .. }
        ));
    }

    #[test]
    fn subprotocol_picked_from_list() {
        let req = upgrade_request(None, Some("chat, pitboss.v1"));
        match check_upgrade(&req, &UpgradePolicy::default()) {
            UpgradeDecision::Accept { subprotocol, .. } => {
                assert_eq!(subprotocol.as_deref(), Some(SUBPROTOCOL));
            }
            other => panic!("expected accept, got {other}"),
        }
    }

    #[test]
    fn rejected_decision_becomes_error_response() {
        let decision = UpgradeDecision::Reject {
            status: StatusCode::FORBIDDEN,
            reason: "nope".into(),
        };
        let err = apply_decision(&decision, &UpgradePolicy::default(), Response::new(()))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
