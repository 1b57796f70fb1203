//! # pitboss-proto
//!
//! Wire protocol for the pitboss live session ledger.
//!
//! Every frame exchanged over the WebSocket transport is a single JSON object
//! tagged by a `"type"` field. Client frames decode into [`ClientMessage`],
//! server frames into [`ServerMessage`]. Monetary amounts are fixed-point
//! [`Decimal`] values serialized as strings so no precision is lost in
//! transit.
//!
//! ## Quick Start
//!
//! ```rust
//! use pitboss_proto::{ClientMessage, codec};
//!
//! let frame = r#"{"type":"HEARTBEAT"}"#;
//! let msg = codec::decode_client(frame).expect("valid frame");
//! assert_eq!(msg, ClientMessage::Heartbeat);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod codec;
pub mod error;
pub mod message;
pub mod model;
pub mod operation;
#[cfg(feature = "tokio")]
pub mod websocket;

pub use error::{ParseEnumError, ProtoError};
pub use message::{
    AlertKind, AuthFailureReason, ClientMessage, ErrorBody, ErrorCode, ServerMessage,
};
pub use model::{
    ParticipantId, ParticipantRecord, ParticipantStatus, SessionId, SessionRecord,
    SessionSnapshot, SessionStats, SessionStatus, SettlementLine, TopUpRequest, TopUpStatus,
    Transaction, TransactionKind,
};
pub use operation::{Operation, Receipt, SessionAction};

pub use rust_decimal::Decimal;
