//! Error types for the pitboss wire protocol.

use thiserror::Error;

/// Errors raised while decoding or encoding protocol frames.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtoError {
    /// Frame exceeded the maximum accepted size.
    #[error("frame too long: {actual} bytes (limit: {limit})")]
    FrameTooLong {
        /// Actual frame length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// Frame was not valid JSON or did not match any known message.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),

    /// Binary frames are not part of the protocol.
    #[error("binary frames are not supported")]
    BinaryFrame,
}

/// Failure to parse one of the protocol's string-encoded enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
