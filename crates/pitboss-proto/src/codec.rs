//! JSON frame encoding and decoding.
//!
//! Frames are checked against [`MAX_FRAME_LEN`] before parsing so an
//! oversized payload is rejected without being buffered into a value tree.

use crate::error::ProtoError;
use crate::message::{ClientMessage, ServerMessage};
use serde::Serialize;

/// Maximum accepted frame length in bytes.
pub const MAX_FRAME_LEN: usize = 16 * 1024;

fn check_len(frame: &str) -> Result<(), ProtoError> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLong {
            actual: frame.len(),
            limit: MAX_FRAME_LEN,
        });
    }
    Ok(())
}

/// Decode a client frame.
pub fn decode_client(frame: &str) -> Result<ClientMessage, ProtoError> {
    check_len(frame)?;
    Ok(serde_json::from_str(frame)?)
}

/// Decode a server frame. Used by clients and tests.
pub fn decode_server(frame: &str) -> Result<ServerMessage, ProtoError> {
    Ok(serde_json::from_str(frame)?)
}

/// Encode any frame as a JSON string.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtoError> {
    Ok(serde_json::to_string(msg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ErrorCode;

    #[test]
    fn decodes_join_room() {
        let msg = decode_client(
            r#"{"type":"JOIN_ROOM","session_id":"00000000-0000-0000-0000-000000000000"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                session_id: uuid::Uuid::nil()
            }
        );
    }

    #[test]
    fn rejects_oversized_frame() {
        let frame = format!(
            r#"{{"type":"AUTHENTICATE","credential":"{}"}}"#,
            "x".repeat(MAX_FRAME_LEN)
        );
        match decode_client(&frame) {
            Err(ProtoError::FrameTooLong { limit, .. }) => assert_eq!(limit, MAX_FRAME_LEN),
            other => panic!("expected FrameTooLong, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            decode_client(r#"{"type":"SHOUT"}"#),
            Err(ProtoError::InvalidFrame(_))
        ));
    }

    #[test]
    fn rejects_non_json() {
        assert!(decode_client("PING :hello").is_err());
    }

    #[test]
    fn server_frames_survive_encoding() {
        let msg = ServerMessage::error(ErrorCode::Malformed, "bad frame");
        let text = encode(&msg).unwrap();
        assert_eq!(decode_server(&text).unwrap(), msg);
    }
}
