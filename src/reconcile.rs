//! Reconnect reconciliation.
//!
//! A client that reconnects and authenticates with the session it was
//! watching is put back into that room and told to refresh. Events
//! broadcast while it was away are not replayed; the client re-fetches a
//! snapshot instead.

use crate::error::ConnectionError;
use crate::state::{ConnId, Hub};
use pitboss_proto::{ServerMessage, SessionId};
use tracing::info;

/// Rejoin `session_id` and return the frames to send, in order.
pub async fn resume(
    hub: &Hub,
    conn: &ConnId,
    session_id: SessionId,
) -> Result<Vec<ServerMessage>, ConnectionError> {
    let joined = hub.join_room(conn, session_id).await?;
    info!(conn = %conn, session = %session_id, "resumed session after reconnect");

    let mut frames = Vec::with_capacity(3);
    if let Some(left) = joined.left {
        frames.push(ServerMessage::RoomLeft { session_id: left });
    }
    frames.push(ServerMessage::RoomJoined { session_id });
    frames.push(ServerMessage::RefreshRequired { session_id });
    Ok(frames)
}
