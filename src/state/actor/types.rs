use crate::error::RoomError;
use crate::state::{ConnId, Outbound};
use tokio::sync::{mpsc, oneshot};

/// Events that can be sent to a Room Actor.
#[derive(Debug)]
pub enum RoomEvent {
    /// Add a member. Replies with the member count.
    Join {
        conn: ConnId,
        sender: mpsc::Sender<Outbound>,
        reply_tx: oneshot::Sender<Result<usize, RoomError>>,
    },
    /// Remove a member. Replies with the remaining member count.
    Leave {
        conn: ConnId,
        reply_tx: Option<oneshot::Sender<usize>>,
    },
    /// Deliver frames to every member, in order.
    Broadcast { messages: Vec<Outbound> },
    /// List current members.
    Members {
        reply_tx: oneshot::Sender<Vec<ConnId>>,
    },
}
