//! Managers for the realtime state held by the [`Hub`](crate::state::Hub).

mod connection;
mod room;

pub use connection::{CloseSignal, ConnectionManager, Outbound};
pub use room::RoomRegistry;
