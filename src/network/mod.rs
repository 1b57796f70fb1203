//! Network module.
//!
//! Contains the Gateway (WebSocket listener), the per-connection task and
//! inbound flood protection.

mod connection;
mod gateway;
pub mod limit;

pub use connection::{Connection, ConnectionHandler, Flow};
pub use gateway::Gateway;
