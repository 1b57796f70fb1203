//! Realtime state: connections, rooms and the dispatcher that feeds them.

pub mod actor;
mod conn_id;
mod dispatch;
mod hub;
pub mod managers;

pub use conn_id::{ConnId, ConnIdGenerator};
pub use dispatch::Dispatcher;
pub use hub::{Connected, Hub, Joined};
pub use managers::{CloseSignal, ConnectionManager, Outbound, RoomRegistry};
