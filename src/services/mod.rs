//! Background services.
//!
//! - [`outbox`]: delivers queued notification intents with retry.
//! - [`heartbeat`]: closes connections that stopped talking.

pub mod heartbeat;
pub mod outbox;

pub use heartbeat::spawn_heartbeat_reaper;
pub use outbox::{DeliveryError, LogSink, NotificationSink, OutboxWorker};
