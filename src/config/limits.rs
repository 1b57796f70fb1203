//! Connection limits, heartbeat and outbox tuning.

use super::defaults::*;
use serde::Deserialize;
use std::time::Duration;

/// Per-connection limits.
///
/// The outbound queue bounds how far a slow client may fall behind a room
/// before it is disconnected.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Outbound frames buffered per connection (default: 256).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Sustained inbound frames per second (default: 20).
    #[serde(default = "default_message_rate")]
    pub message_rate_per_second: u32,
    /// Inbound burst allowance (default: 40).
    #[serde(default = "default_message_burst")]
    pub message_burst: u32,
    /// Transactions included in a snapshot (default: 50).
    #[serde(default = "default_snapshot_transactions")]
    pub snapshot_transactions: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            message_rate_per_second: default_message_rate(),
            message_burst: default_message_burst(),
            snapshot_transactions: default_snapshot_transactions(),
        }
    }
}

/// Heartbeat timing.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Seconds of silence before a connection is reaped (default: 60).
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_secs: u64,
    /// Seconds between reaper sweeps (default: 15).
    #[serde(default = "default_heartbeat_check_interval")]
    pub check_interval_secs: u64,
}

impl HeartbeatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_heartbeat_timeout(),
            check_interval_secs: default_heartbeat_check_interval(),
        }
    }
}

/// Notification outbox worker tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    /// Milliseconds between polls for due entries (default: 1000).
    #[serde(default = "default_outbox_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Entries claimed per poll (default: 32).
    #[serde(default = "default_outbox_batch_size")]
    pub batch_size: u32,
    /// Delivery attempts before an entry is marked failed (default: 5).
    #[serde(default = "default_outbox_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt (default: 2).
    #[serde(default = "default_outbox_base_backoff_secs")]
    pub base_backoff_secs: u64,
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_outbox_poll_interval_ms(),
            batch_size: default_outbox_batch_size(),
            max_attempts: default_outbox_max_attempts(),
            base_backoff_secs: default_outbox_base_backoff_secs(),
        }
    }
}
