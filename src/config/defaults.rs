//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "pitboss".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}

pub fn default_database_path() -> String {
    "pitboss.db".to_string()
}

// =============================================================================
// Heartbeat Defaults
// =============================================================================

pub fn default_heartbeat_timeout() -> u64 {
    60
}

pub fn default_heartbeat_check_interval() -> u64 {
    15
}

// =============================================================================
// Connection Limit Defaults
// =============================================================================

pub fn default_outbound_queue() -> usize {
    256
}

pub fn default_message_rate() -> u32 {
    20
}

pub fn default_message_burst() -> u32 {
    40
}

pub fn default_snapshot_transactions() -> u32 {
    50
}

// =============================================================================
// Outbox Defaults
// =============================================================================

pub fn default_outbox_poll_interval_ms() -> u64 {
    1000
}

pub fn default_outbox_batch_size() -> u32 {
    32
}

pub fn default_outbox_max_attempts() -> u32 {
    5
}

pub fn default_outbox_base_backoff_secs() -> u64 {
    2
}
