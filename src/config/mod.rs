//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, DatabaseConfig, AuthConfig)
//! - [`listen`]: WebSocket listener configuration (ListenConfig)
//! - [`limits`]: Per-connection limits, heartbeat and outbox tuning
//! - [`validation`]: Startup checks that collect every problem at once

mod defaults;
mod limits;
mod listen;
mod types;
mod validation;

pub use limits::{HeartbeatConfig, LimitsConfig, OutboxConfig};
pub use listen::ListenConfig;
pub use types::{AuthConfig, Config, ConfigError, DatabaseConfig, LogFormat, ServerConfig};
pub use validation::{ValidationError, validate};
