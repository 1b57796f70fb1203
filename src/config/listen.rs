//! WebSocket listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind the WebSocket listener on.
    pub address: SocketAddr,
    /// Allowed `Origin` header values; empty accepts any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}
