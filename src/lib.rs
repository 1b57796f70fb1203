//! pitboss - real-time session ledger daemon.
//!
//! Operators run sessions; participants contribute, withdraw and get
//! settled. Every ledger change is committed to SQLite and then broadcast
//! to the session's WebSocket room in commit order.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod ledger;
pub mod metrics;
pub mod network;
pub mod reconcile;
pub mod security;
pub mod services;
pub mod state;
