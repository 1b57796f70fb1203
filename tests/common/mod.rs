//! Integration test common infrastructure.
//!
//! Provides an in-process server on an ephemeral port, WebSocket test
//! clients, and helpers for asserting on frame flows.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
