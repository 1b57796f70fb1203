//! Test server management.
//!
//! Runs a full gateway and hub in the test's own runtime, backed by a
//! private in-memory database.

use chrono::{Duration, Utc};
use pitboss::config::{LimitsConfig, ListenConfig};
use pitboss::db::Database;
use pitboss::network::Gateway;
use pitboss::security::HmacTokenVerifier;
use pitboss::state::Hub;
use pitboss_proto::ParticipantId;
use std::net::SocketAddr;
use std::sync::Arc;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";

/// A test server instance. Dropping it shuts the hub down.
pub struct TestServer {
    pub hub: Arc<Hub>,
    addr: SocketAddr,
    tokens: HmacTokenVerifier,
}

impl TestServer {
    /// Spawn a server with default limits.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(LimitsConfig::default()).await
    }

    /// Spawn a server with custom limits.
    pub async fn spawn_with(limits: LimitsConfig) -> anyhow::Result<Self> {
        let db = Database::new(":memory:").await?;
        let hub = Hub::new(db, Arc::new(HmacTokenVerifier::new(SECRET)), limits);

        let listen = ListenConfig {
            address: "127.0.0.1:0".parse()?,
            allowed_origins: Vec::new(),
        };
        let gateway = Gateway::bind(&listen, Arc::clone(&hub)).await?;
        let addr = gateway.local_addr()?;
        tokio::spawn(async move {
            let _ = gateway.run().await;
        });

        Ok(Self {
            hub,
            addr,
            tokens: HmacTokenVerifier::new(SECRET),
        })
    }

    /// WebSocket URL of the listener.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// A token for `participant` valid for an hour.
    pub fn token(&self, participant: ParticipantId) -> String {
        self.tokens
            .issue(participant, Utc::now() + Duration::hours(1))
    }

    /// A token that has already expired.
    #[allow(dead_code)]
    pub fn expired_token(&self, participant: ParticipantId) -> String {
        self.tokens
            .issue(participant, Utc::now() - Duration::seconds(1))
    }

    /// Connect a client and consume the `CONNECTED` greeting.
    pub async fn connect(&self) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.url()).await
    }

    /// Connect and authenticate as `participant`.
    pub async fn login(
        &self,
        participant: ParticipantId,
    ) -> anyhow::Result<super::client::TestClient> {
        let mut client = self.connect().await?;
        client.authenticate(&self.token(participant)).await?;
        Ok(client)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.hub.shutdown_token().cancel();
    }
}
