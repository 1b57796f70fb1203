//! Gateway - accepts WebSocket clients.
//!
//! Binds the listen address, runs the upgrade handshake with the origin and
//! subprotocol policy, and spawns a [`Connection`] task per client.

use crate::config::ListenConfig;
use crate::network::Connection;
use crate::state::Hub;
use pitboss_proto::websocket::{UpgradeDecision, UpgradePolicy, apply_decision, check_upgrade};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{error, info, instrument, warn};

/// The Gateway accepts incoming connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    policy: Arc<UpgradePolicy>,
    hub: Arc<Hub>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(config: &ListenConfig, hub: Arc<Hub>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.address).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");
        Ok(Self {
            listener,
            policy: Arc::new(UpgradePolicy::with_origins(config.allowed_origins.clone())),
            hub,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the hub shuts down.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        let shutdown = self.hub.shutdown_token();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("gateway stopped accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let hub = Arc::clone(&self.hub);
                        let policy = Arc::clone(&self.policy);
                        tokio::spawn(async move {
                            handle_client(hub, policy, stream, addr).await;
                        });
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
            }
        }
    }
}

async fn handle_client(
    hub: Arc<Hub>,
    policy: Arc<UpgradePolicy>,
    stream: TcpStream,
    addr: SocketAddr,
) {
    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let decision = check_upgrade(req, &policy);
        if let UpgradeDecision::Reject { reason, .. } = &decision {
            warn!(%addr, %reason, "WebSocket upgrade rejected");
        }
        apply_decision(&decision, &policy, response)
    };

    match accept_hdr_async(stream, callback).await {
        Ok(ws_stream) => {
            if let Err(e) = Connection::new(hub, ws_stream, addr).run().await {
                warn!(%addr, error = %e, "connection error");
            }
        }
        Err(e) => warn!(%addr, error = %e, "WebSocket handshake failed"),
    }
}
