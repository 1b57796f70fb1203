//! Connection - handles one WebSocket client.
//!
//! Each connection runs in its own tokio task:
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!  frames ──▶│ tokio::select!                           │
//!            │   inbound frame  ─▶ ConnectionHandler ─┐ │
//!            │   outbound queue ◀─────────────────────┘ │──▶ socket
//!            │   close signal   ─▶ break                │
//!            └──────────────────────────────────────────┘
//! ```
//!
//! Room actors and the dispatcher push into the same bounded outbound
//! queue the handler uses, so the socket has a single writer.

mod handler;

pub use handler::{ConnectionHandler, Flow};

use crate::state::Hub;
use futures_util::{SinkExt, StreamExt};
use pitboss_proto::codec;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, instrument, warn};

/// A client connection.
pub struct Connection<S = TcpStream> {
    hub: Arc<Hub>,
    addr: SocketAddr,
    stream: WebSocketStream<S>,
}

impl<S> Connection<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub fn new(hub: Arc<Hub>, stream: WebSocketStream<S>, addr: SocketAddr) -> Self {
        Self { hub, addr, stream }
    }

    /// Drive the connection until either side closes it.
    #[instrument(skip(self), fields(addr = %self.addr), name = "connection")]
    pub async fn run(self) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let Self { hub, stream, .. } = self;
        let connected = hub.on_connect();
        let id = connected.id.clone();
        let close = connected.close;
        let mut outbound = connected.outbound;
        let mut handler = ConnectionHandler::new(Arc::clone(&hub), id.clone(), connected.sender);
        let (mut sink, mut source) = stream.split();

        info!(conn = %id, "client connected");
        let mut flow = handler.greet();
        let mut result = Ok(());

        let reason = loop {
            if let Flow::Close(reason) = flow {
                break reason;
            }
            flow = Flow::Continue;

            tokio::select! {
                _ = close.closed() => {
                    break close.reason().unwrap_or_else(|| "closed by server".to_string());
                }
                Some(msg) = outbound.recv() => {
                    let text = match codec::encode(&*msg) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(conn = %id, error = %e, "failed to encode frame");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        result = Err(e);
                        break "write failed".to_string();
                    }
                }
                frame = source.next() => match frame {
                    None => break "client went away".to_string(),
                    Some(Err(e)) => {
                        result = Err(e);
                        break "read failed".to_string();
                    }
                    Some(Ok(Message::Text(text))) => flow = handler.handle_text(&text).await,
                    Some(Ok(Message::Binary(_))) => flow = handler.reject_binary(),
                    Some(Ok(Message::Ping(payload))) => {
                        handler.note_activity();
                        if let Err(e) = sink.send(Message::Pong(payload)).await {
                            result = Err(e);
                            break "write failed".to_string();
                        }
                    }
                    Some(Ok(Message::Close(_))) => break "client closed".to_string(),
                    Some(Ok(_)) => handler.note_activity(),
                },
            }
        };

        // Flush what is already queued (typically a final error frame).
        if result.is_ok() {
            while let Ok(msg) = outbound.try_recv() {
                let Ok(text) = codec::encode(&*msg) else { continue };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let frame = CloseFrame {
                code: close_code(&reason),
                reason: Cow::Owned(reason.clone()),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
        }

        handler.on_disconnect().await;
        info!(conn = %id, participant = ?handler.participant(), reason = %reason, "client disconnected");
        debug!(conn = %id, "connection task finished");
        result
    }
}

fn close_code(reason: &str) -> CloseCode {
    match reason {
        "server shutting down" => CloseCode::Away,
        "excess flood" | "send queue exceeded" => CloseCode::Policy,
        _ => CloseCode::Normal,
    }
}
