//! Test WebSocket client.
//!
//! Sends protocol frames and asserts on the frames the server pushes back.

use futures_util::{SinkExt, StreamExt};
use pitboss_proto::{
    ClientMessage, Operation, ParticipantId, Receipt, ServerMessage, SessionId, codec,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

static REQUEST_IDS: AtomicU64 = AtomicU64::new(1);

/// A test client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub connection_id: String,
}

impl TestClient {
    /// Connect and read the `CONNECTED` greeting.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(url).await?;
        let mut client = Self {
            ws,
            connection_id: String::new(),
        };
        match client.recv().await? {
            ServerMessage::Connected { connection_id } => client.connection_id = connection_id,
            other => anyhow::bail!("expected CONNECTED, got {}", other.kind()),
        }
        Ok(client)
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a protocol frame.
    pub async fn send(&mut self, msg: ClientMessage) -> anyhow::Result<()> {
        self.send_raw(&codec::encode(&msg)?).await
    }

    /// Receive a single frame from the server.
    pub async fn recv(&mut self) -> anyhow::Result<ServerMessage> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a frame with a timeout, skipping transport control frames.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ServerMessage> {
        loop {
            let frame = timeout(dur, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            match frame {
                Message::Text(text) => return Ok(codec::decode_server(&text)?),
                Message::Close(frame) => {
                    anyhow::bail!("closed: {:?}", frame.map(|f| f.reason.into_owned()))
                }
                _ => continue,
            }
        }
    }

    /// Receive frames until the predicate returns true.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<ServerMessage>>
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        let mut messages = Vec::new();
        loop {
            let msg = self.recv().await?;
            let done = predicate(&msg);
            messages.push(msg);
            if done {
                return Ok(messages);
            }
        }
    }

    /// Assert that nothing arrives within `dur`.
    #[allow(dead_code)]
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match self.recv_timeout(dur).await {
            Ok(msg) => anyhow::bail!("unexpected {} frame", msg.kind()),
            Err(_) => Ok(()),
        }
    }

    /// Wait for the server to close the socket and return the close reason.
    #[allow(dead_code)]
    pub async fn closed(&mut self) -> anyhow::Result<String> {
        loop {
            match timeout(Duration::from_secs(5), self.ws.next()).await? {
                Some(Ok(Message::Close(frame))) => {
                    return Ok(frame.map(|f| f.reason.into_owned()).unwrap_or_default());
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return Ok(String::new()),
            }
        }
    }

    /// Authenticate and wait for a successful `AUTH_RESULT`.
    pub async fn authenticate(&mut self, token: &str) -> anyhow::Result<ParticipantId> {
        self.send(ClientMessage::Authenticate {
            credential: token.to_string(),
            resume_session: None,
        })
        .await?;
        match self.recv().await? {
            ServerMessage::AuthResult {
                success: true,
                participant_id: Some(id),
                ..
            } => Ok(id),
            other => anyhow::bail!("authentication failed: {other:?}"),
        }
    }

    /// Join a room and wait for `ROOM_JOINED`.
    pub async fn join(&mut self, session_id: SessionId) -> anyhow::Result<()> {
        self.send(ClientMessage::JoinRoom { session_id }).await?;
        self.recv_until(|m| matches!(m, ServerMessage::RoomJoined { .. }))
            .await?;
        Ok(())
    }

    /// Submit an operation and wait for its `SUBMIT_RESULT`, returning
    /// every frame seen on the way.
    pub async fn submit(
        &mut self,
        operation: Operation,
    ) -> anyhow::Result<(Result<Receipt, pitboss_proto::ErrorBody>, Vec<ServerMessage>)> {
        let request_id = format!("r{}", REQUEST_IDS.fetch_add(1, Ordering::Relaxed));
        self.send(ClientMessage::Submit {
            request_id: request_id.clone(),
            operation,
        })
        .await?;
        let mut seen = self
            .recv_until(|m| matches!(m, ServerMessage::SubmitResult { request_id: id, .. } if *id == request_id))
            .await?;
        match seen.pop() {
            Some(ServerMessage::SubmitResult {
                receipt: Some(receipt),
                ..
            }) => Ok((Ok(receipt), seen)),
            Some(ServerMessage::SubmitResult {
                error: Some(error), ..
            }) => Ok((Err(error), seen)),
            other => anyhow::bail!("malformed SUBMIT_RESULT: {other:?}"),
        }
    }

    /// Submit and require success.
    pub async fn submit_ok(&mut self, operation: Operation) -> anyhow::Result<Receipt> {
        match self.submit(operation).await?.0 {
            Ok(receipt) => Ok(receipt),
            Err(e) => anyhow::bail!("{}: {}", e.code, e.message),
        }
    }

    /// Close the socket.
    #[allow(dead_code)]
    pub async fn quit(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
