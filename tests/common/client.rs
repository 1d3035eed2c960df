//! Test WebSocket client: connects with a bearer token and exchanges
//! `pulsehub_wire::Envelope` frames, mirroring the teacher's `TestClient`
//! but over WebSocket/MessagePack instead of raw IRC lines.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use pulsehub_wire::{decode, encode, Envelope, EnvelopePayload};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect and complete the WebSocket handshake with `token` as a
    /// bearer token.
    pub async fn connect(ws_url: &str, token: &str) -> anyhow::Result<Self> {
        let mut request = ws_url.into_client_request()?;
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            format!("Bearer {token}").parse()?,
        );

        let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, payload: EnvelopePayload) -> anyhow::Result<()> {
        let bytes = encode(&Envelope::new(payload))?;
        self.stream.send(Message::Binary(bytes)).await?;
        Ok(())
    }

    /// Receive the next binary frame, decoded as an `Envelope`, with a
    /// 2-second timeout.
    pub async fn recv(&mut self) -> anyhow::Result<Envelope> {
        loop {
            let msg = timeout(Duration::from_secs(2), self.stream.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            match msg {
                Message::Binary(bytes) => return Ok(decode(&bytes)?),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => anyhow::bail!("unexpected frame: {other:?}"),
            }
        }
    }

    /// Receive the next frame whose payload matches `pred`, ignoring any
    /// that don't (useful when a publish triggers more than one outbound
    /// frame, e.g. an Ack followed by a PUBLISH echo).
    pub async fn recv_matching(
        &mut self,
        mut pred: impl FnMut(&EnvelopePayload) -> bool,
    ) -> anyhow::Result<Envelope> {
        for _ in 0..10 {
            let envelope = self.recv().await?;
            if pred(&envelope.payload) {
                return Ok(envelope);
            }
        }
        anyhow::bail!("no matching frame received within 10 attempts")
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
