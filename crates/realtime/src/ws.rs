//! WebSocket implementation of [`ProgressTransport`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::TransportError;
use crate::protocol::ClientCommand;
use crate::transport::{ProgressTransport, TransportLink};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the progress endpoint with `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ProgressTransport for WsTransport {
    async fn open(&self, token: &str) -> Result<TransportLink, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Network(format!("invalid websocket request: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TransportError::Unauthorized("token is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        tracing::debug!(url = %self.url, "opening progress socket");
        let socket = match connect_async(request).await {
            Ok((socket, _response)) => socket,
            Err(WsError::Http(response))
                if matches!(
                    response.status(),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                ) =>
            {
                return Err(TransportError::Unauthorized(format!(
                    "upgrade refused with {}",
                    response.status()
                )));
            }
            Err(e) => return Err(TransportError::Network(e.to_string())),
        };

        let (outbound, commands) = mpsc::unbounded_channel();
        let (frames, inbound) = mpsc::unbounded_channel();
        tokio::spawn(pump(socket, commands, frames));
        Ok(TransportLink { outbound, inbound })
    }
}

/// Shuttles commands out and text frames in until either side goes away.
async fn pump(
    socket: Socket,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    frames: mpsc::UnboundedSender<String>,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(&command) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(%err, "failed to encode command");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(text.into())).await {
                    tracing::warn!(%err, "progress socket write failed");
                    break;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if frames.send(text.as_str().to_owned()).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::warn!(%err, "progress socket read failed");
                    break;
                }
            },
        }
    }
    tracing::debug!("progress socket closed");
}
