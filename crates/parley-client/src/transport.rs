//! WebSocket transport.
//!
//! Provides [`WebSocketConnector`], which opens a WebSocket to the broker and
//! bridges it to a [`Channel`]. This is a thin layer that only moves text
//! messages; STOMP handling stays in the [`crate::Messenger`].

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};

use crate::{
    connector::{Channel, ConnectRequest, Connector},
    error::TransportError,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket channels to a broker endpoint such as
/// `ws://localhost:8080/ws-chat`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Connector for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<Channel, TransportError> {
        let mut upgrade =
            self.url.as_str().into_client_request().map_err(|e| TransportError::Connect(e.to_string()))?;
        if let Some(token) = &request.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::Connect(format!("invalid token: {e}")))?;
            upgrade.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, _) = tokio_tungstenite::connect_async(upgrade)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(url = %self.url, "websocket open");

        let (to_broker_tx, to_broker_rx) = mpsc::channel(request.outbound_capacity);
        let (from_broker_tx, from_broker_rx) = mpsc::channel(request.outbound_capacity);
        tokio::spawn(run_socket(socket, to_broker_rx, from_broker_tx));

        Ok(Channel::new(to_broker_tx, from_broker_rx))
    }
}

/// Bridge between the channel halves and the socket until either side ends.
async fn run_socket(socket: Socket, mut to_broker: mpsc::Receiver<String>, from_broker: mpsc::Sender<String>) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            outgoing = to_broker.recv() => match outgoing {
                Some(text) => {
                    if let Err(error) = write.send(Message::Text(text.into())).await {
                        tracing::warn!(%error, "websocket write failed");
                        break;
                    }
                },
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                },
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if from_broker.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                },
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if from_broker.send(text).await.is_err() {
                            break;
                        }
                    },
                    Err(error) => tracing::warn!(%error, "discarding non-UTF-8 binary message"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {},
                Some(Err(error)) => {
                    tracing::warn!(%error, "websocket read failed");
                    break;
                },
            },
        }
    }

    tracing::debug!("websocket closed");
}
