// WebSocket session to one controller

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace};

use crate::core::error::ConnectionError;
use crate::models::frame::{Command, Inbound};

/// A bidirectional frame channel to a single controller.
///
/// Exactly one phase reads from the transport at a time; each phase pulls
/// frames with [`Transport::recv`] and applies its own matching rule, so a
/// frame is never delivered to a handler left over from an earlier phase.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send one command frame
    async fn send(&mut self, command: &Command) -> Result<(), ConnectionError>;

    /// Wait for the next inbound frame
    async fn recv(&mut self) -> Result<Inbound, ConnectionError>;
}

/// WebSocket session to a controller
pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
}

impl WsSession {
    /// Open the socket, presenting `auth` as the `Authorization` header.
    ///
    /// Fails on network failure, on a refused upgrade, or if the handshake
    /// does not finish within `timeout`.
    pub async fn connect(auth: &str, url: &str, timeout: Duration) -> Result<Self, ConnectionError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ConnectionError::InvalidRequest {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let header = HeaderValue::from_str(auth).map_err(|e| ConnectionError::InvalidRequest {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        request.headers_mut().insert(AUTHORIZATION, header);

        let (stream, _response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout {
                url: url.to_string(),
                after: timeout,
            })?
            .map_err(|e| match e {
                WsError::Http(response) => ConnectionError::Rejected {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                },
                source => ConnectionError::Connect {
                    url: url.to_string(),
                    source,
                },
            })?;

        debug!(url = %url, "WebSocket connected");

        Ok(Self {
            stream,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Close the socket; errors on the way out are only logged
    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(url = %self.url, error = %e, "Error while closing WebSocket");
        }
    }
}

impl Transport for WsSession {
    async fn send(&mut self, command: &Command) -> Result<(), ConnectionError> {
        let text = serde_json::to_string(command)?;
        trace!(url = %self.url, frame = %text, "Sending frame");
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Inbound, ConnectionError> {
        while let Some(message) = self.stream.next().await {
            let text = match message? {
                Message::Text(text) => text,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!(url = %self.url, "Skipping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Message::Close(_) => return Err(ConnectionError::Closed),
                // Pings are answered by tungstenite itself
                _ => continue,
            };

            trace!(url = %self.url, frame = %text, "Received frame");
            return Inbound::parse(&text).map_err(ConnectionError::Protocol);
        }

        Err(ConnectionError::Closed)
    }
}
