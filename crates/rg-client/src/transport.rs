//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Websocket and HTTP transports towards the inverter dongle."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::borrow::Cow;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rg_common::{DeviceConfig, SessionConfig};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::ClientError;

/// Path of the control socket on the dongle.
pub const SOCKET_PATH: &str = "/ws/home/overview";

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("tls setup failed: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("no frame received within {0:?}")]
    Timeout(Duration),
    #[error("peer closed the socket")]
    Closed,
}

pub fn socket_url(device: &DeviceConfig) -> String {
    format!("{}://{}{}", device.socket_scheme(), device.host, SOCKET_PATH)
}

pub fn http_url(device: &DeviceConfig, path: &str) -> String {
    let separator = if path.starts_with('/') { "" } else { "/" };
    format!("{}://{}{}{}", device.http_scheme(), device.host, separator, path)
}

/// HTTP client used for the plain endpoints (`/about/list`, localization tables).
pub fn http_client(
    device: &DeviceConfig,
    session: &SessionConfig,
) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(session.http_timeout)
        .connect_timeout(session.read_timeout.min(session.http_timeout))
        .danger_accept_invalid_certs(device.accept_invalid_certs)
        .build()
        .map_err(ClientError::HttpClient)
}

/// A text-frame socket with a bounded read.
pub struct FrameSocket {
    stream: SocketStream,
    read_timeout: Duration,
}

impl FrameSocket {
    pub async fn open(device: &DeviceConfig, read_timeout: Duration) -> Result<Self, TransportError> {
        let url = socket_url(device);
        let connector = if device.secure {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(device.accept_invalid_certs)
                .danger_accept_invalid_hostnames(device.accept_invalid_certs)
                .build()?;
            Connector::NativeTls(tls)
        } else {
            Connector::Plain
        };

        let (stream, _) = timeout(
            read_timeout,
            connect_async_tls_with_config(url.as_str(), None, false, Some(connector)),
        )
        .await
        .map_err(|_| TransportError::Timeout(read_timeout))??;
        debug!(url = %url, "socket opened");
        Ok(Self {
            stream,
            read_timeout,
        })
    }

    pub async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        trace!(frame = %text, "write frame");
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Next text frame; control frames are skipped and a peer close is an error.
    pub async fn next_text(&mut self) -> Result<String, TransportError> {
        loop {
            let message = match timeout(self.read_timeout, self.stream.next()).await {
                Err(_) => return Err(TransportError::Timeout(self.read_timeout)),
                Ok(None) => return Err(TransportError::Closed),
                Ok(Some(message)) => message?,
            };
            match message {
                Message::Text(text) => {
                    trace!(frame = %text, "read frame");
                    return Ok(text);
                }
                Message::Close(_) => return Err(TransportError::Closed),
                Message::Binary(bytes) => {
                    debug!(len = bytes.len(), "ignoring binary frame");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Best-effort closing handshake. Failures are logged, never returned.
    pub async fn close(mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed(""),
        };
        if let Err(err) = self.stream.send(Message::Close(Some(frame))).await {
            debug!(error = %err, "connection closed by server");
            return;
        }
        match timeout(CLOSE_TIMEOUT, self.stream.next()).await {
            Ok(Some(Ok(Message::Close(_)))) => debug!("closing handshake completed"),
            Ok(Some(Ok(other))) => debug!(
                read = message_kind(&other),
                "closing handshake message type mismatch"
            ),
            Ok(Some(Err(err))) => debug!(error = %err, "no closing message from server"),
            Ok(None) => debug!("no closing message from server"),
            Err(_) => debug!(timeout = ?CLOSE_TIMEOUT, "no closing message from server"),
        }
    }
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_scheme_selection() {
        let mut device = DeviceConfig::new("192.168.1.20");
        assert_eq!(socket_url(&device), "wss://192.168.1.20/ws/home/overview");
        assert_eq!(
            http_url(&device, "/about/list"),
            "https://192.168.1.20/about/list"
        );

        device.secure = false;
        device.host = "127.0.0.1:8082".into();
        assert_eq!(socket_url(&device), "ws://127.0.0.1:8082/ws/home/overview");
        assert_eq!(
            http_url(&device, "i18n/en_US.properties"),
            "http://127.0.0.1:8082/i18n/en_US.properties"
        );
    }

    #[test]
    fn http_client_builds_with_defaults() {
        let device = DeviceConfig::new("inverter.local");
        assert!(http_client(&device, &SessionConfig::default()).is_ok());
    }
}
