//! HTTP + WebSocket transport backed by reqwest and tokio-tungstenite.

use super::{Channel, Credentials, Method, Request, Transport};
use crate::error::{ChainDbError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION as WS_AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

/// Transport talking to a ChainDB server over HTTP, with the event channel
/// on a WebSocket at the same host.
pub struct HttpTransport {
    client: reqwest::Client,
    server: String,
}

impl HttpTransport {
    pub fn new(server: &str) -> Result<Self> {
        Self::with_client(server, reqwest::Client::new())
    }

    /// Use a preconfigured reqwest client (proxies, TLS roots, pools).
    pub fn with_client(server: &str, client: reqwest::Client) -> Result<Self> {
        let parsed = Url::parse(server)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ChainDbError::InvalidConfig(format!(
                "unsupported server scheme {:?}",
                parsed.scheme()
            )));
        }
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    fn http_url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.server, path))?)
    }

    /// Channel URL: same host and path prefix, `ws`/`wss` scheme.
    fn ws_url(&self, path: &str) -> Result<Url> {
        let mut url = self.http_url(path)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| {
            ChainDbError::InvalidConfig(format!("cannot derive event channel URL from {url}"))
        })?;
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: Request) -> Result<Value> {
        let url = self.http_url(&request.path)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, url);
        if let Some(credentials) = &request.credentials {
            builder = builder.header(reqwest::header::AUTHORIZATION, credentials.header_value());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = request.method.as_str(), path = %request.path, "Sending request");
        let resp = builder.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChainDbError::from_status(status.as_u16(), body));
        }

        let value: Value = resp.json().await?;
        Ok(value)
    }

    async fn open_channel(&self, path: &str, credentials: &Credentials) -> Result<Box<dyn Channel>> {
        let url = self.ws_url(path)?;
        let mut ws_request = url.as_str().into_client_request()?;
        let header = HeaderValue::from_str(&credentials.header_value())
            .map_err(|e| ChainDbError::Auth(format!("credential token is not a valid header: {e}")))?;
        ws_request.headers_mut().insert(WS_AUTHORIZATION, header);

        tracing::debug!(url = %url, "Opening event channel");
        let (stream, _response) = tokio_tungstenite::connect_async(ws_request).await?;
        Ok(Box::new(WsChannel { stream }))
    }
}

/// WebSocket event channel.
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&mut self, message: String) -> Result<()> {
        self.stream.send(Message::Text(message)).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => {
                        tracing::warn!("Dropping non UTF-8 binary frame on event channel");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "Event channel closed by server");
                    return Ok(None);
                }
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
