//! Transport adapter: request/response calls and the duplex event channel.
//!
//! The client core only talks to the server through [`Transport`], so the
//! HTTP stack can be swapped for an in-memory server in tests.
//!
//! # Example
//!
//! ```ignore
//! let transport = HttpTransport::new("http://localhost:2818")?;
//! let body = transport
//!     .request(Request::get(endpoints::table("greeting")).with_credentials(creds))
//!     .await?;
//! ```

pub mod endpoints;
mod http;

pub use http::{HttpTransport, WsChannel};

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// HTTP verb used by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Token returned by the connect handshake, sent with every later request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value of the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("Basic {}", self.token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// One request/response call.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,

    /// Path relative to the server root, query string included.
    pub path: String,

    pub body: Option<Value>,

    /// Absent only for the connect handshake.
    pub credentials: Option<Credentials>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            credentials: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Request/response calls plus duplex channel creation.
///
/// `request` resolves to the decoded JSON response body. Implementations map
/// failures onto the crate taxonomy: unreachable server -> `Transport`,
/// 404 -> `NotFound`, 400/422 -> `Validation`, 401/403 -> `Auth`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request(&self, request: Request) -> Result<Value>;

    async fn open_channel(&self, path: &str, credentials: &Credentials) -> Result<Box<dyn Channel>>;
}

/// One open duplex connection carrying text messages.
#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, message: String) -> Result<()>;

    /// Next inbound message; `Ok(None)` once the channel is closed.
    ///
    /// Must be cancel safe: the event loop races it against outbound
    /// commands and drops the losing future.
    async fn receive(&mut self) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}
