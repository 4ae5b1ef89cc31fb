//! Connection and client configuration.

use crate::error::{ChainDbError, Result};
use std::fmt;
use std::time::Duration;

/// Server used when a connection does not name one.
pub const DEFAULT_SERVER: &str = "http://localhost:2818";

/// Where to reach a database and which credentials to present.
#[derive(Clone)]
pub struct Connection {
    /// Server base URL.
    pub server: String,

    /// Database name.
    pub database: String,

    pub user: String,

    pub password: String,
}

impl Connection {
    pub fn new(
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(ChainDbError::InvalidConfig("database name is empty".into()));
        }
        if !(self.server.starts_with("http://") || self.server.starts_with("https://")) {
            return Err(ChainDbError::InvalidConfig(format!(
                "server must be an http(s) URL, got {:?}",
                self.server
            )));
        }
        Ok(())
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Backoff schedule for re-opening the event channel.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    /// Attempts before giving up (None = retry forever).
    /// Default: 8
    pub max_attempts: Option<u32>,

    /// Delay before the first retry.
    /// Default: 100ms
    pub initial_backoff: Duration,

    /// Upper bound on any single delay.
    /// Default: 5s
    pub max_backoff: Duration,

    /// Growth factor between consecutive delays.
    /// Default: 2.0
    pub multiplier: f64,
}

impl ReconnectPolicy {
    /// Delay to wait before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// Whether another attempt is allowed after `attempts` failures.
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(8),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// How `find_where` queries are evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryMode {
    /// Use the server's find endpoints; results are re-checked locally.
    Server,

    /// Fetch `window` history entries and filter them locally.
    Local { window: usize },
}

impl Default for QueryMode {
    fn default() -> Self {
        QueryMode::Server
    }
}

/// Client tuning.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Bound on every request/response call.
    /// Default: 30s
    pub request_timeout: Duration,

    /// Bound on each attempt to open the event channel.
    /// Default: 10s
    pub connect_timeout: Duration,

    /// Bound on a single event handler invocation.
    /// Default: 30s
    pub handler_timeout: Duration,

    pub reconnect: ReconnectPolicy,

    pub query_mode: QueryMode,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("connect_timeout", self.connect_timeout),
            ("handler_timeout", self.handler_timeout),
        ] {
            if value.is_zero() {
                return Err(ChainDbError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }

        let policy = &self.reconnect;
        if policy.max_attempts == Some(0) {
            return Err(ChainDbError::InvalidConfig(
                "reconnect.max_attempts must be at least 1".into(),
            ));
        }
        if !(policy.multiplier.is_finite() && policy.multiplier >= 1.0) {
            return Err(ChainDbError::InvalidConfig(
                "reconnect.multiplier must be >= 1.0".into(),
            ));
        }
        if policy.max_backoff < policy.initial_backoff {
            return Err(ChainDbError::InvalidConfig(
                "reconnect.max_backoff is below initial_backoff".into(),
            ));
        }
        if let QueryMode::Local { window: 0 } = self.query_mode {
            return Err(ChainDbError::InvalidConfig(
                "local query window must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            handler_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            query_mode: QueryMode::default(),
        }
    }
}
