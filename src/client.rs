//! Request plumbing shared by sessions, tables and document handles.

use crate::config::{ClientConfig, Connection};
use crate::error::{ChainDbError, Result};
use crate::transport::{endpoints, Credentials, Request, Transport};
use crate::types::ApiResponse;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Authenticated access to one database.
pub(crate) struct Client {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    config: ClientConfig,
    database: String,
    server: String,
}

impl Client {
    /// Run the credential handshake and build an authenticated client.
    pub(crate) async fn connect(
        transport: Arc<dyn Transport>,
        connection: &Connection,
        config: ClientConfig,
    ) -> Result<Self> {
        let request = Request::post(
            endpoints::connect(),
            json!({
                "name": connection.database,
                "user": connection.user,
                "password": connection.password,
            }),
        );

        let data = call(transport.as_ref(), request, config.request_timeout, ChainDbError::Auth)
            .await
            .map_err(|e| match e {
                // A refused handshake is an auth failure whatever the wording.
                ChainDbError::Validation(m) | ChainDbError::NotFound(m) => ChainDbError::Auth(m),
                other => other,
            })?;

        let token = match data {
            Value::String(token) if !token.is_empty() => token,
            other => {
                return Err(ChainDbError::Protocol(format!(
                    "connect returned no credential token (got {other})"
                )))
            }
        };

        tracing::info!(database = %connection.database, server = %connection.server, "Connected");

        Ok(Self {
            transport,
            credentials: Credentials::new(token),
            config,
            database: connection.database.clone(),
            server: connection.server.clone(),
        })
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn database(&self) -> &str {
        &self.database
    }

    pub(crate) fn server(&self) -> &str {
        &self.server
    }

    /// Authenticated GET, returning the envelope payload.
    pub(crate) async fn get(&self, path: String, fallback: fn(String) -> ChainDbError) -> Result<Value> {
        let request = Request::get(path).with_credentials(self.credentials.clone());
        call(self.transport.as_ref(), request, self.config.request_timeout, fallback).await
    }

    /// Authenticated POST, returning the envelope payload.
    pub(crate) async fn post(
        &self,
        path: String,
        body: Value,
        fallback: fn(String) -> ChainDbError,
    ) -> Result<Value> {
        let request = Request::post(path, body).with_credentials(self.credentials.clone());
        call(self.transport.as_ref(), request, self.config.request_timeout, fallback).await
    }
}

async fn call(
    transport: &dyn Transport,
    request: Request,
    limit: Duration,
    fallback: fn(String) -> ChainDbError,
) -> Result<Value> {
    let operation = format!("{} {}", request.method.as_str(), request.path);

    let body = match tokio::time::timeout(limit, transport.request(request)).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!(operation = %operation, ?limit, "Request timed out");
            return Err(ChainDbError::Timeout {
                operation,
                elapsed: limit,
            });
        }
    };

    ApiResponse::from_value(body)?.into_data(fallback)
}
