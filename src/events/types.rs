//! Event types, handler contracts and the channel wire format.

use crate::error::{ChainDbError, Result};
use crate::types::{json_kind, Document};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

/// Kinds of change notification the server emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// A specific document was revised in place.
    TableUpdate,
    /// A new version was persisted.
    TablePersist,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::TableUpdate, EventKind::TablePersist];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TableUpdate => "TableUpdate",
            EventKind::TablePersist => "TablePersist",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ChainDbError;

    fn from_str(s: &str) -> Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ChainDbError::Protocol(format!("unknown event type {s:?}")))
    }
}

/// One change notification.
///
/// Delivered for every table of the database; handlers filter on
/// `table` themselves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub event_type: EventKind,
    pub database: String,
    pub table: String,
    pub data: Document,
    pub timestamp: i64,
}

impl EventData {
    /// Decode an inbound channel message.
    ///
    /// Returns `Ok(None)` for well-formed messages of an event type this
    /// client does not know.
    pub fn decode(text: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ChainDbError::Protocol(format!("event message is not JSON: {e}")))?;
        let Value::Object(mut message) = value else {
            return Err(ChainDbError::Protocol(format!(
                "event message must be an object, got {}",
                json_kind(&value)
            )));
        };

        let kind = match message.get("event_type").or_else(|| message.get("event")) {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(ChainDbError::Protocol("event message has no event type".into())),
        };
        let Ok(event_type) = kind.parse::<EventKind>() else {
            tracing::debug!(event = %kind, "Ignoring unknown event type");
            return Ok(None);
        };

        let data = match message.remove("data") {
            Some(Value::Object(doc)) => doc,
            None | Some(Value::Null) => Document::new(),
            Some(other) => {
                return Err(ChainDbError::Protocol(format!(
                    "event data must be a document, got {}",
                    json_kind(&other)
                )))
            }
        };

        let text_field = |name: &str| match message.get(name) {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        let timestamp = match message.get("timestamp") {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or_default(),
            _ => 0,
        };

        Ok(Some(Self {
            event_type,
            database: text_field("database"),
            table: text_field("table"),
            data,
            timestamp,
        }))
    }
}

/// Outbound interest announcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Action {
    Subscribe,
    Unsubscribe,
}

#[derive(Serialize)]
struct ControlMessage {
    action: Action,
    event: EventKind,
}

pub(crate) fn encode_control(action: Action, event: EventKind) -> Result<String> {
    serde_json::to_string(&ControlMessage { action, event })
        .map_err(|e| ChainDbError::Serialization(e.to_string()))
}

/// Identifier of one registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of the event channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Error a handler may report; logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives events of the kinds it is subscribed to.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &EventData) -> std::result::Result<(), HandlerError>;
}

/// Handler built from an async closure. See [`handler_fn`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: &EventData) -> std::result::Result<(), HandlerError> {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a handler.
///
/// ```ignore
/// events.subscribe(EventKind::TableUpdate, handler_fn(|event| async move {
///     if event.table == "greeting" {
///         println!("greeting updated: {:?}", event.data);
///     }
///     Ok(())
/// })).await?;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(EventData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

/// Handler built from a plain closure. See [`sync_handler`].
pub struct SyncHandler<F>(F);

#[async_trait]
impl<F> EventHandler for SyncHandler<F>
where
    F: Fn(&EventData) + Send + Sync + 'static,
{
    async fn handle(&self, event: &EventData) -> std::result::Result<(), HandlerError> {
        (self.0)(event);
        Ok(())
    }
}

/// Wrap a non-suspending closure as a handler.
pub fn sync_handler<F>(f: F) -> SyncHandler<F>
where
    F: Fn(&EventData) + Send + Sync + 'static,
{
    SyncHandler(f)
}
