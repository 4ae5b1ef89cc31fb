//! Connecting to a database and the session that owns its tables.

use crate::client::Client;
use crate::config::{ClientConfig, Connection};
use crate::error::Result;
use crate::events::EventSubscriptionManager;
use crate::table::registry::TableRegistry;
use crate::table::{Table, TypedTable};
use crate::transport::{HttpTransport, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Connect with the default [`ClientConfig`].
pub async fn connect(connection: Connection) -> Result<Session> {
    connect_with(connection, ClientConfig::default()).await
}

/// Connect over HTTP and WebSocket with explicit tuning.
pub async fn connect_with(connection: Connection, config: ClientConfig) -> Result<Session> {
    connection.validate()?;
    let http = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()?;
    let transport = HttpTransport::with_client(&connection.server, http)?;
    connect_with_transport(connection, config, Arc::new(transport)).await
}

/// Connect through a caller-supplied transport.
pub async fn connect_with_transport(
    connection: Connection,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
) -> Result<Session> {
    connection.validate()?;
    config.validate()?;
    let client = Arc::new(Client::connect(transport, &connection, config).await?);
    Ok(Session::new(client))
}

/// An authenticated connection to one database.
///
/// Holds at most one [`Table`] per name; repeated `get_table` calls return
/// handles sharing the same state. Event subscriptions are managed through
/// [`Session::events`].
pub struct Session {
    client: Arc<Client>,
    tables: TableRegistry,
    events: EventSubscriptionManager,
}

impl Session {
    fn new(client: Arc<Client>) -> Self {
        let events = EventSubscriptionManager::new(Arc::clone(&client));
        Self {
            client,
            tables: TableRegistry::new(),
            events,
        }
    }

    pub fn database(&self) -> &str {
        self.client.database()
    }

    pub fn server(&self) -> &str {
        self.client.server()
    }

    /// Open `name`, fetching its current document on first use.
    pub async fn get_table(&self, name: &str) -> Result<Table> {
        self.tables.get_or_open(name, &self.client).await
    }

    /// Open `name` with documents decoded as `T`.
    pub async fn get_typed_table<T>(&self, name: &str) -> Result<TypedTable<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let table = self.get_table(name).await?;
        Ok(TypedTable::new(table))
    }

    /// Names of the tables opened so far, sorted.
    pub fn open_tables(&self) -> Vec<String> {
        self.tables.names()
    }

    /// Forget the local handle for `name`. The next `get_table` refetches.
    pub fn release_table(&self, name: &str) -> bool {
        self.tables.remove(name).is_some()
    }

    pub fn events(&self) -> &EventSubscriptionManager {
        &self.events
    }

    /// Close the event channel and drop every table handle held by the session.
    ///
    /// Handles already given out keep working for requests.
    pub async fn close(&self) {
        self.events.close_events().await;
        let released = self.tables.len();
        self.tables.clear();
        tracing::info!(database = %self.client.database(), tables = released, "Session closed");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.client.database())
            .field("server", &self.client.server())
            .field("tables", &self.tables.names())
            .field("events", &self.events)
            .finish()
    }
}
