//! # ChainDB Client
//!
//! Async client for a ChainDB server: a document store where every table is
//! an append-only history of versions plus one current document.
//!
//! ## Core Concepts
//!
//! - **Tables**: Named histories with one editable current document
//! - **Persist**: Stores the current document as a new version with a fresh id
//! - **TableDoc**: A handle bound to one persisted id, revised in place
//! - **Criteria**: Exact and advanced queries over a table's history
//! - **Events**: Change notifications pushed over a long-lived channel
//!
//! ## Example
//!
//! ```ignore
//! use chaindb::{connect, Connection, Condition};
//!
//! let session = connect(Connection::new("my-db", "admin", "secret")).await?;
//!
//! // Edit and persist the current document
//! let greeting = session.get_table("greeting").await?;
//! greeting.set_field("greeting", "Hello");
//! greeting.persist().await?;
//!
//! // Query history
//! let hits = greeting
//!     .find_where_advanced(vec![Condition::contains("greeting", "Hell")], 10, true)
//!     .await?;
//!
//! session.close().await;
//! ```

mod client;
pub mod config;
pub mod criteria;
pub mod error;
pub mod events;
pub mod session;
pub mod table;
pub mod transport;
pub mod types;

// Re-exports
pub use config::{ClientConfig, Connection, QueryMode, ReconnectPolicy, DEFAULT_SERVER};
pub use criteria::{Condition, Criteria, Operator, Query};
pub use error::{ChainDbError, PersistFailure, Result};
pub use events::{
    handler_fn, sync_handler, ConnectionState, EventData, EventHandler, EventKind, EventStream,
    EventSubscriptionManager, HandlerId,
};
pub use session::{connect, connect_with, connect_with_transport, Session};
pub use table::{CurrentDoc, DocumentView, SpecificDoc, Table, TableDoc, TypedDoc, TypedTable, ViewKind};
pub use transport::{Channel, Credentials, HttpTransport, Method, Request, Transport};
pub use types::{from_document, to_document, ApiResponse, DocId, Document, DOC_ID_FIELD};
