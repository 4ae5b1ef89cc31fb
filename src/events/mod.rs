//! Change notifications over the event channel.
//!
//! Handlers register per [`EventKind`] with an [`EventSubscriptionManager`].
//! Events arrive for every table of the database; filter on
//! [`EventData::table`] inside the handler.
//!
//! # Example
//!
//! ```ignore
//! use chaindb::events::{sync_handler, EventKind};
//!
//! let id = session
//!     .events()
//!     .subscribe(EventKind::TablePersist, sync_handler(|event| {
//!         println!("{} persisted: {:?}", event.table, event.data);
//!     }))
//!     .await?;
//!
//! session.events().unsubscribe(EventKind::TablePersist, id);
//! ```

mod manager;
mod registry;
mod stream;
mod types;

pub use manager::{EventSubscriptionManager, DISPATCH_BUFFER};
pub use stream::{EventStream, DEFAULT_STREAM_BUFFER};
pub use types::{
    handler_fn, sync_handler, ConnectionState, EventData, EventHandler, EventKind, FnHandler,
    HandlerError, HandlerId, SyncHandler,
};
