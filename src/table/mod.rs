//! Tables, their current document, and specific-document handles.
//!
//! A [`Table`] owns the table's editable draft ("current document") and
//! moves it forward on every persist. A [`TableDoc`] is bound to one
//! persisted identifier and revises that record in place.
//!
//! # Example
//!
//! ```ignore
//! let greeting = session.get_table("greeting").await?;
//! greeting.set_field("greeting", "Hello");
//! let stored = greeting.persist().await?;
//!
//! let mut doc = greeting.get_doc(greeting.current_doc_id().unwrap()).await?;
//! doc.doc_mut().insert("greeting".into(), "Updated".into());
//! doc.update().await?;
//! ```

mod doc;
mod machine;
pub(crate) mod registry;
mod typed;
mod view;

pub use doc::TableDoc;
pub use machine::Table;
pub use typed::{TypedDoc, TypedTable};
pub use view::{CurrentDoc, DocumentView, SpecificDoc, ViewKind};
