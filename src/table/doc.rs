//! Handle to one specific persisted document.

use super::view::{DocumentView, SpecificDoc};
use crate::client::Client;
use crate::error::{ChainDbError, Result};
use crate::transport::endpoints;
use crate::types::{strip_doc_id, value_into_document, DocId, Document, DOC_ID_FIELD};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// A document addressed by its identifier, detached from the table's
/// current-document pointer.
///
/// Edits go through [`TableDoc::doc_mut`] and reach the server only on
/// [`TableDoc::update`], which revises this identifier in place.
pub struct TableDoc {
    client: Arc<Client>,
    inner: SpecificDoc,
}

impl TableDoc {
    pub(crate) fn new(client: Arc<Client>, inner: SpecificDoc) -> Self {
        Self { client, inner }
    }

    pub fn doc_id(&self) -> &DocId {
        self.inner.doc_id()
    }

    pub fn table_name(&self) -> &str {
        self.inner.table_name()
    }

    pub fn doc(&self) -> &Document {
        self.inner.doc()
    }

    pub fn doc_mut(&mut self) -> &mut Document {
        self.inner.doc_mut()
    }

    /// True when the document holds no data besides its identifier.
    pub fn is_empty(&self) -> bool {
        self.inner.doc().keys().all(|k| k == DOC_ID_FIELD)
    }

    pub fn view(&self) -> DocumentView {
        DocumentView::Specific(self.inner.clone())
    }

    /// Write this handle's data over the stored document with the same
    /// identifier. No new version or identifier is created.
    pub async fn update(&mut self) -> Result<()> {
        let body = json!({
            "data": strip_doc_id(self.inner.doc()),
            "doc_id": self.inner.doc_id(),
        });

        let data = self
            .client
            .post(endpoints::update(self.inner.table_name()), body, ChainDbError::persist_rejected)
            .await
            .map_err(into_update_error)?;

        // Some servers echo the revised document back.
        if let Value::Object(echoed) = data {
            if !echoed.is_empty() {
                self.inner.refresh(echoed)?;
            }
        }

        tracing::info!(
            table = %self.inner.table_name(),
            doc_id = %self.inner.doc_id(),
            "Updated document"
        );
        Ok(())
    }

    /// Re-read this identifier, discarding local edits to this handle.
    pub async fn refetch(&mut self) -> Result<()> {
        let data = self
            .client
            .get(
                endpoints::doc(self.inner.table_name(), self.inner.doc_id()),
                ChainDbError::NotFound,
            )
            .await?;
        let doc = value_into_document(data)?;
        if doc.is_empty() {
            return Err(ChainDbError::NotFound(format!(
                "document {} in table {}",
                self.inner.doc_id(),
                self.inner.table_name()
            )));
        }
        self.inner.refresh(doc)
    }
}

impl fmt::Debug for TableDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDoc")
            .field("table_name", &self.inner.table_name())
            .field("doc_id", self.inner.doc_id())
            .field("doc", self.inner.doc())
            .finish()
    }
}

/// A missing identifier stays `NotFound`; anything else is `Persist`.
fn into_update_error(e: ChainDbError) -> ChainDbError {
    match e {
        ChainDbError::NotFound(_) => e,
        other => other.into_persist(),
    }
}
