//! Table handle and its current-document state machine.

use super::doc::TableDoc;
use super::view::{CurrentDoc, DocumentView, SpecificDoc};
use crate::client::Client;
use crate::config::QueryMode;
use crate::criteria::{self, Condition, Criteria, Query};
use crate::error::{ChainDbError, Result};
use crate::transport::endpoints;
use crate::types::{
    strip_doc_id, value_into_document, value_into_documents, DocId, Document,
};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Local state of a table's current document.
#[derive(Clone, Debug)]
enum TableState {
    /// Nothing fetched yet.
    Unloaded,

    /// Current document known; `edits` counts local mutations since the
    /// last server sync.
    Loaded { current: CurrentDoc, edits: u64 },
}

struct TableInner {
    name: String,
    client: Arc<Client>,
    state: RwLock<TableState>,
    /// Serializes persist and refetch, the two operations that replace the
    /// current document with a server copy.
    sync_gate: tokio::sync::Mutex<()>,
}

/// Handle to one table of a session.
///
/// Cheap to clone; clones share the same current document, so an edit made
/// through one handle is visible through every other.
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

impl Table {
    /// Fetch the table's current document and return a loaded handle.
    ///
    /// The server creates an empty table on first access.
    pub(crate) async fn open(name: &str, client: Arc<Client>) -> Result<Self> {
        endpoints::validate_table_name(name)?;

        let table = Self {
            inner: Arc::new(TableInner {
                name: name.to_string(),
                client,
                state: RwLock::new(TableState::Unloaded),
                sync_gate: tokio::sync::Mutex::new(()),
            }),
        };
        table.refetch().await?;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.inner.state.read(), TableState::Loaded { .. })
    }

    /// Whether two handles share the same underlying state.
    pub fn same_table(&self, other: &Table) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- Current document ---

    /// Snapshot of the current document, local edits included.
    pub fn current_doc(&self) -> Document {
        match &*self.inner.state.read() {
            TableState::Unloaded => Document::new(),
            TableState::Loaded { current, .. } => current.doc().clone(),
        }
    }

    /// Identifier of the most recently persisted version.
    pub fn current_doc_id(&self) -> Option<DocId> {
        match &*self.inner.state.read() {
            TableState::Unloaded => None,
            TableState::Loaded { current, .. } => current.doc_id().cloned(),
        }
    }

    /// True iff the table has never been persisted to.
    pub fn is_empty(&self) -> bool {
        self.current_doc_id().is_none()
    }

    pub fn view(&self) -> DocumentView {
        let current = match &*self.inner.state.read() {
            TableState::Unloaded => CurrentDoc::default(),
            TableState::Loaded { current, .. } => current.clone(),
        };
        DocumentView::Current {
            table_name: self.inner.name.clone(),
            doc: current,
        }
    }

    /// Edit the current document in place. Local only until `persist`.
    pub fn edit<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut state = self.inner.state.write();
        match &mut *state {
            TableState::Loaded { current, edits } => {
                *edits += 1;
                f(current.doc_mut())
            }
            TableState::Unloaded => {
                let mut current = CurrentDoc::default();
                let result = f(current.doc_mut());
                *state = TableState::Loaded { current, edits: 1 };
                result
            }
        }
    }

    pub fn set_field(&self, field: impl Into<String>, value: impl Into<Value>) {
        let (field, value) = (field.into(), value.into());
        self.edit(|doc| {
            doc.insert(field, value);
        });
    }

    pub fn remove_field(&self, field: &str) -> Option<Value> {
        self.edit(|doc| doc.remove(field))
    }

    /// Replace the whole draft. The identifier is kept: it names the last
    /// persisted version, not the draft.
    pub fn replace_doc(&self, doc: Document) {
        self.edit(|current| *current = doc);
    }

    // --- Server transitions ---

    /// Store the current document as a new version.
    ///
    /// On success the draft becomes the stored document carrying its new
    /// identifier. On failure the local state is unchanged.
    pub async fn persist(&self) -> Result<Document> {
        let _gate = self.inner.sync_gate.lock().await;

        let (data, edits_before) = match &*self.inner.state.read() {
            TableState::Unloaded => (Document::new(), 0),
            TableState::Loaded { current, edits } => (strip_doc_id(current.doc()), *edits),
        };

        let stored = self
            .inner
            .client
            .post(
                endpoints::persist(&self.inner.name),
                json!({ "data": data }),
                ChainDbError::persist_rejected,
            )
            .await
            .map_err(into_persist_error)?;
        let stored = value_into_document(stored).map_err(into_persist_error)?;

        let mut next = CurrentDoc::default();
        let doc_id = next.advance(stored.clone()).map_err(into_persist_error)?;

        let mut state = self.inner.state.write();
        if let TableState::Loaded { edits, .. } = &*state {
            if *edits != edits_before {
                tracing::warn!(
                    table = %self.inner.name,
                    "Local edits made during persist were replaced by the stored document"
                );
            }
        }
        *state = TableState::Loaded {
            current: next,
            edits: 0,
        };
        drop(state);

        tracing::info!(table = %self.inner.name, doc_id = %doc_id, "Persisted new version");
        Ok(stored)
    }

    /// Re-read the current document, discarding local edits.
    pub async fn refetch(&self) -> Result<()> {
        let _gate = self.inner.sync_gate.lock().await;

        let data = self
            .inner
            .client
            .get(endpoints::table(&self.inner.name), ChainDbError::Rejected)
            .await?;
        let current = CurrentDoc::from_server(value_into_document(data)?);

        tracing::debug!(
            table = %self.inner.name,
            doc_id = ?current.doc_id(),
            "Fetched current document"
        );
        *self.inner.state.write() = TableState::Loaded { current, edits: 0 };
        Ok(())
    }

    // --- History and lookups ---

    /// Fetch one persisted document as a detached handle.
    pub async fn get_doc(&self, doc_id: impl Into<DocId>) -> Result<TableDoc> {
        let doc_id = doc_id.into();
        endpoints::validate_doc_id(&doc_id)?;

        let data = self
            .inner
            .client
            .get(endpoints::doc(&self.inner.name, &doc_id), ChainDbError::NotFound)
            .await?;
        let doc = value_into_document(data)?;
        if doc.is_empty() {
            return Err(ChainDbError::NotFound(format!(
                "document {doc_id} in table {}",
                self.inner.name
            )));
        }

        let specific = SpecificDoc::bind(&self.inner.name, doc_id, doc)?;
        Ok(TableDoc::new(Arc::clone(&self.inner.client), specific))
    }

    /// Up to `limit` persisted versions, most recent first.
    pub async fn get_history(&self, limit: usize) -> Result<Vec<Document>> {
        let data = self
            .inner
            .client
            .get(endpoints::history(&self.inner.name, limit), ChainDbError::Rejected)
            .await?;
        let mut docs = value_into_documents(data)?;
        docs.truncate(limit);
        Ok(docs)
    }

    /// Exact-match search over the history.
    pub async fn find_where(&self, criteria: Document, limit: usize, reverse: bool) -> Result<Vec<Document>> {
        self.find(&Query::new(Criteria::Exact(criteria)).limit(limit).reverse(reverse))
            .await
    }

    /// Typed-comparison search over the history.
    pub async fn find_where_advanced(
        &self,
        conditions: Vec<Condition>,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<Document>> {
        self.find(&Query::new(Criteria::Advanced(conditions)).limit(limit).reverse(reverse))
            .await
    }

    pub async fn find(&self, query: &Query) -> Result<Vec<Document>> {
        match self.inner.client.config().query_mode {
            QueryMode::Server => {
                let path = match query.criteria {
                    Criteria::Exact(_) => endpoints::find(&self.inner.name),
                    Criteria::Advanced(_) => endpoints::find_advanced(&self.inner.name),
                };
                let data = self
                    .inner
                    .client
                    .post(path, query.to_body(), ChainDbError::Rejected)
                    .await?;
                let docs = value_into_documents(data)?;
                Ok(criteria::retain_matching(docs, &query.criteria, query.limit))
            }
            QueryMode::Local { window } => {
                let history = self.get_history(window).await?;
                Ok(criteria::evaluate(&history, &query.criteria, query.limit, query.reverse))
            }
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.inner.name)
            .field("state", &*self.inner.state.read())
            .finish()
    }
}

/// Persist reports every failure as `Persist`.
fn into_persist_error(e: ChainDbError) -> ChainDbError {
    e.into_persist()
}
