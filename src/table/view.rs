//! Current vs specific document views.
//!
//! Both wrap a document but follow different identity rules:
//! - [`CurrentDoc`]: a table's editable draft; its identifier moves forward
//!   on every persist
//! - [`SpecificDoc`]: bound to one identifier for its whole lifetime

use crate::error::{ChainDbError, PersistFailure, Result};
use crate::types::{DocId, Document, DOC_ID_FIELD};

/// A table's live draft.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CurrentDoc {
    doc: Document,
    doc_id: Option<DocId>,
}

impl CurrentDoc {
    /// Draft as read from the server's current-document endpoint.
    pub(crate) fn from_server(doc: Document) -> Self {
        let doc_id = DocId::from_document(&doc);
        Self { doc, doc_id }
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn doc_id(&self) -> Option<&DocId> {
        self.doc_id.as_ref()
    }

    /// True until the table has been persisted at least once.
    pub fn is_unpersisted(&self) -> bool {
        self.doc_id.is_none()
    }

    /// Move to the version the server just stored.
    ///
    /// The stored document must carry its new identifier; otherwise the
    /// draft is left untouched.
    pub(crate) fn advance(&mut self, persisted: Document) -> Result<DocId> {
        let id = DocId::from_document(&persisted).ok_or_else(|| {
            ChainDbError::Persist {
                kind: PersistFailure::Protocol,
                message: "server did not assign an identifier to the stored document".into(),
            }
        })?;
        self.doc = persisted;
        self.doc_id = Some(id.clone());
        Ok(id)
    }
}

/// A detached, identifier-bound document.
#[derive(Clone, Debug, PartialEq)]
pub struct SpecificDoc {
    table_name: String,
    doc_id: DocId,
    doc: Document,
}

impl SpecificDoc {
    /// Bind a fetched document to the identifier it was requested by.
    pub(crate) fn bind(table_name: &str, doc_id: DocId, doc: Document) -> Result<Self> {
        let doc = revalidate(&doc_id, doc)?;
        Ok(Self {
            table_name: table_name.to_string(),
            doc_id,
            doc,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Replace the data with a fresh server copy of the same identifier.
    pub(crate) fn refresh(&mut self, doc: Document) -> Result<()> {
        self.doc = revalidate(&self.doc_id, doc)?;
        Ok(())
    }
}

/// Ensure `doc` belongs to `expected`, filling the field in if the server
/// left it out.
fn revalidate(expected: &DocId, mut doc: Document) -> Result<Document> {
    match doc.get(DOC_ID_FIELD) {
        None | Some(serde_json::Value::Null) => {
            doc.insert(DOC_ID_FIELD.into(), expected.as_str().into());
            Ok(doc)
        }
        Some(_) => match DocId::from_document(&doc) {
            Some(got) if &got == expected => Ok(doc),
            got => Err(ChainDbError::IdentifierMismatch {
                expected: expected.clone(),
                got,
            }),
        },
    }
}

/// Kind tag of a [`DocumentView`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    Current,
    Specific,
}

/// Read-only view over either kind of document.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentView {
    Current { table_name: String, doc: CurrentDoc },
    Specific(SpecificDoc),
}

impl DocumentView {
    pub fn kind(&self) -> ViewKind {
        match self {
            DocumentView::Current { .. } => ViewKind::Current,
            DocumentView::Specific(_) => ViewKind::Specific,
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            DocumentView::Current { table_name, .. } => table_name,
            DocumentView::Specific(specific) => specific.table_name(),
        }
    }

    pub fn doc(&self) -> &Document {
        match self {
            DocumentView::Current { doc, .. } => doc.doc(),
            DocumentView::Specific(specific) => specific.doc(),
        }
    }

    pub fn doc_id(&self) -> Option<&DocId> {
        match self {
            DocumentView::Current { doc, .. } => doc.doc_id(),
            DocumentView::Specific(specific) => Some(specific.doc_id()),
        }
    }

    /// True when there is no field data besides the identifier.
    pub fn is_empty(&self) -> bool {
        self.doc().keys().all(|k| k == DOC_ID_FIELD)
    }
}
