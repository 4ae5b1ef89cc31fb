//! Typed views over tables and documents.
//!
//! The schema type only describes the document shape; every operation is
//! still carried out by the untyped [`Table`] / [`TableDoc`].

use super::doc::TableDoc;
use super::machine::Table;
use crate::criteria::Condition;
use crate::error::Result;
use crate::types::{from_document, to_document, DocId, Document, DOC_ID_FIELD};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// A [`Table`] whose documents decode as `T`.
pub struct TypedTable<T> {
    table: Table,
    _schema: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedTable<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            _schema: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TypedTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedTable")
            .field("table", &self.table)
            .field("schema", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> TypedTable<T> {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            _schema: PhantomData,
        }
    }

    /// The untyped handle sharing this table's state.
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn current_doc_id(&self) -> Option<DocId> {
        self.table.current_doc_id()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Decode the current document.
    pub fn get(&self) -> Result<T> {
        from_document(&self.table.current_doc())
    }

    /// Decode the current document, or `T::default()` for a table whose
    /// draft holds no fields yet.
    pub fn get_or_default(&self) -> Result<T>
    where
        T: Default,
    {
        let doc = self.table.current_doc();
        if doc.keys().all(|k| k == DOC_ID_FIELD) {
            Ok(T::default())
        } else {
            from_document(&doc)
        }
    }

    /// Replace the draft with `value`.
    pub fn set(&self, value: &T) -> Result<()> {
        let doc = to_document(value)?;
        self.table.replace_doc(doc);
        Ok(())
    }

    /// Decode, edit and write back the draft.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        let mut value = self.get()?;
        f(&mut value);
        self.set(&value)
    }

    pub async fn persist(&self) -> Result<T> {
        let stored = self.table.persist().await?;
        from_document(&stored)
    }

    pub async fn refetch(&self) -> Result<()> {
        self.table.refetch().await
    }

    pub async fn get_doc(&self, doc_id: impl Into<DocId>) -> Result<TypedDoc<T>> {
        let doc = self.table.get_doc(doc_id).await?;
        Ok(TypedDoc::new(doc))
    }

    pub async fn get_history(&self, limit: usize) -> Result<Vec<T>> {
        decode_all(self.table.get_history(limit).await?)
    }

    pub async fn find_where(&self, criteria: Document, limit: usize, reverse: bool) -> Result<Vec<T>> {
        decode_all(self.table.find_where(criteria, limit, reverse).await?)
    }

    pub async fn find_where_advanced(
        &self,
        conditions: Vec<Condition>,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<T>> {
        decode_all(self.table.find_where_advanced(conditions, limit, reverse).await?)
    }
}

fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>> {
    docs.iter().map(from_document).collect()
}

/// A [`TableDoc`] whose data decodes as `T`.
pub struct TypedDoc<T> {
    inner: TableDoc,
    _schema: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for TypedDoc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedDoc")
            .field("doc", &self.inner)
            .field("schema", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> TypedDoc<T> {
    pub fn new(inner: TableDoc) -> Self {
        Self {
            inner,
            _schema: PhantomData,
        }
    }

    pub fn doc_id(&self) -> &DocId {
        self.inner.doc_id()
    }

    pub fn table_name(&self) -> &str {
        self.inner.table_name()
    }

    pub fn get(&self) -> Result<T> {
        from_document(self.inner.doc())
    }

    /// Replace the local data; the identifier field is kept.
    pub fn set(&mut self, value: &T) -> Result<()> {
        let mut doc = to_document(value)?;
        doc.insert(DOC_ID_FIELD.into(), self.inner.doc_id().as_str().into());
        *self.inner.doc_mut() = doc;
        Ok(())
    }

    pub fn modify(&mut self, f: impl FnOnce(&mut T)) -> Result<()> {
        let mut value = self.get()?;
        f(&mut value);
        self.set(&value)
    }

    /// Send the local data to the server under this identifier.
    pub async fn update(&mut self) -> Result<()> {
        self.inner.update().await
    }

    pub async fn refetch(&mut self) -> Result<()> {
        self.inner.refetch().await
    }

    pub fn into_inner(self) -> TableDoc {
        self.inner
    }
}
