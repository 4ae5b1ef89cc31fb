//! Per-session registry keeping at most one table handle per name.

use super::machine::Table;
use crate::client::Client;
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) struct TableRegistry {
    tables: RwLock<HashMap<String, Table>>,
}

impl TableRegistry {
    pub(crate) fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<Table> {
        self.tables.read().get(name).cloned()
    }

    /// Return the registered handle for `name`, opening it on first use.
    ///
    /// Two concurrent first opens both fetch, but only the first to finish
    /// is registered; the other caller receives that same handle.
    pub(crate) async fn get_or_open(&self, name: &str, client: &Arc<Client>) -> Result<Table> {
        if let Some(table) = self.get(name) {
            return Ok(table);
        }

        let opened = Table::open(name, Arc::clone(client)).await?;

        let mut tables = self.tables.write();
        let table = match tables.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                tracing::debug!(table = %name, "Table opened concurrently, reusing registered handle");
                existing.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(opened).clone(),
        };
        Ok(table)
    }

    pub(crate) fn remove(&self, name: &str) -> Option<Table> {
        self.tables.write().remove(name)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub(crate) fn clear(&self) {
        self.tables.write().clear();
    }
}
