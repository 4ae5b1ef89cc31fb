//! Server endpoint paths.

use crate::error::{ChainDbError, Result};
use crate::types::DocId;

pub const API_BASE: &str = "/api/v1";

pub fn connect() -> String {
    format!("{API_BASE}/database/connect")
}

pub fn table(name: &str) -> String {
    format!("{API_BASE}/table/{name}")
}

pub fn persist(name: &str) -> String {
    format!("{API_BASE}/table/{name}/persist")
}

pub fn update(name: &str) -> String {
    format!("{API_BASE}/table/{name}/update")
}

pub fn history(name: &str, limit: usize) -> String {
    format!("{API_BASE}/table/{name}/history?limit={limit}")
}

pub fn find(name: &str) -> String {
    format!("{API_BASE}/table/{name}/find")
}

pub fn find_advanced(name: &str) -> String {
    format!("{API_BASE}/table/{name}/find-advanced")
}

pub fn doc(name: &str, id: &DocId) -> String {
    format!("{API_BASE}/table/{name}/doc/{id}")
}

pub fn events() -> String {
    format!("{API_BASE}/events")
}

/// Check that a table name can be used as a single path segment.
pub fn validate_table_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control());
    if bad {
        Err(ChainDbError::InvalidTableName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Check that a document identifier can be used as a single path segment.
pub(crate) fn validate_doc_id(id: &DocId) -> Result<()> {
    let s = id.as_str();
    if s.is_empty() || s.chars().any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace()) {
        Err(ChainDbError::NotFound(format!("malformed document id {s:?}")))
    } else {
        Ok(())
    }
}
