//! Core types for the ChainDB client.

use crate::error::{ChainDbError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A JSON-like record stored in a table.
pub type Document = serde_json::Map<String, Value>;

/// Reserved field carrying a persisted document's identifier.
pub const DOC_ID_FIELD: &str = "doc_id";

/// Server-assigned identifier of a persisted document.
///
/// Opaque to the client: identifiers are only ever read from server
/// responses, never minted locally.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        DocId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the identifier carried by a document, if any.
    pub fn from_document(doc: &Document) -> Option<Self> {
        match doc.get(DOC_ID_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => Some(DocId(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({})", self.0)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        DocId(s.to_string())
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        DocId(s)
    }
}

/// Envelope wrapped around every server response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl ApiResponse {
    /// Decode an envelope from a raw response body.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ChainDbError::Protocol(format!("malformed response envelope: {e}")))
    }

    /// Unwrap the payload, classifying a rejection with `fallback`.
    pub fn into_data(self, fallback: fn(String) -> ChainDbError) -> Result<Value> {
        if self.success {
            Ok(self.data)
        } else {
            let message = if self.message.is_empty() {
                "Unknown error".to_string()
            } else {
                self.message
            };
            Err(ChainDbError::classify_rejection(message, fallback))
        }
    }
}

/// Interpret a payload as a document. `null` reads as an empty document.
pub(crate) fn value_into_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Document::new()),
        other => Err(ChainDbError::Protocol(format!(
            "expected a document object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Interpret a payload as a list of documents, skipping non-object entries.
pub(crate) fn value_into_documents(value: Value) -> Result<Vec<Document>> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                other => {
                    tracing::debug!(kind = json_kind(&other), "skipping non-document history entry");
                    None
                }
            })
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(ChainDbError::Protocol(format!(
            "expected a list of documents, got {}",
            json_kind(&other)
        ))),
    }
}

/// Copy of `doc` without the reserved identifier field.
pub(crate) fn strip_doc_id(doc: &Document) -> Document {
    let mut data = doc.clone();
    data.remove(DOC_ID_FIELD);
    data
}

/// Serialize a typed value into a document.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value).map_err(|e| ChainDbError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(ChainDbError::Serialization(format!(
            "typed document must serialize to an object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Deserialize a document into a typed value, ignoring the reserved field.
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> Result<T> {
    serde_json::from_value(Value::Object(strip_doc_id(doc)))
        .map_err(|e| ChainDbError::Deserialization(e.to_string()))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_id_from_document() {
        let doc = json!({"greeting": "hi", "doc_id": "abc"});
        let doc = doc.as_object().unwrap();
        assert_eq!(DocId::from_document(doc), Some(DocId::new("abc")));

        let empty = json!({"doc_id": ""});
        assert_eq!(DocId::from_document(empty.as_object().unwrap()), None);

        let numeric = json!({"doc_id": 7});
        assert_eq!(DocId::from_document(numeric.as_object().unwrap()), None);
    }

    #[test]
    fn test_envelope_rejection() {
        let resp = ApiResponse::from_value(json!({
            "success": false,
            "message": "Document not found"
        }))
        .unwrap();
        let err = resp.into_data(ChainDbError::Rejected).unwrap_err();
        assert!(matches!(err, ChainDbError::NotFound(_)));
    }

    #[test]
    fn test_envelope_missing_fields() {
        let err = ApiResponse::from_value(json!({"data": 1})).unwrap_err();
        assert!(matches!(err, ChainDbError::Protocol(_)));

        let resp = ApiResponse::from_value(json!({"success": true})).unwrap();
        assert_eq!(resp.into_data(ChainDbError::Rejected).unwrap(), Value::Null);
    }

    #[test]
    fn test_documents_skip_non_objects() {
        let docs = value_into_documents(json!([{"a": 1}, 3, null, {"b": 2}])).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(value_into_documents(json!("nope")).is_err());
    }

    #[test]
    fn test_typed_roundtrip_ignores_doc_id() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        #[serde(deny_unknown_fields)]
        struct Greeting {
            greeting: String,
        }

        let mut doc = to_document(&Greeting {
            greeting: "Hi".into(),
        })
        .unwrap();
        doc.insert(DOC_ID_FIELD.into(), json!("x1"));

        let back: Greeting = from_document(&doc).unwrap();
        assert_eq!(back.greeting, "Hi");
        assert!(to_document(&5u8).is_err());
    }
}
