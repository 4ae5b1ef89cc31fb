//! Criteria types for filtering table history.

use crate::types::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Limit applied when a query does not set one.
pub const DEFAULT_LIMIT: usize = 1000;

/// Comparison operator for advanced criteria.
///
/// Serialized with the server's operator names (`Eq`, `Ne`, `Gt`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Substring of a string field, or element of an array field.
    Contains,
    StartsWith,
    EndsWith,
}

impl Operator {
    pub const ALL: [Operator; 9] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Ge,
        Operator::Lt,
        Operator::Le,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "Eq",
            Operator::Ne => "Ne",
            Operator::Gt => "Gt",
            Operator::Ge => "Ge",
            Operator::Lt => "Lt",
            Operator::Le => "Le",
            Operator::Contains => "Contains",
            Operator::StartsWith => "StartsWith",
            Operator::EndsWith => "EndsWith",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed comparison: `document[field] <operator> value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Gt, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Lt, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Contains, value)
    }
}

/// A filter predicate over documents.
///
/// Serializes as the server expects it: an object for exact matching, an
/// array of conditions for advanced matching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Criteria {
    /// Every listed field must exist and be deep-equal.
    Exact(Document),

    /// Every condition must hold (logical AND).
    Advanced(Vec<Condition>),
}

impl Criteria {
    /// Criteria matching every document.
    pub fn any() -> Self {
        Criteria::Exact(Document::new())
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Criteria::Exact(_))
    }
}

impl From<Document> for Criteria {
    fn from(map: Document) -> Self {
        Criteria::Exact(map)
    }
}

impl From<Vec<Condition>> for Criteria {
    fn from(conditions: Vec<Condition>) -> Self {
        Criteria::Advanced(conditions)
    }
}

/// Criteria plus result shaping.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub criteria: Criteria,

    /// Maximum results, applied after filtering.
    /// Default: 1000
    pub limit: usize,

    /// True keeps the server order (most recent first); false yields
    /// oldest first.
    /// Default: true
    pub reverse: bool,
}

impl Query {
    pub fn new(criteria: impl Into<Criteria>) -> Self {
        Self {
            criteria: criteria.into(),
            limit: DEFAULT_LIMIT,
            reverse: true,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Request body for the server's find endpoints.
    pub fn to_body(&self) -> Value {
        serde_json::json!({
            "criteria": self.criteria,
            "limit": self.limit,
            "reverse": self.reverse,
        })
    }
}
