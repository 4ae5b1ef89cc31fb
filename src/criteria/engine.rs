//! Criteria evaluation.
//!
//! Pure functions over documents. Histories are heterogeneous, so a field
//! that is missing or has an unexpected type makes its condition false
//! instead of raising an error.

use super::types::{Condition, Criteria, Operator};
use crate::types::Document;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Whether `doc` satisfies `criteria`.
pub fn matches(doc: &Document, criteria: &Criteria) -> bool {
    match criteria {
        Criteria::Exact(expected) => expected
            .iter()
            .all(|(field, value)| doc.get(field).is_some_and(|actual| values_equal(actual, value))),
        Criteria::Advanced(conditions) => conditions.iter().all(|c| condition_holds(doc, c)),
    }
}

/// Filter and order documents given in server order (most recent first).
///
/// `reverse = true` keeps that order, `reverse = false` yields oldest first.
/// `limit` counts matches, so it is applied after filtering.
pub fn evaluate(docs: &[Document], criteria: &Criteria, limit: usize, reverse: bool) -> Vec<Document> {
    if reverse {
        collect_matching(docs.iter(), criteria, limit)
    } else {
        collect_matching(docs.iter().rev(), criteria, limit)
    }
}

/// Filter documents keeping whatever order they arrive in.
pub fn retain_matching(docs: Vec<Document>, criteria: &Criteria, limit: usize) -> Vec<Document> {
    docs.into_iter()
        .filter(|doc| matches(doc, criteria))
        .take(limit)
        .collect()
}

fn collect_matching<'a>(
    docs: impl Iterator<Item = &'a Document>,
    criteria: &Criteria,
    limit: usize,
) -> Vec<Document> {
    docs.filter(|doc| matches(doc, criteria))
        .take(limit)
        .cloned()
        .collect()
}

fn condition_holds(doc: &Document, condition: &Condition) -> bool {
    let Some(actual) = doc.get(&condition.field) else {
        return false;
    };
    let expected = &condition.value;

    match condition.operator {
        Operator::Eq => values_equal(actual, expected),
        Operator::Ne => !values_equal(actual, expected),
        Operator::Gt => compare(actual, expected) == Some(Ordering::Greater),
        Operator::Ge => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Lt => compare(actual, expected) == Some(Ordering::Less),
        Operator::Le => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        Operator::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
            _ => false,
        },
        Operator::StartsWith => match (actual, expected) {
            (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
        Operator::EndsWith => match (actual, expected) {
            (Value::String(s), Value::String(suffix)) => s.ends_with(suffix.as_str()),
            _ => false,
        },
    }
}

/// Deep structural equality. Type sensitive (`1 != "1"`), but numbers
/// compare by value so `1` and `1.0` are equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Ordering for numbers (by value) and strings (lexical); `None` otherwise.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return Some(a.cmp(&b));
    }
    x.as_f64()?.partial_cmp(&y.as_f64()?)
}
