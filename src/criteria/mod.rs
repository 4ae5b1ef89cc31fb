//! Criteria engine for querying table history.
//!
//! Two criteria forms are supported:
//! - Exact: a field -> value map, every field must be deep-equal
//! - Advanced: a list of typed comparisons combined with AND
//!
//! # Example
//!
//! ```ignore
//! let query = Query::new(vec![
//!     Condition::gt("age", 18),
//!     Condition::contains("name", "John"),
//! ])
//! .limit(10);
//!
//! let adults = criteria::evaluate(&history, &query.criteria, query.limit, query.reverse);
//! ```

mod engine;
mod types;

pub use engine::{compare, evaluate, matches, retain_matching, values_equal};
pub use types::{Condition, Criteria, Operator, Query, DEFAULT_LIMIT};
