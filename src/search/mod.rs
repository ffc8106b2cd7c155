//! Title search over a record collection.
//!
//! - **[`tantivy`]**: in-memory index schema and construction.
//! - **[`query`]**: fuzzy + prefix disjunction and hit-to-record resolution.

pub mod query;
pub mod tantivy;

pub use query::SearchEngine;
