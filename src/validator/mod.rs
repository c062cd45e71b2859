//! Query validator (verb module)
//!
//! Transforms a loose QueryRequest into an AnalyzeQuery or SearchQuery.

mod error;
mod validate;

pub use error::QueryError;
pub use validate::{parse_relative_time, validate_analyze, validate_search, TOTAL_PREFIX};
