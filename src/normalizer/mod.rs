//! Result normalizer (verb module)
//!
//! Transforms raw backend rows into uniform result envelopes, and rolls
//! normalized rows up after the fact.

mod result;
mod rollup;
mod value;

pub use result::{
    normalize_analyze, normalize_count, normalize_distinct, normalize_search, AnalyzeResult,
    SearchResult,
};
pub use rollup::{merge_values, others_bucket, page_slice, rollup_by_dimension, OTHERS_FLAG};
pub use value::{document_records, normalize_value, sql_records, Cell, Record, Row};
