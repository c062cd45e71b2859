//! Plan emitters (verb module)
//!
//! Two independent renderings of the same plan: aggregation pipeline stages
//! for the document store and CTE SQL for the warehouse.

mod error;
mod pipeline;
mod sql;

pub use error::EmitError;
pub use pipeline::emit_pipeline;
pub use sql::{
    emit_analyze_sql, emit_search_sql, quote_literal, DISTINCT_VALUES, TOTAL_COUNT,
    UNWOUND_ALIAS, WINDOW_TOTAL_COUNT,
};
