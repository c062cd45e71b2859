//! Query types (noun module)
//!
//! The loose wire request and the typed queries it validates into.

mod request;
mod types;

pub use request::{ConditionRequest, FieldRequest, PageRequest, QueryRequest, SortRequest, UnwindRequest};
pub use types::{
    AnalyzeQuery, ArithmeticOp, ColumnRef, Comparison, Condition, ConditionValue, DatePrecision,
    DateRange, FieldOperator, FieldSpec, Granularity, Literal, Operator, Page, RelativeTime,
    SearchQuery, SelectExpr, SortKey, TimeUnit,
};
