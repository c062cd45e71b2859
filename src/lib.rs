//! billquery - Compile cost-analytics queries for a document store and a SQL warehouse
//!
//! This library provides:
//! - Query request types and validation into strongly-typed queries
//! - Planning into one backend-agnostic stage list
//! - Aggregation pipeline emission for the document store
//! - CTE SQL emission for the warehouse
//! - Result normalization and post-aggregation rollups
//! - An execution service over injected backend clients
//!
//! # Architecture
//!
//! **Noun modules** (data structures):
//! - `query/` - request types (QueryRequest) and typed queries (AnalyzeQuery, SearchQuery)
//! - `plan/` - the stage list (AnalyzePlan, SearchPlan, Predicate)
//! - `config/` - warehouse layout and retry settings
//!
//! **Verb modules** (transformations):
//! - `parser/` - JSON/YAML → QueryRequest, Settings
//! - `validator/` - QueryRequest → AnalyzeQuery / SearchQuery
//! - `planner/` - typed query → AnalyzePlan / SearchPlan
//! - `emitter/` - plan → pipeline stages or SQL text
//! - `normalizer/` - backend rows → AnalyzeResult / SearchResult
//! - `executor/` - runs the whole path against injected clients
//!
//! # Example
//!
//! ```ignore
//! use billquery::{parser, validate_analyze, plan_analyze, emit_analyze_sql, Settings};
//!
//! let settings = Settings::default();
//! let request = parser::parse_request_str(r#"{"granularity": "MONTHLY", ...}"#)?;
//! let query = validate_analyze(&request, &settings.warehouse.limits)?;
//! let plan = plan_analyze(&query)?;
//! let sql = emit_analyze_sql(&plan, &settings.warehouse)?;
//! ```

pub mod config;
pub mod query;
pub mod validator;
pub mod plan;
pub mod planner;
pub mod emitter;
pub mod normalizer;
pub mod executor;
pub mod parser;
pub mod error;

// Re-export commonly used types
pub use config::{RangeLimits, RetryConfig, Settings, WarehouseConfig};
pub use query::{AnalyzeQuery, Granularity, Operator, QueryRequest, SearchQuery};
pub use validator::{validate_analyze, validate_search, QueryError};
pub use plan::{AnalyzePlan, Predicate, SearchPlan, Stage};
pub use planner::{plan_analyze, plan_search, sanitize_alias, PlanError};
pub use emitter::{emit_analyze_sql, emit_pipeline, emit_search_sql, quote_literal, EmitError};
pub use normalizer::{
    normalize_analyze, normalize_search, others_bucket, rollup_by_dimension, AnalyzeResult, Cell,
    Record, SearchResult,
};
pub use executor::{
    AnalyticsService, DirectoryService, DocumentClient, ExecError, RetryPolicy, SearchOutcome,
    ServiceError, SqlClient,
};
pub use error::ParseError;
