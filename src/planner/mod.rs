//! Query planner (verb module)
//!
//! Transforms a validated AnalyzeQuery or SearchQuery into the stage list
//! both emitters consume.

mod alias;
mod build;
mod error;
mod predicate;
mod search;

pub use alias::{sanitize_alias, AliasRegistry, Registration};
pub use build::{plan_analyze, DATE_KEY};
pub use error::PlanError;
pub use predicate::{build_predicate, lower_condition};
pub use search::plan_search;
