//! Planner errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// No group keys and no aggregate fields
    #[error("Query must have at least one group key or field")]
    EmptyQuery,
    /// Invalid query configuration
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}
