//! Validation errors

use thiserror::Error;

/// Errors raised while turning a request into a typed query
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// A required parameter is absent or empty
    #[error("Required parameter: {0}")]
    RequiredParameter(String),
    /// A parameter is present but unusable
    #[error("Invalid parameter '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },
    /// The date window is inverted or too wide for the granularity
    #[error("Invalid date range {start} ~ {end}: {reason}")]
    InvalidDateRange {
        start: String,
        end: String,
        reason: String,
    },
    /// Unknown filter or aggregation operator
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
}

impl QueryError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::InvalidParameter {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
