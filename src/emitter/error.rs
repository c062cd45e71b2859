//! Emitter errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    /// A name that cannot be used as a SQL identifier
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),
    /// Expression the target cannot express
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),
    /// Invalid plan structure
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
}
