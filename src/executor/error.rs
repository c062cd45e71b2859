//! Execution error types

use thiserror::Error;

use crate::emitter::EmitError;
use crate::planner::PlanError;
use crate::validator::QueryError;

/// A failure reported by a backend collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// Connectivity, throttling, or other conditions worth retrying
    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("query syntax rejected: {0}")]
    Syntax(String),

    /// Unknown table, column, or type mismatch
    #[error("query semantics rejected: {0}")]
    Semantic(String),

    #[error("backend failure: {0}")]
    Other(String),
}

impl ExecError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecError::Transient(_))
    }
}

/// Errors surfaced by the analytics service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("service is not open")]
    NotOpen,

    #[error("no {0} configured")]
    Unconfigured(&'static str),
}
