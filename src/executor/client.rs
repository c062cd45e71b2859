//! Backend collaborator contracts
//!
//! The crate never talks to a database itself. Callers inject
//! implementations of these traits into the service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ExecError;
use crate::normalizer::Row;

/// Rows returned by one aggregation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentBatch {
    pub rows: Vec<Value>,
    pub total_count: u64,
}

/// Document store able to run an aggregation pipeline
pub trait DocumentClient: Send + Sync {
    fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<DocumentBatch, ExecError>;

    fn open(&self) -> Result<(), ExecError> {
        Ok(())
    }

    fn close(&self) {}
}

/// Warehouse able to run SQL text
pub trait SqlClient: Send + Sync {
    fn query(&self, sql: &str) -> Result<Vec<Row>, ExecError>;

    fn open(&self) -> Result<(), ExecError> {
        Ok(())
    }

    fn close(&self) {}
}

/// One project → project group assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGroup {
    pub project_id: String,
    pub project_group_id: String,
}

/// Source of the project hierarchy used by rollups
pub trait DirectoryService: Send + Sync {
    fn project_groups(&self) -> Result<Vec<ProjectGroup>, ExecError>;
}
