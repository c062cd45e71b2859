//! Query executor (verb module)
//!
//! Runs compiled plans through injected backend clients, retrying transient
//! failures, and normalizes what comes back.

mod client;
mod error;
mod retry;
mod service;

pub use client::{DirectoryService, DocumentBatch, DocumentClient, ProjectGroup, SqlClient};
pub use error::{ExecError, ServiceError};
pub use retry::RetryPolicy;
pub use service::{AnalyticsService, SearchOutcome, PROJECT_GROUP_ID};
