//! Analytics service
//!
//! Owns the injected backend clients and runs the full
//! validate → plan → emit → execute → normalize path for one request.
//! Clients are opened and closed with the service, never on demand.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::client::{DirectoryService, DocumentClient, SqlClient};
use super::error::ServiceError;
use super::retry::RetryPolicy;
use crate::config::Settings;
use crate::emitter::{emit_analyze_sql, emit_pipeline, emit_search_sql};
use crate::normalizer::{
    document_records, normalize_analyze, normalize_count, normalize_distinct, normalize_search,
    rollup_by_dimension, sql_records, AnalyzeResult, Record, Row, SearchResult,
};
use crate::plan::SearchMode;
use crate::planner::{plan_analyze, plan_search};
use crate::query::QueryRequest;
use crate::validator::{validate_analyze, validate_search};

/// Column rollups write the mapped project group into
pub const PROJECT_GROUP_ID: &str = "project_group_id";

/// What a search returns, by mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    Count { total_count: u64 },
    Distinct(Vec<Value>),
    Rows(SearchResult),
}

pub struct AnalyticsService {
    settings: Settings,
    retry: RetryPolicy,
    documents: Option<Box<dyn DocumentClient>>,
    sql: Option<Box<dyn SqlClient>>,
    directory: Option<Box<dyn DirectoryService>>,
    open: bool,
}

impl AnalyticsService {
    pub fn new(settings: Settings) -> Self {
        let retry = RetryPolicy::from_config(&settings.retry);
        Self {
            settings,
            retry,
            documents: None,
            sql: None,
            directory: None,
            open: false,
        }
    }

    pub fn with_documents(mut self, client: Box<dyn DocumentClient>) -> Self {
        self.documents = Some(client);
        self
    }

    pub fn with_sql(mut self, client: Box<dyn SqlClient>) -> Self {
        self.sql = Some(client);
        self
    }

    pub fn with_directory(mut self, directory: Box<dyn DirectoryService>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open every configured client
    ///
    /// Calling `open` on an open service is a no-op.
    pub fn open(&mut self) -> Result<(), ServiceError> {
        if self.open {
            return Ok(());
        }
        if let Some(client) = &self.documents {
            client.open()?;
        }
        if let Some(client) = &self.sql {
            if let Err(err) = client.open() {
                if let Some(documents) = &self.documents {
                    documents.close();
                }
                return Err(err.into());
            }
        }
        self.open = true;
        info!(
            documents = self.documents.is_some(),
            sql = self.sql.is_some(),
            "analytics service opened"
        );
        Ok(())
    }

    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        if let Some(client) = &self.sql {
            client.close();
        }
        if let Some(client) = &self.documents {
            client.close();
        }
        self.open = false;
        info!("analytics service closed");
    }

    fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.open {
            Ok(())
        } else {
            Err(ServiceError::NotOpen)
        }
    }

    /// Run an analyze request against the document store
    pub fn analyze_documents(&self, request: &QueryRequest) -> Result<AnalyzeResult, ServiceError> {
        self.ensure_open()?;
        let client = self
            .documents
            .as_deref()
            .ok_or(ServiceError::Unconfigured("document client"))?;
        let warehouse = &self.settings.warehouse;

        let query = validate_analyze(request, &warehouse.limits)?;
        let plan = plan_analyze(&query)?;
        let pipeline = emit_pipeline(&plan, warehouse)?;
        let batch = self
            .retry
            .run("aggregate", || client.aggregate(&warehouse.table, &pipeline))?;
        debug!(rows = batch.rows.len(), total_count = batch.total_count, "aggregation returned");

        Ok(normalize_analyze(document_records(batch.rows), &plan))
    }

    /// Run an analyze request against the warehouse
    pub fn analyze_sql(&self, request: &QueryRequest) -> Result<AnalyzeResult, ServiceError> {
        self.ensure_open()?;
        let warehouse = &self.settings.warehouse;

        let query = validate_analyze(request, &warehouse.limits)?;
        let plan = plan_analyze(&query)?;
        let sql = emit_analyze_sql(&plan, warehouse)?;
        let rows = self.run_sql(&sql)?;

        Ok(normalize_analyze(sql_records(rows), &plan))
    }

    /// Run a search request against the warehouse
    pub fn search_sql(&self, request: &QueryRequest) -> Result<SearchOutcome, ServiceError> {
        self.ensure_open()?;
        let warehouse = &self.settings.warehouse;

        let query = validate_search(request)?;
        let plan = plan_search(&query, warehouse);
        let sql = emit_search_sql(&plan, warehouse)?;
        let rows = sql_records(self.run_sql(&sql)?);

        Ok(match plan.mode {
            SearchMode::Count => SearchOutcome::Count {
                total_count: normalize_count(&rows),
            },
            SearchMode::Distinct(_) => SearchOutcome::Distinct(normalize_distinct(rows)),
            SearchMode::Rows { .. } => SearchOutcome::Rows(normalize_search(rows, &plan)),
        })
    }

    /// Re-aggregate project rows under their project groups
    ///
    /// `dimension` names the column holding the project id; it is replaced
    /// by `project_group_id`.
    pub fn rollup_by_dimension(
        &self,
        rows: &[Record],
        dimension: &str,
        value_fields: &[String],
    ) -> Result<Vec<Record>, ServiceError> {
        let directory = self
            .directory
            .as_deref()
            .ok_or(ServiceError::Unconfigured("directory service"))?;
        let groups = self.retry.run("project_groups", || directory.project_groups())?;
        let mapping: HashMap<String, String> = groups
            .into_iter()
            .map(|g| (g.project_id, g.project_group_id))
            .collect();
        Ok(rollup_by_dimension(rows, dimension, PROJECT_GROUP_ID, &mapping, value_fields))
    }

    fn run_sql(&self, sql: &str) -> Result<Vec<Row>, ServiceError> {
        let client = self
            .sql
            .as_deref()
            .ok_or(ServiceError::Unconfigured("sql client"))?;
        Ok(self.retry.run("sql", || client.query(sql))?)
    }
}

impl Drop for AnalyticsService {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::executor::client::{DocumentBatch, ProjectGroup};
    use crate::executor::error::ExecError;
    use crate::normalizer::Cell;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeSql {
        seen: Arc<Mutex<Vec<String>>>,
        rows: Vec<Row>,
        transient_failures: AtomicU32,
    }

    impl SqlClient for FakeSql {
        fn query(&self, sql: &str) -> Result<Vec<Row>, ExecError> {
            self.seen.lock().unwrap().push(sql.to_string());
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ExecError::Transient("connection reset".into()));
            }
            Ok(self.rows.clone())
        }
    }

    struct FakeDocuments {
        seen: Arc<Mutex<Vec<(String, usize)>>>,
        rows: Vec<Value>,
    }

    impl DocumentClient for FakeDocuments {
        fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<DocumentBatch, ExecError> {
            self.seen.lock().unwrap().push((collection.to_string(), pipeline.len()));
            Ok(DocumentBatch {
                rows: self.rows.clone(),
                total_count: self.rows.len() as u64,
            })
        }
    }

    struct FakeDirectory;

    impl DirectoryService for FakeDirectory {
        fn project_groups(&self) -> Result<Vec<ProjectGroup>, ExecError> {
            Ok(vec![
                ProjectGroup { project_id: "p1".into(), project_group_id: "g1".into() },
                ProjectGroup { project_id: "p2".into(), project_group_id: "g1".into() },
            ])
        }
    }

    fn settings() -> Settings {
        Settings {
            retry: RetryConfig { max_attempts: 3, base_delay_ms: 0, max_delay_ms: 0 },
            ..Settings::default()
        }
    }

    fn request(value: Value) -> QueryRequest {
        serde_json::from_value(value).unwrap()
    }

    fn analyze_request() -> QueryRequest {
        request(json!({
            "granularity": "ACCUMULATED", "start": "2024-01", "end": "2024-02",
            "group_by": ["provider"],
            "fields": {"cost": {"operator": "sum", "key": "cost"}},
            "page": {"start": 1, "limit": 1}
        }))
    }

    fn cost_row(provider: &str, cost: i64) -> Row {
        vec![
            ("provider".to_string(), Cell::Text(provider.to_string())),
            ("cost".to_string(), Cell::Decimal(rust_decimal::Decimal::new(cost, 0))),
        ]
    }

    #[test]
    fn test_requires_open() {
        let service = AnalyticsService::new(settings()).with_sql(Box::new(FakeSql::default()));
        assert!(matches!(service.analyze_sql(&analyze_request()), Err(ServiceError::NotOpen)));
    }

    #[test]
    fn test_analyze_sql_retries_and_trims() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sql = FakeSql {
            seen: seen.clone(),
            rows: vec![cost_row("aws", 3), cost_row("gcp", 1)],
            transient_failures: AtomicU32::new(1),
        };
        let mut service = AnalyticsService::new(settings()).with_sql(Box::new(sql));
        service.open().unwrap();

        let result = service.analyze_sql(&analyze_request()).unwrap();
        assert!(result.more);
        assert_eq!(Value::Object(result.results[0].clone()), json!({"provider": "aws", "cost": 3.0}));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(seen.lock().unwrap()[0].contains("LIMIT 2"));
    }

    #[test]
    fn test_analyze_documents() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let documents = FakeDocuments {
            seen: seen.clone(),
            rows: vec![json!({"_id": {"provider": "aws"}, "provider": "aws", "cost": {"$numberDecimal": "2.5"}})],
        };
        let mut service = AnalyticsService::new(settings()).with_documents(Box::new(documents));
        service.open().unwrap();

        let result = service.analyze_documents(&analyze_request()).unwrap();
        assert!(!result.more);
        assert_eq!(Value::Object(result.results[0].clone()), json!({"provider": "aws", "cost": 2.5}));
        assert_eq!(seen.lock().unwrap()[0].0, "cost");
    }

    #[test]
    fn test_search_modes() {
        let sql = FakeSql {
            rows: vec![vec![("total_count".to_string(), Cell::Int(12))]],
            ..FakeSql::default()
        };
        let mut service = AnalyticsService::new(settings()).with_sql(Box::new(sql));
        service.open().unwrap();
        let outcome = service.search_sql(&request(json!({"count_only": true}))).unwrap();
        assert_eq!(outcome, SearchOutcome::Count { total_count: 12 });
    }

    #[test]
    fn test_validation_error_surfaces() {
        let mut service = AnalyticsService::new(settings()).with_sql(Box::new(FakeSql::default()));
        service.open().unwrap();
        let err = service.analyze_sql(&request(json!({"granularity": "DAILY"}))).unwrap_err();
        assert!(matches!(err, ServiceError::Query(_)));
    }

    #[test]
    fn test_rollup_through_directory() {
        let service = AnalyticsService::new(settings()).with_directory(Box::new(FakeDirectory));
        let rows: Vec<Record> = [json!({"project_id": "p1", "cost": 1}), json!({"project_id": "p2", "cost": 2})]
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        let out = service.rollup_by_dimension(&rows, "project_id", &["cost".to_string()]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(Value::Object(out[0].clone()), json!({"project_group_id": "g1", "cost": 3}));
    }

    #[test]
    fn test_missing_client() {
        let mut service = AnalyticsService::new(settings());
        service.open().unwrap();
        assert!(matches!(
            service.analyze_documents(&analyze_request()),
            Err(ServiceError::Unconfigured("document client"))
        ));
        assert!(matches!(
            service.analyze_sql(&analyze_request()),
            Err(ServiceError::Unconfigured("sql client"))
        ));
        assert!(matches!(
            service.search_sql(&QueryRequest::default()),
            Err(ServiceError::Unconfigured("sql client"))
        ));
    }
}
