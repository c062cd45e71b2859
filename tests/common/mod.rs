//! Shared test utilities for integration tests
#![allow(dead_code)]

use billquery::{
    emit_analyze_sql, emit_pipeline, emit_search_sql, parser, plan_analyze, plan_search,
    validate_analyze, validate_search, AnalyzePlan, QueryRequest, Settings,
};
use serde_json::Value;

/// Load a request fixture from the tests/test_data directory
pub fn load_fixture(name: &str) -> QueryRequest {
    let path = format!("tests/test_data/{}", name);
    parser::parse_request_file(&path)
        .unwrap_or_else(|e| panic!("Failed to load test data {}: {}", name, e))
}

/// Build a request from inline JSON
pub fn request(value: Value) -> QueryRequest {
    serde_json::from_value(value).unwrap_or_else(|e| panic!("Bad request JSON: {}", e))
}

/// Validate and plan an analyze request with default settings
pub fn analyze_plan(request: &QueryRequest) -> Result<AnalyzePlan, String> {
    let settings = Settings::default();
    let query = validate_analyze(request, &settings.warehouse.limits)
        .map_err(|e| format!("Validation failed: {}", e))?;
    plan_analyze(&query).map_err(|e| format!("Planning failed: {}", e))
}

/// Run the full path: request → warehouse SQL
pub fn compile_sql(request: &QueryRequest) -> Result<String, String> {
    let plan = analyze_plan(request)?;
    emit_analyze_sql(&plan, &Settings::default().warehouse)
        .map_err(|e| format!("Emission failed: {}", e))
}

/// Run the full path: request → aggregation pipeline
pub fn compile_pipeline(request: &QueryRequest) -> Result<Vec<Value>, String> {
    let plan = analyze_plan(request)?;
    emit_pipeline(&plan, &Settings::default().warehouse)
        .map_err(|e| format!("Emission failed: {}", e))
}

/// Run the full path: search request → warehouse SQL
pub fn compile_search(request: &QueryRequest) -> Result<String, String> {
    let warehouse = Settings::default().warehouse;
    let query = validate_search(request).map_err(|e| format!("Validation failed: {}", e))?;
    emit_search_sql(&plan_search(&query, &warehouse), &warehouse)
        .map_err(|e| format!("Emission failed: {}", e))
}

// =============================================================================
// Pipeline Inspection Utilities
// =============================================================================

/// Operator name of each stage, e.g. `$match`
pub fn stage_names(pipeline: &[Value]) -> Vec<String> {
    pipeline
        .iter()
        .filter_map(|stage| stage.as_object())
        .filter_map(|stage| stage.keys().next().cloned())
        .collect()
}

/// Body of the first stage with the given operator
pub fn find_stage<'a>(pipeline: &'a [Value], op: &str) -> Option<&'a Value> {
    pipeline.iter().find_map(|stage| stage.get(op))
}

/// Columns kept by the final `$project`, sorted
pub fn pipeline_output_columns(pipeline: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = pipeline
        .last()
        .and_then(|stage| stage.get("$project"))
        .and_then(Value::as_object)
        .map(|project| project.keys().filter(|k| *k != "_id").cloned().collect())
        .unwrap_or_default();
    columns.sort();
    columns
}

// =============================================================================
// SQL Inspection Utilities
// =============================================================================

/// The outermost SELECT, after any CTEs
pub fn final_select(sql: &str) -> &str {
    sql.rsplit("\n)\n").next().unwrap_or(sql)
}

/// Output column names of the outermost SELECT, sorted
pub fn sql_output_columns(sql: &str) -> Vec<String> {
    let line = final_select(sql).lines().next().unwrap_or("");
    let list = line.trim_start_matches("SELECT ").trim_start_matches("DISTINCT ");
    let mut columns: Vec<String> = split_top_level(list)
        .into_iter()
        .map(|item| {
            let name = match item.rfind(" AS `") {
                Some(pos) => &item[pos + 4..],
                None => item.trim(),
            };
            name.trim_matches('`').to_string()
        })
        .collect();
    columns.sort();
    columns
}

/// Numeric argument of a trailing clause such as `LIMIT`
pub fn clause_value(sql: &str, clause: &str) -> Option<u64> {
    final_select(sql)
        .lines()
        .find_map(|line| line.strip_prefix(clause))
        .and_then(|rest| rest.trim().parse().ok())
}

fn split_top_level(list: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                items.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(list[start..].trim());
    items
}
