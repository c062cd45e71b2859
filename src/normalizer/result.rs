//! Uniform result envelopes

use serde::Serialize;
use serde_json::Value;

use super::value::Record;
use crate::emitter::{DISTINCT_VALUES, TOTAL_COUNT, UNWOUND_ALIAS, WINDOW_TOTAL_COUNT};
use crate::plan::{AnalyzePlan, OutputColumn, SearchPlan};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyzeResult {
    pub results: Vec<Record>,
    /// More rows exist past the requested page
    pub more: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub results: Vec<Record>,
    pub total_count: u64,
}

/// Trim the lookahead row and restore display names
pub fn normalize_analyze(mut rows: Vec<Record>, plan: &AnalyzePlan) -> AnalyzeResult {
    let more = match plan.page_limit {
        Some(limit) => {
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            let more = rows.len() > limit;
            rows.truncate(limit);
            more
        }
        None => false,
    };
    let arrays: &[String] = plan.facet().map(|f| f.arrays.as_slice()).unwrap_or(&[]);
    let results = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .filter(|(key, _)| key != "_id")
                .map(|(key, value)| {
                    let value = if arrays.contains(&key) {
                        rename_facet_tuples(value, &plan.outputs)
                    } else {
                        value
                    };
                    (display_name(&plan.outputs, &key), value)
                })
                .collect()
        })
        .collect();
    AnalyzeResult { results, more }
}

/// Pull the windowed total off the rows and drop backend-only columns
pub fn normalize_search(rows: Vec<Record>, plan: &SearchPlan) -> SearchResult {
    let total_count = rows
        .first()
        .and_then(|row| row.get(WINDOW_TOTAL_COUNT))
        .and_then(count_value)
        .unwrap_or(0);
    let results = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .filter(|(key, _)| key != WINDOW_TOTAL_COUNT && key != UNWOUND_ALIAS)
                .map(|(key, value)| (display_name(&plan.outputs, &key), value))
                .collect()
        })
        .collect();
    SearchResult {
        results,
        total_count,
    }
}

/// Row count of a count-only search
pub fn normalize_count(rows: &[Record]) -> u64 {
    rows.first()
        .and_then(|row| row.get(TOTAL_COUNT))
        .and_then(count_value)
        .unwrap_or(0)
}

/// Flatten single-column distinct rows into their values
pub fn normalize_distinct(rows: Vec<Record>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|mut row| {
            if row.len() == 1 {
                row.into_iter().next().map(|(_, v)| v)
            } else {
                row.remove(DISTINCT_VALUES)
            }
        })
        .collect()
}

fn display_name(outputs: &[OutputColumn], alias: &str) -> String {
    outputs
        .iter()
        .find(|o| o.alias == alias)
        .map(|o| o.name.clone())
        .unwrap_or_else(|| alias.to_string())
}

fn rename_facet_tuples(value: Value, outputs: &[OutputColumn]) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(tuple) => Value::Object(
                        tuple
                            .into_iter()
                            .map(|(k, v)| (display_name(outputs, &k), v))
                            .collect(),
                    ),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn count_value(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}
