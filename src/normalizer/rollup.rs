//! Post-aggregation rollups over normalized records
//!
//! These work on either backend's output. Values are merged by shape: two
//! numbers add up, two objects (date → value trend maps) merge per key.

use std::collections::HashMap;

use serde_json::{Number, Value};
use tracing::debug;

use super::result::AnalyzeResult;
use super::value::Record;
use crate::query::Page;

/// Flag set on the synthetic row folded from everything past a top-N cut
pub const OTHERS_FLAG: &str = "is_others";

/// Re-aggregate rows under a coarser dimension
///
/// Each row's `dimension` value is looked up in `mapping` and replaced by
/// the mapped id under `target`; rows without a mapping are dropped. Rows
/// that then agree on every non-value column are merged.
pub fn rollup_by_dimension(
    rows: &[Record],
    dimension: &str,
    target: &str,
    mapping: &HashMap<String, String>,
    value_fields: &[String],
) -> Vec<Record> {
    let mut merged: Vec<Record> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let Some(mapped) = row.get(dimension).and_then(key_text).and_then(|k| mapping.get(&k)) else {
            debug!(dimension, "dropping row without a dimension mapping");
            continue;
        };

        let mut out = Record::new();
        out.insert(target.to_string(), Value::String(mapped.clone()));
        for (key, value) in row {
            if key != dimension && key != target {
                out.insert(key.clone(), value.clone());
            }
        }

        let group_key = group_key(&out, value_fields);
        match index.get(&group_key) {
            Some(&i) => {
                for field in value_fields {
                    if let Some(value) = out.get(field) {
                        let current = merged[i].get(field).cloned().unwrap_or(Value::Null);
                        merged[i].insert(field.clone(), merge_values(current, value));
                    }
                }
            }
            None => {
                index.insert(group_key, merged.len());
                merged.push(out);
            }
        }
    }
    merged
}

/// Keep the first `limit` rows and fold the rest into one "others" row
pub fn others_bucket(mut rows: Vec<Record>, limit: usize, value_fields: &[String]) -> Vec<Record> {
    if rows.len() <= limit {
        return rows;
    }
    let rest = rows.split_off(limit);

    let mut others = Record::new();
    others.insert(OTHERS_FLAG.to_string(), Value::Bool(true));
    for field in value_fields {
        let total = rest
            .iter()
            .filter_map(|row| row.get(field))
            .fold(Value::Null, |acc, value| merge_values(acc, value));
        others.insert(field.clone(), total);
    }
    rows.push(others);
    rows
}

/// Page an already complete result set in memory
pub fn page_slice(rows: Vec<Record>, page: Option<Page>) -> AnalyzeResult {
    let Some(page) = page else {
        return AnalyzeResult {
            results: rows,
            more: false,
        };
    };
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
    let more = rows.len() > offset.saturating_add(limit);
    AnalyzeResult {
        results: rows.into_iter().skip(offset).take(limit).collect(),
        more,
    }
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn group_key(row: &Record, value_fields: &[String]) -> String {
    let mut parts: Vec<(&String, String)> = row
        .iter()
        .filter(|(k, _)| !value_fields.contains(*k))
        .map(|(k, v)| (k, v.to_string()))
        .collect();
    parts.sort();
    parts
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// Add numbers, merge objects per key; otherwise keep what is there
pub fn merge_values(current: Value, incoming: &Value) -> Value {
    match (current, incoming) {
        (Value::Null, other) => other.clone(),
        (Value::Number(a), Value::Number(b)) => add_numbers(&a, b),
        (Value::Object(mut a), Value::Object(b)) => {
            for (key, value) in b {
                let existing = a.get(key).cloned().unwrap_or(Value::Null);
                a.insert(key.clone(), merge_values(existing, value));
            }
            Value::Object(a)
        }
        (current, _) => current,
    }
}

fn add_numbers(a: &Number, b: &Number) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Value::from(sum);
        }
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).map(Value::Number).unwrap_or(Value::Null)
}
