//! Backend values → JSON
//!
//! Warehouse cursors hand back typed cells and the document store hands
//! back extended JSON. Both end up as plain JSON records with every
//! arbitrary-precision decimal turned into a float.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

/// One output row, column name → value
pub type Record = Map<String, Value>;

/// A value read from a warehouse cursor
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Cell>),
    /// Maps and structs, in column order
    Map(Vec<(String, Cell)>),
}

/// A warehouse row in column order
pub type Row = Vec<(String, Cell)>;

impl Cell {
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => Value::from(*i),
            Cell::Float(f) => float(*f),
            Cell::Decimal(d) => decimal(d),
            Cell::Text(s) => Value::String(s.clone()),
            // Bytes stay one opaque string value
            Cell::Bytes(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            Cell::List(items) => Value::Array(items.iter().map(Cell::to_json).collect()),
            Cell::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn decimal(d: &Decimal) -> Value {
    d.to_f64().map(float).unwrap_or(Value::Null)
}

/// Convert warehouse rows to records
pub fn sql_records(rows: Vec<Row>) -> Vec<Record> {
    rows.into_iter()
        .map(|row| row.into_iter().map(|(k, v)| (k, v.to_json())).collect())
        .collect()
}

/// Convert document-store results to records, dropping non-object rows
pub fn document_records(rows: Vec<Value>) -> Vec<Record> {
    rows.into_iter()
        .filter_map(|row| match normalize_value(row) {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect()
}

/// Replace `{"$numberDecimal": "..."}` wrappers with floats, recursively
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(text)) = map.get("$numberDecimal") {
                    return match Decimal::from_str(text) {
                        Ok(d) => decimal(&d),
                        Err(_) => Value::String(text.clone()),
                    };
                }
            }
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, normalize_value(v)))
                    .collect(),
            )
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_decimals() {
        let cell = Cell::Map(vec![
            ("cost".into(), Cell::Decimal(Decimal::new(1250, 2))),
            (
                "items".into(),
                Cell::List(vec![Cell::Map(vec![("value".into(), Cell::Decimal(Decimal::new(5, 1)))])]),
            ),
            ("name".into(), Cell::Text("12.5".into())),
            ("raw".into(), Cell::Bytes(b"abc".to_vec())),
        ]);
        assert_eq!(
            cell.to_json(),
            json!({"cost": 12.5, "items": [{"value": 0.5}], "name": "12.5", "raw": "abc"})
        );
    }

    #[test]
    fn test_document_decimals() {
        let rows = vec![json!({"cost": {"$numberDecimal": "3.25"}, "facet": [{"value": {"$numberDecimal": "1"}}]}), json!(3)];
        let records = document_records(rows);
        assert_eq!(records.len(), 1);
        assert_eq!(Value::Object(records[0].clone()), json!({"cost": 3.25, "facet": [{"value": 1.0}]}));
    }

    #[test]
    fn test_sql_records_keep_column_order() {
        let rows = vec![vec![("b".to_string(), Cell::Int(1)), ("a".to_string(), Cell::Null)]];
        let records = sql_records(rows);
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
