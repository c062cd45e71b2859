//! Integration tests for search requests

mod common;

use common::{clause_value, compile_search, load_fixture, request};
use serde_json::json;

#[test]
fn test_list_fixture() {
    let sql = compile_search(&load_fixture("search_list.yaml")).expect("Search should compile");

    assert!(sql.starts_with(
        "SELECT `provider` AS `provider`, CAST(`tags`['Name'] AS STRING) AS `tags_Name`, \
         `cost` AS `cost`, COUNT(*) OVER () AS `__total_count`\nFROM `cost`\n"
    ));
    assert!(sql.contains("`region_code` NOT IN ('us-east-1')"));
    assert!(sql.contains("CURRENT_TIMESTAMP()"));
    assert!(sql.contains("ADD_MONTHS(CURRENT_DATE(), -1)"));
    assert!(sql.contains("ORDER BY `cost` DESC"));
    assert_eq!(clause_value(&sql, "LIMIT"), Some(50));
    assert_eq!(clause_value(&sql, "OFFSET"), Some(50));
}

#[test]
fn test_date_filter_replaces_default_window() {
    let sql = compile_search(&request(json!({
        "filter": [{"key": "billed_date", "operator": "gte", "value": "2024-03-01"}]
    })))
    .unwrap();
    assert!(!sql.contains("ADD_MONTHS"));
    assert!(sql.contains("`billed_partition` >= '2024-03'"));
    assert!(sql.starts_with("SELECT *, COUNT(*) OVER () AS `__total_count`"));
}

#[test]
fn test_minimal_projection() {
    let sql = compile_search(&request(json!({"minimal": true}))).unwrap();
    let select = sql.lines().next().unwrap();
    for column in ["`cost_id`", "`provider`", "`usage_type`", "AS `billed_date`"] {
        assert!(select.contains(column), "missing {}", column);
    }
}

#[test]
fn test_only_wins_over_minimal() {
    let sql = compile_search(&request(json!({"minimal": true, "only": ["product"]}))).unwrap();
    assert!(sql.starts_with("SELECT `product` AS `product`, COUNT(*) OVER ()"));
}

#[test]
fn test_count_wins_over_distinct() {
    let sql = compile_search(&request(json!({"count_only": true, "distinct": "provider"}))).unwrap();
    assert!(sql.starts_with("SELECT COUNT(*) AS `total_count`"));
}

#[test]
fn test_computed_columns() {
    let sql = compile_search(&request(json!({
        "only": ["cost"],
        "select": {
            "cost per unit": {"operator": "divide", "fields": ["cost", "data.usage_amount"]},
            "resource count": {"operator": "size", "key": "resources"}
        }
    })))
    .unwrap();
    assert!(sql.contains(
        "(`cost` / NULLIF(COALESCE(CAST(`data`['usage_amount'] AS DECIMAL(38, 10)), 0), 0)) AS `cost_per_unit`"
    ));
    assert!(sql.contains("CASE WHEN `resources` IS NULL THEN 0 ELSE SIZE(`resources`) END AS `resource_count`"));
}

#[test]
fn test_quotes_are_escaped() {
    let sql = compile_search(&request(json!({
        "filter": [{"key": "tags.Name", "value": "it's \\ here"}]
    })))
    .unwrap();
    assert!(sql.contains(r"CAST(`tags`['Name'] AS STRING) = 'it''s \\ here'"));
}

#[test]
fn test_colliding_aliases_keep_first_column() {
    let sql = compile_search(&request(json!({"only": ["tags.Name", "tags_Name"]}))).unwrap();
    let select = sql.lines().next().unwrap();
    assert_eq!(select.matches("AS `tags_Name`").count(), 1);
    assert!(select.contains("CAST(`tags`['Name'] AS STRING) AS `tags_Name`"));
}
