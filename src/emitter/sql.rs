//! SQL emitter
//!
//! Renders analyze and search plans as warehouse SQL. Statements are built
//! as an expression tree first (see `ast`), then printed.

mod accessor;
mod analyze;
mod ast;
mod filter;
mod search;

use tracing::debug;

use super::error::EmitError;
use crate::config::WarehouseConfig;
use crate::plan::{AnalyzePlan, SearchPlan, Stage};

pub use accessor::UNWOUND_ALIAS;
pub use ast::quote_literal;
pub use search::{DISTINCT_VALUES, TOTAL_COUNT, WINDOW_TOTAL_COUNT};

/// Emit the CTE query for an analyze plan
pub fn emit_analyze_sql(plan: &AnalyzePlan, config: &WarehouseConfig) -> Result<String, EmitError> {
    let unwind = plan.stages.iter().find_map(|s| match s {
        Stage::Unwind(path) => Some(path),
        _ => None,
    });
    let acc = accessor::Accessors::new(config, unwind);
    let sql = analyze::build_analyze(plan, &acc)?.to_string();
    debug!(bytes = sql.len(), "emitted analyze sql");
    Ok(sql)
}

/// Emit the query for a search plan
pub fn emit_search_sql(plan: &SearchPlan, config: &WarehouseConfig) -> Result<String, EmitError> {
    let acc = accessor::Accessors::new(config, plan.unwind.as_ref());
    let sql = search::build_search(plan, &acc)?.to_string();
    debug!(bytes = sql.len(), "emitted search sql");
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RangeLimits;
    use crate::planner::{plan_analyze, plan_search};
    use crate::query::QueryRequest;
    use crate::validator::{validate_analyze, validate_search};
    use serde_json::json;

    fn analyze(value: serde_json::Value) -> String {
        let request: QueryRequest = serde_json::from_value(value).unwrap();
        let query = validate_analyze(&request, &RangeLimits::default()).unwrap();
        emit_analyze_sql(&plan_analyze(&query).unwrap(), &WarehouseConfig::default()).unwrap()
    }

    fn search(value: serde_json::Value) -> String {
        let request: QueryRequest = serde_json::from_value(value).unwrap();
        let query = validate_search(&request).unwrap();
        emit_search_sql(&plan_search(&query, &WarehouseConfig::default()), &WarehouseConfig::default()).unwrap()
    }

    // -- analyze --------------------------------------------------------------

    #[test]
    fn test_simple_analyze() {
        let sql = analyze(json!({
            "granularity": "MONTHLY",
            "start": "2024-01",
            "end": "2024-03",
            "group_by": ["provider"],
            "fields": {"cost": {"operator": "sum", "key": "cost"}},
            "page": {"start": 1, "limit": 10}
        }));
        assert_eq!(
            sql,
            "WITH `base_query` AS (\n\
             \x20 SELECT SUBSTRING(`billed_at`, 1, 7) AS `date`, `provider` AS `provider`, SUM(`cost`) AS `cost`\n\
             \x20 FROM `cost`\n\
             \x20 WHERE ((SUBSTRING(`billed_at`, 1, 7) >= '2024-01' AND `billed_partition` >= '2024-01') AND (SUBSTRING(`billed_at`, 1, 7) <= '2024-03' AND `billed_partition` <= '2024-03'))\n\
             \x20 GROUP BY ALL\n\
             )\n\
             SELECT `date`, `provider`, `cost`\n\
             FROM `base_query`\n\
             LIMIT 11\n\
             OFFSET 0"
        );
    }

    #[test]
    fn test_keys_only_analyze_is_distinct() {
        let sql = analyze(json!({
            "granularity": "ACCUMULATED",
            "start": "2024-01",
            "end": "2024-02",
            "group_by": ["provider"]
        }));
        assert!(sql.contains("SELECT DISTINCT `provider` AS `provider`"));
        assert!(!sql.contains("GROUP BY ALL"));
    }

    #[test]
    fn test_faceted_analyze() {
        let sql = analyze(json!({
            "granularity": "MONTHLY",
            "start": "2024-01",
            "end": "2024-02",
            "group_by": ["provider", "product"],
            "field_group": ["product"],
            "fields": {
                "cost": {"operator": "sum", "key": "cost"},
                "avg_cost": {"operator": "average", "key": "cost"}
            },
            "sort": [{"key": "cost", "desc": true}],
            "page": {"start": 2, "limit": 5}
        }));
        assert!(sql.contains("`fg_query` AS ("));
        assert!(sql.contains("SUM(`cost`) OVER (PARTITION BY `date`, `provider`) AS `_total_cost`"));
        assert!(sql.contains(
            "CASE WHEN SUM(`__count_avg_cost`) OVER (PARTITION BY `date`, `provider`) = 0 THEN 0 \
             ELSE (SUM(`__sum_avg_cost`) OVER (PARTITION BY `date`, `provider`) / SUM(`__count_avg_cost`) OVER (PARTITION BY `date`, `provider`)) END AS `_total_avg_cost`"
        ));
        assert!(sql.contains("COUNT(`cost`) AS `__count_avg_cost`"));
        assert!(sql.contains("ARRAY_AGG(NAMED_STRUCT('product', `product`, 'value', `cost`)) AS `cost`"));
        assert!(sql.contains("MAX(`_total_cost`) AS `_total_cost`"));
        assert!(sql.ends_with("GROUP BY `date`, `provider`\nORDER BY `_total_cost` DESC\nLIMIT 6\nOFFSET 5"));
        // hidden helpers stay inside the CTEs
        let final_select = sql.rsplit("\n)\n").next().unwrap();
        assert!(!final_select.contains("__sum_avg_cost"));
    }

    #[test]
    fn test_unwind_analyze() {
        let sql = analyze(json!({
            "granularity": "ACCUMULATED",
            "start": "2024-01",
            "end": "2024-02",
            "unwind": "resources",
            "group_by": ["resources.id"],
            "fields": {"cost": {"operator": "sum", "key": "cost"}}
        }));
        assert!(sql.contains("LATERAL VIEW OUTER EXPLODE(`resources`) `_unwind` AS `_unwound`"));
        assert!(sql.contains("CAST(`_unwound`['id'] AS STRING) AS `resources_id`"));
    }

    // -- search ---------------------------------------------------------------

    #[test]
    fn test_count_only_search() {
        let sql = search(json!({"count_only": true, "filter": [{"key": "provider", "value": "aws"}]}));
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS `total_count`\n\
             FROM `cost`\n\
             WHERE (`provider` = 'aws' AND `billed_partition` >= DATE_FORMAT(ADD_MONTHS(CURRENT_DATE(), -1), 'yyyy-MM'))"
        );
    }

    #[test]
    fn test_distinct_search() {
        let sql = search(json!({
            "distinct": "tags.env",
            "filter": [{"key": "billed_month", "value": "2024-01"}],
            "sort": [{"key": "cost"}],
            "page": {"start": 1, "limit": 5}
        }));
        assert!(sql.starts_with("SELECT DISTINCT CAST(`tags`['env'] AS STRING) AS `Values`"));
        assert!(!sql.contains("ORDER BY"));
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("ADD_MONTHS"));
    }

    #[test]
    fn test_rows_search() {
        let sql = search(json!({
            "only": ["provider", "tags.Name"],
            "sort": [{"key": "cost", "desc": true}],
            "page": {"start": 3, "limit": 20}
        }));
        assert!(sql.starts_with(
            "SELECT `provider` AS `provider`, CAST(`tags`['Name'] AS STRING) AS `tags_Name`, COUNT(*) OVER () AS `__total_count`"
        ));
        assert!(sql.ends_with("ORDER BY `cost` DESC\nLIMIT 20\nOFFSET 40"));
    }
}
