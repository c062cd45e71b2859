//! Document-aggregation emitter
//!
//! Renders an analyze plan as aggregation pipeline stages (`$match`,
//! `$unwind`, `$group`, `$project`, `$sort`, `$skip`, `$limit`). Billing
//! date columns are stored fields on the document side.

use serde_json::{json, Map, Value};
use tracing::debug;

use super::error::EmitError;
use crate::config::WarehouseConfig;
use crate::plan::{
    AggregateField, AggregateFunc, AggregateSource, AnalyzePlan, ColumnPath, ComputedExpr,
    FacetStage, GroupKey, GroupStage, KeySource, OrderKey, Predicate, Stage, TotalFunc,
    FACET_VALUE,
};
use crate::query::{ArithmeticOp, Comparison, Literal, RelativeTime, TimeUnit};

const RATIO_SUM_PREFIX: &str = "__num_";
const RATIO_COUNT_PREFIX: &str = "__den_";

/// Emit pipeline stages for an analyze plan
pub fn emit_pipeline(plan: &AnalyzePlan, config: &WarehouseConfig) -> Result<Vec<Value>, EmitError> {
    let emitter = PipelineEmitter { config };
    let mut pipeline = Vec::new();
    for stage in &plan.stages {
        match stage {
            Stage::Unwind(path) => pipeline.push(json!({
                "$unwind": {"path": field_ref(path), "preserveNullAndEmptyArrays": true}
            })),
            Stage::Match(predicate) => pipeline.push(json!({"$match": emitter.filter(predicate)})),
            Stage::Group(group) => pipeline.extend(emitter.group(group)?),
            Stage::Facet(facet) => pipeline.extend(facet_stages(facet)),
            Stage::Sort(keys) => pipeline.push(sort_stage(keys)),
            Stage::Skip(n) => pipeline.push(json!({"$skip": n})),
            Stage::Limit(n) => pipeline.push(json!({"$limit": n})),
            Stage::Project(aliases) => {
                let mut projection = Map::new();
                projection.insert("_id".to_string(), json!(0));
                for alias in aliases {
                    projection.insert(alias.clone(), json!(1));
                }
                pipeline.push(json!({"$project": projection}));
            }
        }
    }
    debug!(stages = pipeline.len(), "emitted pipeline");
    Ok(pipeline)
}

fn field_ref(path: &ColumnPath) -> Value {
    Value::String(format!("${}", path.key()))
}

fn alias_ref(alias: &str) -> Value {
    Value::String(format!("${}", alias))
}

struct PipelineEmitter<'a> {
    config: &'a WarehouseConfig,
}

impl PipelineEmitter<'_> {
    /// Value read used in aggregates and computed columns
    fn value(&self, path: &ColumnPath) -> Value {
        if path.sub.is_some() && self.config.is_numeric_prefix(&path.root) {
            json!({"$ifNull": [field_ref(path), 0]})
        } else {
            field_ref(path)
        }
    }

    // ---- filters ----

    fn filter(&self, predicate: &Predicate) -> Value {
        match predicate {
            Predicate::IsNull(column) => field_query(column, Value::Null),
            Predicate::IsNotNull(column) => field_query(column, json!({"$ne": null})),
            Predicate::Compare { column, op, value } => {
                let value = value.to_json();
                let condition = match op {
                    // SQL `!=` never matches NULL
                    Comparison::NotEq => json!({"$nin": [value, null]}),
                    op => json!({ comparison_operator(*op): value }),
                };
                field_query(column, condition)
            }
            Predicate::Regex { column, pattern } => {
                field_query(column, json!({"$regex": pattern}))
            }
            Predicate::Contains { column, text, negated } => {
                let pattern = json!({"$regex": regex::escape(text), "$options": "i"});
                if *negated {
                    field_query(column, json!({"$not": pattern, "$ne": null}))
                } else {
                    field_query(column, pattern)
                }
            }
            Predicate::InList { column, values, negated } => {
                let mut list: Vec<Value> = values.iter().map(Literal::to_json).collect();
                if *negated {
                    list.push(Value::Null);
                    field_query(column, json!({"$nin": list}))
                } else {
                    field_query(column, json!({"$in": list}))
                }
            }
            Predicate::Datetime { column, op, value } => json!({
                "$expr": { comparison_operator(*op): [
                    {"$toDate": field_ref(column)},
                    {"$toDate": value},
                ]}
            }),
            Predicate::Timediff { column, op, value } => json!({
                "$expr": { comparison_operator(*op): [
                    {"$toDate": field_ref(column)},
                    relative_time(value),
                ]}
            }),
            Predicate::And(parts) => {
                json!({"$and": parts.iter().map(|p| self.filter(p)).collect::<Vec<_>>()})
            }
            Predicate::Or(parts) => {
                json!({"$or": parts.iter().map(|p| self.filter(p)).collect::<Vec<_>>()})
            }
            Predicate::Never => json!({"$expr": false}),
        }
    }

    // ---- grouping ----

    fn group(&self, group: &GroupStage) -> Result<Vec<Value>, EmitError> {
        let mut id = Map::new();
        for key in &group.keys {
            id.insert(key.alias.clone(), self.key(key)?);
        }

        let mut body = Map::new();
        body.insert(
            "_id".to_string(),
            if id.is_empty() { Value::Null } else { Value::Object(id) },
        );
        for field in &group.fields {
            body.insert(field.alias.clone(), self.accumulator(field)?);
        }

        // Lift the keys out of `_id`
        let mut flatten = Map::new();
        flatten.insert("_id".to_string(), json!(0));
        for key in &group.keys {
            flatten.insert(key.alias.clone(), Value::String(format!("$_id.{}", key.alias)));
        }
        for field in &group.fields {
            flatten.insert(field.alias.clone(), json!(1));
        }

        Ok(vec![json!({"$group": body}), json!({"$project": flatten})])
    }

    fn key(&self, key: &GroupKey) -> Result<Value, EmitError> {
        match &key.source {
            KeySource::Column(column) => Ok(self.value(column)),
            KeySource::DateBucket(precision) => Ok(Value::String(format!("${}", precision.column()))),
            KeySource::Computed(expr) => self.computed(expr),
        }
    }

    fn accumulator(&self, field: &AggregateField) -> Result<Value, EmitError> {
        let input = match &field.source {
            AggregateSource::Rows if field.func == AggregateFunc::Count => {
                return Ok(json!({"$sum": 1}));
            }
            AggregateSource::Rows => {
                return Err(EmitError::InvalidPlan(format!(
                    "aggregate '{}' needs an input column",
                    field.alias
                )));
            }
            AggregateSource::Column(column) => self.value(column),
            AggregateSource::Tuple(parts) => Value::Object(
                parts
                    .iter()
                    .map(|(name, column)| (name.clone(), self.value(column)))
                    .collect(),
            ),
        };
        Ok(match field.func {
            AggregateFunc::Sum => json!({"$sum": input}),
            AggregateFunc::Average => json!({"$avg": input}),
            AggregateFunc::Max => json!({"$max": input}),
            AggregateFunc::Min => json!({"$min": input}),
            // Non-null values only, like SQL COUNT(column)
            AggregateFunc::Count => json!({
                "$sum": {"$cond": [{"$eq": [{"$ifNull": [input, null]}, null]}, 0, 1]}
            }),
            AggregateFunc::Push => json!({"$push": input}),
            AggregateFunc::AddToSet => json!({"$addToSet": input}),
        })
    }

    fn computed(&self, expr: &ComputedExpr) -> Result<Value, EmitError> {
        match expr {
            ComputedExpr::Column(column) => Ok(self.value(column)),
            ComputedExpr::Literal(value) => Ok(json!({"$literal": value.to_json()})),
            ComputedExpr::Size(column) => Ok(json!({"$size": {"$ifNull": [field_ref(column), []]}})),
            ComputedExpr::Arithmetic { op, operands } => {
                let mut parts = operands.iter().map(|o| self.computed(o));
                let first = parts.next().ok_or_else(|| {
                    EmitError::UnsupportedExpression("arithmetic without operands".to_string())
                })??;
                parts.try_fold(first, |left, right| {
                    let right = right?;
                    Ok(match op {
                        ArithmeticOp::Add => json!({"$add": [left, right]}),
                        ArithmeticOp::Subtract => json!({"$subtract": [left, right]}),
                        ArithmeticOp::Multiply => json!({"$multiply": [left, right]}),
                        ArithmeticOp::Divide => json!({
                            "$cond": [{"$eq": [right.clone(), 0]}, null, {"$divide": [left, right]}]
                        }),
                    })
                })
            }
        }
    }
}

fn field_query(column: &ColumnPath, condition: Value) -> Value {
    let mut query = Map::new();
    query.insert(column.key(), condition);
    Value::Object(query)
}

fn comparison_operator(op: Comparison) -> &'static str {
    match op {
        Comparison::Eq => "$eq",
        Comparison::NotEq => "$ne",
        Comparison::Lt => "$lt",
        Comparison::Lte => "$lte",
        Comparison::Gt => "$gt",
        Comparison::Gte => "$gte",
    }
}

fn relative_time(value: &RelativeTime) -> Value {
    let anchor = if value.day_start {
        json!({"$dateTrunc": {"date": "$$NOW", "unit": "day"}})
    } else {
        json!("$$NOW")
    };
    match value.offset {
        None => anchor,
        Some((amount, unit)) => json!({
            "$dateAdd": {"startDate": anchor, "unit": time_unit(unit), "amount": amount}
        }),
    }
}

fn time_unit(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Second => "second",
        TimeUnit::Minute => "minute",
        TimeUnit::Hour => "hour",
        TimeUnit::Day => "day",
        TimeUnit::Week => "week",
    }
}

// ---- facets ----

fn facet_stages(facet: &FacetStage) -> Vec<Value> {
    let mut id = Map::new();
    for key in &facet.partition_keys {
        id.insert(key.clone(), alias_ref(key));
    }

    let mut body = Map::new();
    body.insert(
        "_id".to_string(),
        if id.is_empty() { Value::Null } else { Value::Object(id) },
    );
    let mut project = Map::new();
    project.insert("_id".to_string(), json!(0));
    for key in &facet.partition_keys {
        project.insert(key.clone(), Value::String(format!("$_id.{}", key)));
    }

    for total in &facet.totals {
        match &total.func {
            TotalFunc::Sum(alias) => {
                body.insert(total.alias.clone(), json!({"$sum": alias_ref(alias)}));
                project.insert(total.alias.clone(), json!(1));
            }
            TotalFunc::Min(alias) => {
                body.insert(total.alias.clone(), json!({"$min": alias_ref(alias)}));
                project.insert(total.alias.clone(), json!(1));
            }
            TotalFunc::Max(alias) => {
                body.insert(total.alias.clone(), json!({"$max": alias_ref(alias)}));
                project.insert(total.alias.clone(), json!(1));
            }
            TotalFunc::Ratio { sum, count } => {
                let numerator = format!("{}{}", RATIO_SUM_PREFIX, total.alias);
                let denominator = format!("{}{}", RATIO_COUNT_PREFIX, total.alias);
                body.insert(numerator.clone(), json!({"$sum": alias_ref(sum)}));
                body.insert(denominator.clone(), json!({"$sum": alias_ref(count)}));
                project.insert(
                    total.alias.clone(),
                    json!({"$cond": [
                        {"$eq": [alias_ref(&denominator), 0]},
                        0,
                        {"$divide": [alias_ref(&numerator), alias_ref(&denominator)]},
                    ]}),
                );
            }
        }
    }

    for array in &facet.arrays {
        let mut tuple = Map::new();
        for key in &facet.facet_keys {
            tuple.insert(key.clone(), alias_ref(key));
        }
        tuple.insert(FACET_VALUE.to_string(), alias_ref(array));
        body.insert(array.clone(), json!({"$push": tuple}));
        project.insert(array.clone(), json!(1));
    }

    vec![json!({"$group": body}), json!({"$project": project})]
}

fn sort_stage(keys: &[OrderKey]) -> Value {
    let mut sort = Map::new();
    for key in keys {
        sort.insert(key.alias.clone(), json!(if key.desc { -1 } else { 1 }));
    }
    json!({"$sort": sort})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RangeLimits;
    use crate::planner::plan_analyze;
    use crate::query::QueryRequest;
    use crate::validator::validate_analyze;

    fn pipeline(value: Value) -> Vec<Value> {
        let request: QueryRequest = serde_json::from_value(value).unwrap();
        let query = validate_analyze(&request, &RangeLimits::default()).unwrap();
        emit_pipeline(&plan_analyze(&query).unwrap(), &WarehouseConfig::default()).unwrap()
    }

    #[test]
    fn test_simple_pipeline() {
        let stages = pipeline(json!({
            "granularity": "MONTHLY",
            "start": "2024-01",
            "end": "2024-03",
            "group_by": ["provider"],
            "fields": {
                "cost": {"operator": "sum", "key": "cost"},
                "rows": {"operator": "count"}
            },
            "sort": [{"key": "cost", "desc": true}],
            "page": {"start": 2, "limit": 10}
        }));

        assert_eq!(
            stages[0],
            json!({"$match": {"$and": [
                {"billed_month": {"$gte": "2024-01"}},
                {"billed_month": {"$lte": "2024-03"}}
            ]}})
        );
        assert_eq!(
            stages[1],
            json!({"$group": {
                "_id": {"date": "$billed_month", "provider": "$provider"},
                "cost": {"$sum": "$cost"},
                "rows": {"$sum": 1}
            }})
        );
        assert_eq!(
            stages[2],
            json!({"$project": {"_id": 0, "date": "$_id.date", "provider": "$_id.provider", "cost": 1, "rows": 1}})
        );
        assert_eq!(stages[3], json!({"$sort": {"cost": -1}}));
        assert_eq!(stages[4], json!({"$skip": 10}));
        assert_eq!(stages[5], json!({"$limit": 11}));
        assert_eq!(
            stages[6],
            json!({"$project": {"_id": 0, "date": 1, "provider": 1, "cost": 1, "rows": 1}})
        );
    }

    #[test]
    fn test_facet_pipeline() {
        let stages = pipeline(json!({
            "granularity": "ACCUMULATED",
            "start": "2024-01",
            "end": "2024-02",
            "group_by": ["provider", "product"],
            "field_group": ["product"],
            "fields": {"avg_cost": {"operator": "average", "key": "cost"}}
        }));
        let facet_group = &stages[3]["$group"];
        assert_eq!(facet_group["_id"], json!({"provider": "$provider"}));
        assert_eq!(facet_group["__num__total_avg_cost"], json!({"$sum": "$__sum_avg_cost"}));
        assert_eq!(
            facet_group["avg_cost"],
            json!({"$push": {"product": "$product", "value": "$avg_cost"}})
        );
        let facet_project = &stages[4]["$project"];
        assert_eq!(
            facet_project["_total_avg_cost"],
            json!({"$cond": [
                {"$eq": ["$__den__total_avg_cost", 0]},
                0,
                {"$divide": ["$__num__total_avg_cost", "$__den__total_avg_cost"]}
            ]})
        );
        let last = stages.last().unwrap();
        assert!(last["$project"].get("__sum_avg_cost").is_none());
    }

    #[test]
    fn test_filter_documents() {
        let config = WarehouseConfig::default();
        let emitter = PipelineEmitter { config: &config };
        let col = ColumnPath::parse("provider");

        assert_eq!(emitter.filter(&Predicate::IsNull(col.clone())), json!({"provider": null}));
        assert_eq!(
            emitter.filter(&Predicate::InList {
                column: col.clone(),
                values: vec![Literal::String("aws".into())],
                negated: true
            }),
            json!({"provider": {"$nin": ["aws", null]}})
        );
        assert_eq!(
            emitter.filter(&Predicate::Contains { column: col.clone(), text: "a.b".into(), negated: false }),
            json!({"provider": {"$regex": "a\\.b", "$options": "i"}})
        );
        assert_eq!(emitter.filter(&Predicate::Never), json!({"$expr": false}));
        assert_eq!(
            emitter.filter(&Predicate::Timediff {
                column: ColumnPath::parse("updated_at"),
                op: Comparison::Gte,
                value: RelativeTime { day_start: true, offset: Some((-1, TimeUnit::Week)) },
            }),
            json!({"$expr": {"$gte": [
                {"$toDate": "$updated_at"},
                {"$dateAdd": {"startDate": {"$dateTrunc": {"date": "$$NOW", "unit": "day"}}, "unit": "week", "amount": -1}}
            ]}})
        );
    }

    #[test]
    fn test_numeric_map_values_default_to_zero() {
        let config = WarehouseConfig::default();
        let emitter = PipelineEmitter { config: &config };
        assert_eq!(
            emitter.value(&ColumnPath::parse("data.usage_amount")),
            json!({"$ifNull": ["$data.usage_amount", 0]})
        );
        assert_eq!(emitter.value(&ColumnPath::parse("tags.env")), json!("$tags.env"));
    }
}
