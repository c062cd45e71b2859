//! Request → typed query
//!
//! Required fragments fail the whole request. Optional fragments that are
//! malformed (an odd `group_by` item, an unsupported `select` definition)
//! are logged and dropped so a partially broken request still compiles.

use std::sync::LazyLock;

use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use tracing::warn;

use super::error::QueryError;
use crate::config::RangeLimits;
use crate::query::{
    AnalyzeQuery, ArithmeticOp, ColumnRef, Condition, ConditionRequest, ConditionValue,
    DatePrecision, DateRange, FieldOperator, FieldRequest, FieldSpec, Granularity, Literal,
    Operator, Page, PageRequest, QueryRequest, RelativeTime, SearchQuery, SelectExpr, SortKey,
    SortRequest, TimeUnit,
};

/// Reserved prefix for facet totals
pub const TOTAL_PREFIX: &str = "_total_";

static RELATIVE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(now(?:/d)?)?(?:([+-])(\d+)([dhmsw]))?$").expect("static pattern")
});

/// Validate an analyze request
pub fn validate_analyze(
    request: &QueryRequest,
    limits: &RangeLimits,
) -> Result<AnalyzeQuery, QueryError> {
    let granularity = match request.granularity.as_deref() {
        Some(g) => g
            .parse::<Granularity>()
            .map_err(|reason| QueryError::invalid("granularity", reason))?,
        None => return Err(QueryError::RequiredParameter("granularity".to_string())),
    };

    let start = request
        .start
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| QueryError::RequiredParameter("start".to_string()))?;
    let end = request
        .end
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| QueryError::RequiredParameter("end".to_string()))?;
    let range = validate_date_range(granularity, start, end, limits)?;

    let fields = request
        .fields
        .iter()
        .map(|(name, spec)| parse_field(name, spec))
        .collect::<Result<Vec<_>, _>>()?;

    let group_by = parse_column_refs("group_by", &request.group_by);
    let field_group = parse_column_refs("field_group", &request.field_group);
    if let Some(bad) = field_group.iter().find(|c| c.key.starts_with(TOTAL_PREFIX)) {
        return Err(QueryError::invalid(
            "field_group",
            format!("'{}' uses the reserved prefix '{}'", bad.key, TOTAL_PREFIX),
        ));
    }

    Ok(AnalyzeQuery {
        granularity,
        range,
        filter: parse_conditions(&request.filter)?,
        filter_or: parse_conditions(&request.filter_or)?,
        group_by,
        fields,
        field_group,
        select: parse_select(request),
        sort: parse_sort(&request.sort)?,
        page: parse_page(request.page.as_ref())?,
        unwind: parse_unwind(request)?,
    })
}

/// Validate a search request
pub fn validate_search(request: &QueryRequest) -> Result<SearchQuery, QueryError> {
    let distinct = match request.distinct.as_deref() {
        Some("") => return Err(QueryError::invalid("distinct", "empty column key")),
        other => other.map(str::to_string),
    };

    Ok(SearchQuery {
        filter: parse_conditions(&request.filter)?,
        filter_or: parse_conditions(&request.filter_or)?,
        sort: parse_sort(&request.sort)?,
        page: parse_page(request.page.as_ref())?,
        distinct,
        select: parse_select(request),
        unwind: parse_unwind(request)?,
        minimal: request.minimal,
        only: request.only.iter().filter(|k| !k.is_empty()).cloned().collect(),
        count_only: request.count_only,
    })
}

// ---------------------------------------------------------------------------
// Date window
// ---------------------------------------------------------------------------

/// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD` into the first day it covers
fn parse_date_bound(key: &str, value: &str) -> Result<(NaiveDate, DatePrecision), QueryError> {
    let parsed = match value.len() {
        4 => value
            .parse::<i32>()
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
            .map(|d| (d, DatePrecision::Year)),
        7 => NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d")
            .ok()
            .map(|d| (d, DatePrecision::Month)),
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .map(|d| (d, DatePrecision::Day)),
        _ => None,
    };
    parsed.ok_or_else(|| {
        QueryError::invalid(key, format!("'{}' is not YYYY, YYYY-MM or YYYY-MM-DD", value))
    })
}

/// Last day covered by a bound of the given precision
fn period_end(first: NaiveDate, precision: DatePrecision) -> NaiveDate {
    let next = match precision {
        DatePrecision::Day => return first,
        DatePrecision::Month => first.checked_add_months(Months::new(1)),
        DatePrecision::Year => first.checked_add_months(Months::new(12)),
    };
    next.and_then(|d| d.pred_opt()).unwrap_or(first)
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn validate_date_range(
    granularity: Granularity,
    start: &str,
    end: &str,
    limits: &RangeLimits,
) -> Result<DateRange, QueryError> {
    let (start_date, _) = parse_date_bound("start", start)?;
    let (end_first, end_precision) = parse_date_bound("end", end)?;
    let range_error = |reason: String| QueryError::InvalidDateRange {
        start: start.to_string(),
        end: end.to_string(),
        reason,
    };

    match granularity.range_precision() {
        DatePrecision::Month => {
            let span = month_index(end_first) - month_index(start_date);
            if span <= 0 {
                return Err(range_error("end must be after start".to_string()));
            }
            if span > limits.monthly_max_months {
                return Err(range_error(format!(
                    "{} granularity allows at most {} months",
                    granularity, limits.monthly_max_months
                )));
            }
            let first = start_date.with_day(1).unwrap_or(start_date);
            let last_month = end_first.with_day(1).unwrap_or(end_first);
            Ok(DateRange {
                start: first,
                end: period_end(last_month, DatePrecision::Month),
            })
        }
        DatePrecision::Day | DatePrecision::Year => {
            let end_date = period_end(end_first, end_precision);
            if end_date <= start_date {
                return Err(range_error("end must be after start".to_string()));
            }
            let days = (end_date - start_date).num_days();
            if granularity == Granularity::Daily && days > limits.daily_max_days {
                return Err(range_error(format!(
                    "DAILY granularity allows at most {} days",
                    limits.daily_max_days
                )));
            }
            Ok(DateRange {
                start: start_date,
                end: end_date,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn parse_conditions(conditions: &[ConditionRequest]) -> Result<Vec<Condition>, QueryError> {
    conditions.iter().map(parse_condition).collect()
}

fn parse_condition(request: &ConditionRequest) -> Result<Condition, QueryError> {
    if request.key.is_empty() {
        return Err(QueryError::RequiredParameter("filter.key".to_string()));
    }
    let operator = request
        .operator
        .as_deref()
        .unwrap_or("eq")
        .parse::<Operator>()
        .map_err(QueryError::UnsupportedOperator)?;

    let key = request.key.as_str();
    let value = &request.value;
    let invalid = |reason: &str| QueryError::invalid(key, reason.to_string());

    let typed = match operator {
        Operator::Exists => match value {
            serde_json::Value::Null => ConditionValue::Flag(true),
            serde_json::Value::Bool(b) => ConditionValue::Flag(*b),
            _ => return Err(invalid("exists expects a boolean")),
        },
        op if op.takes_list() => match value {
            serde_json::Value::Array(items) => ConditionValue::List(
                items
                    .iter()
                    .map(|v| {
                        Literal::from_json(v).ok_or_else(|| invalid("list items must be scalars"))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            scalar => ConditionValue::List(vec![
                Literal::from_json(scalar).ok_or_else(|| invalid("expected a list of scalars"))?
            ]),
        },
        Operator::TimediffGt
        | Operator::TimediffGte
        | Operator::TimediffLt
        | Operator::TimediffLte => {
            let text = value
                .as_str()
                .ok_or_else(|| invalid("timediff expects a string such as 'now-3d'"))?;
            ConditionValue::Relative(
                parse_relative_time(text)
                    .ok_or_else(|| invalid("timediff accepts now, now/d and [+-]N[dhmsw]"))?,
            )
        }
        Operator::DatetimeGt
        | Operator::DatetimeGte
        | Operator::DatetimeLt
        | Operator::DatetimeLte => {
            match value.as_str() {
                Some(text) if !text.is_empty() => {
                    ConditionValue::Scalar(Literal::String(text.to_string()))
                }
                _ => return Err(invalid("datetime expects a timestamp string")),
            }
        }
        _ => ConditionValue::Scalar(
            Literal::from_json(value).ok_or_else(|| invalid("expected a scalar value"))?,
        ),
    };

    Ok(Condition {
        key: key.to_string(),
        operator,
        value: typed,
    })
}

/// Parse the restricted relative-time grammar used by `timediff_*`
pub fn parse_relative_time(text: &str) -> Option<RelativeTime> {
    if text.is_empty() {
        return None;
    }
    let caps = RELATIVE_TIME.captures(text)?;
    let day_start = caps.get(1).is_some_and(|m| m.as_str() == "now/d");
    let offset = match (caps.get(2), caps.get(3), caps.get(4)) {
        (Some(sign), Some(amount), Some(unit)) => {
            let amount: i64 = amount.as_str().parse().ok()?;
            let amount = if sign.as_str() == "-" { -amount } else { amount };
            let unit = match unit.as_str() {
                "s" => TimeUnit::Second,
                "m" => TimeUnit::Minute,
                "h" => TimeUnit::Hour,
                "d" => TimeUnit::Day,
                _ => TimeUnit::Week,
            };
            Some((amount, unit))
        }
        _ => None,
    };
    Some(RelativeTime { day_start, offset })
}

// ---------------------------------------------------------------------------
// Grouping and aggregation
// ---------------------------------------------------------------------------

fn parse_column_refs(option: &str, items: &[serde_json::Value]) -> Vec<ColumnRef> {
    items
        .iter()
        .filter_map(|item| {
            let parsed = match item {
                serde_json::Value::String(key) if !key.is_empty() => {
                    Some(ColumnRef::new(key.as_str()))
                }
                serde_json::Value::Object(obj) => match obj.get("key").and_then(|k| k.as_str()) {
                    Some(key) if !key.is_empty() => {
                        let name = obj.get("name").and_then(|n| n.as_str()).unwrap_or(key);
                        Some(ColumnRef::named(key, name))
                    }
                    _ => None,
                },
                _ => None,
            };
            if parsed.is_none() {
                warn!(option, item = %item, "dropping unrecognized column reference");
            }
            parsed
        })
        .collect()
}

fn parse_field(name: &str, request: &FieldRequest) -> Result<FieldSpec, QueryError> {
    let operator = request
        .operator
        .as_deref()
        .ok_or_else(|| QueryError::RequiredParameter(format!("fields.{}.operator", name)))?
        .parse::<FieldOperator>()
        .map_err(QueryError::UnsupportedOperator)?;

    let key = request.key.clone().filter(|k| !k.is_empty());
    if operator != FieldOperator::Count && key.is_none() {
        return Err(QueryError::RequiredParameter(format!("fields.{}.key", name)));
    }

    let fields: Vec<(String, String)> = request
        .fields
        .iter()
        .flatten()
        .map(|(n, k)| (n.clone(), k.clone()))
        .collect();
    if operator == FieldOperator::Push && fields.is_empty() {
        return Err(QueryError::RequiredParameter(format!("fields.{}.fields", name)));
    }

    Ok(FieldSpec {
        name: name.to_string(),
        operator,
        key: if operator == FieldOperator::Count { None } else { key },
        fields,
    })
}

// ---------------------------------------------------------------------------
// Projection and paging
// ---------------------------------------------------------------------------

fn parse_sort(sort: &[SortRequest]) -> Result<Vec<SortKey>, QueryError> {
    sort.iter()
        .map(|s| {
            if s.key.is_empty() {
                Err(QueryError::invalid("sort", "empty sort key"))
            } else {
                Ok(SortKey {
                    key: s.key.clone(),
                    desc: s.desc,
                })
            }
        })
        .collect()
}

/// The whole window, including the lookahead row, must fit in a signed 64-bit count
fn parse_page(page: Option<&PageRequest>) -> Result<Option<Page>, QueryError> {
    let Some(page) = page else {
        return Ok(None);
    };
    let Some(limit) = page.limit.filter(|l| *l > 0) else {
        return Ok(None);
    };
    let start = page.start.unwrap_or(1).max(1);
    let end = (start - 1)
        .checked_mul(limit)
        .and_then(|offset| offset.checked_add(limit))
        .and_then(|rows| rows.checked_add(1))
        .filter(|rows| *rows <= i64::MAX as u64);
    if end.is_none() {
        return Err(QueryError::invalid(
            "page",
            format!("start {} with limit {} is out of range", start, limit),
        ));
    }
    Ok(Some(Page { start, limit }))
}

fn parse_unwind(request: &QueryRequest) -> Result<Option<String>, QueryError> {
    match &request.unwind {
        Some(u) if u.path().is_empty() => Err(QueryError::invalid("unwind", "empty path")),
        Some(u) => Ok(Some(u.path().to_string())),
        None => Ok(None),
    }
}

fn parse_select(request: &QueryRequest) -> Vec<(String, SelectExpr)> {
    request
        .select
        .iter()
        .filter_map(|(alias, definition)| match parse_select_expr(definition) {
            Some(expr) => Some((alias.clone(), expr)),
            None => {
                warn!(
                    alias = %alias,
                    definition = %definition,
                    "dropping unsupported select definition"
                );
                None
            }
        })
        .collect()
}

fn parse_select_expr(value: &serde_json::Value) -> Option<SelectExpr> {
    match value {
        serde_json::Value::String(key) if !key.is_empty() => Some(SelectExpr::Field(key.clone())),
        serde_json::Value::Number(_) | serde_json::Value::Bool(_) => {
            Literal::from_json(value).map(SelectExpr::Literal)
        }
        serde_json::Value::Object(obj) => {
            if let Some(literal) = obj.get("literal") {
                return Literal::from_json(literal).map(SelectExpr::Literal);
            }
            let op = obj.get("operator")?.as_str()?;
            if op == "size" {
                let key = obj.get("key")?.as_str()?;
                return (!key.is_empty()).then(|| SelectExpr::Size(key.to_string()));
            }
            let op = match op {
                "add" => ArithmeticOp::Add,
                "subtract" => ArithmeticOp::Subtract,
                "multiply" => ArithmeticOp::Multiply,
                "divide" => ArithmeticOp::Divide,
                _ => return None,
            };
            let operands = obj
                .get("fields")?
                .as_array()?
                .iter()
                .map(parse_select_expr)
                .collect::<Option<Vec<_>>>()?;
            (operands.len() >= 2).then_some(SelectExpr::Arithmetic { op, operands })
        }
        _ => None,
    }
}
