//! Predicate compilation
//!
//! A filter on a billing date column also gets a predicate on the coarse
//! partition column. Both are built from the same literal inside one leaf,
//! so they cannot drift apart and the pair stays correct under OR.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::accessor::{date_precision, Accessors};
use super::ast::{BinaryOp, SqlExpr, SqlType};
use crate::emitter::EmitError;
use crate::plan::{ColumnPath, Predicate};
use crate::query::{Comparison, Literal, RelativeTime, TimeUnit};

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{4}$").expect("static pattern"));
static MONTH_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}").expect("static pattern"));

const CURRENT_TIMESTAMP: &str = "CURRENT_TIMESTAMP()";

/// Compile a predicate tree into a WHERE expression
pub fn compile_predicate(acc: &Accessors, predicate: &Predicate) -> Result<SqlExpr, EmitError> {
    let expr = match predicate {
        Predicate::IsNull(column) => SqlExpr::is_null(acc.predicate_column(column)?, false),
        Predicate::IsNotNull(column) => SqlExpr::is_null(acc.predicate_column(column)?, true),
        Predicate::Compare { column, op, value } => {
            let compare = SqlExpr::binary(
                acc.predicate_column(column)?,
                binary_op(*op),
                SqlExpr::Literal(value.clone()),
            );
            with_partition(compare, compare_partition(acc, column, *op, value)?)
        }
        Predicate::Regex { column, pattern } => SqlExpr::RLike {
            expr: Box::new(acc.predicate_column(column)?),
            pattern: pattern.clone(),
        },
        Predicate::Contains { column, text, negated } => SqlExpr::ILike {
            expr: Box::new(acc.predicate_column(column)?),
            pattern: format!("%{}%", escape_like(text)),
            negated: *negated,
        },
        Predicate::InList { column, values, negated } => {
            let membership = SqlExpr::InList {
                expr: Box::new(acc.predicate_column(column)?),
                list: values.iter().cloned().map(SqlExpr::Literal).collect(),
                negated: *negated,
            };
            let partition = if *negated {
                None
            } else {
                in_list_partition(acc, column, values)?
            };
            with_partition(membership, partition)
        }
        Predicate::Datetime { column, op, value } => SqlExpr::binary(
            SqlExpr::cast(acc.predicate_column(column)?, SqlType::Timestamp),
            binary_op(*op),
            SqlExpr::cast(SqlExpr::string(value.clone()), SqlType::Timestamp),
        ),
        Predicate::Timediff { column, op, value } => SqlExpr::binary(
            SqlExpr::cast(acc.predicate_column(column)?, SqlType::Timestamp),
            binary_op(*op),
            relative_time(value),
        ),
        Predicate::And(parts) => SqlExpr::And(
            parts
                .iter()
                .map(|p| compile_predicate(acc, p))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Predicate::Or(parts) => SqlExpr::Or(
            parts
                .iter()
                .map(|p| compile_predicate(acc, p))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Predicate::Never => SqlExpr::Keyword("1=0"),
    };
    Ok(expr)
}

/// Bound search scans to the current and previous billing period
pub fn default_window(acc: &Accessors) -> Result<SqlExpr, EmitError> {
    let previous_month = SqlExpr::call(
        "DATE_FORMAT",
        vec![
            SqlExpr::call(
                "ADD_MONTHS",
                vec![SqlExpr::Keyword("CURRENT_DATE()"), SqlExpr::int(-1)],
            ),
            SqlExpr::string("yyyy-MM"),
        ],
    );
    Ok(SqlExpr::binary(acc.partition()?, BinaryOp::Gte, previous_month))
}

pub fn binary_op(op: Comparison) -> BinaryOp {
    match op {
        Comparison::Eq => BinaryOp::Eq,
        Comparison::NotEq => BinaryOp::NotEq,
        Comparison::Lt => BinaryOp::Lt,
        Comparison::Lte => BinaryOp::Lte,
        Comparison::Gt => BinaryOp::Gt,
        Comparison::Gte => BinaryOp::Gte,
    }
}

fn with_partition(expr: SqlExpr, partition: Option<SqlExpr>) -> SqlExpr {
    match partition {
        Some(partition) => SqlExpr::And(vec![expr, partition]),
        None => expr,
    }
}

/// LIKE wildcards in user text match literally
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn relative_time(value: &RelativeTime) -> SqlExpr {
    let anchor = if value.day_start {
        SqlExpr::call(
            "DATE_TRUNC",
            vec![SqlExpr::string("DAY"), SqlExpr::Keyword(CURRENT_TIMESTAMP)],
        )
    } else {
        SqlExpr::Keyword(CURRENT_TIMESTAMP)
    };
    match value.offset {
        None => anchor,
        Some((amount, unit)) => SqlExpr::binary(
            anchor,
            if amount < 0 { BinaryOp::Sub } else { BinaryOp::Add },
            SqlExpr::Interval {
                amount: amount.unsigned_abs(),
                unit: interval_unit(unit),
            },
        ),
    }
}

fn interval_unit(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Second => "SECOND",
        TimeUnit::Minute => "MINUTE",
        TimeUnit::Hour => "HOUR",
        TimeUnit::Day => "DAY",
        TimeUnit::Week => "WEEK",
    }
}

// ---------------------------------------------------------------------------
// Partition pruning
// ---------------------------------------------------------------------------

fn is_date_column(column: &ColumnPath) -> bool {
    column.sub.is_none() && date_precision(&column.root).is_some()
}

/// First and last partition a date value can fall in
fn partition_bounds(column: &ColumnPath, value: &Literal) -> Option<(String, String)> {
    let text = value.as_str();
    let bounds = match text {
        Some(t) if YEAR.is_match(t) => Some((format!("{}-01", t), format!("{}-12", t))),
        Some(t) if MONTH_PREFIX.is_match(t) => t.get(..7).map(|m| (m.to_string(), m.to_string())),
        _ => None,
    };
    if bounds.is_none() {
        warn!(column = %column.key(), ?value, "cannot derive a partition from date value");
    }
    bounds
}

fn compare_partition(
    acc: &Accessors,
    column: &ColumnPath,
    op: Comparison,
    value: &Literal,
) -> Result<Option<SqlExpr>, EmitError> {
    if !is_date_column(column) || op == Comparison::NotEq {
        return Ok(None);
    }
    let Some((low, high)) = partition_bounds(column, value) else {
        return Ok(None);
    };
    let partition = acc.partition()?;
    let expr = match op {
        Comparison::Eq => range_or_equal(partition, low, high),
        Comparison::Gt | Comparison::Gte => {
            SqlExpr::binary(partition, BinaryOp::Gte, SqlExpr::string(low))
        }
        Comparison::Lt | Comparison::Lte => {
            SqlExpr::binary(partition, BinaryOp::Lte, SqlExpr::string(high))
        }
        Comparison::NotEq => return Ok(None),
    };
    Ok(Some(expr))
}

fn in_list_partition(
    acc: &Accessors,
    column: &ColumnPath,
    values: &[Literal],
) -> Result<Option<SqlExpr>, EmitError> {
    if !is_date_column(column) {
        return Ok(None);
    }
    // Every value must map, otherwise pruning could drop matching rows
    let Some(bounds) = values
        .iter()
        .map(|v| partition_bounds(column, v))
        .collect::<Option<Vec<_>>>()
    else {
        return Ok(None);
    };

    let partition = acc.partition()?;
    if bounds.iter().all(|(low, high)| low == high) {
        let mut months: Vec<String> = Vec::new();
        for (month, _) in bounds {
            if !months.contains(&month) {
                months.push(month);
            }
        }
        return Ok(Some(SqlExpr::InList {
            expr: Box::new(partition),
            list: months.into_iter().map(SqlExpr::string).collect(),
            negated: false,
        }));
    }
    Ok(Some(SqlExpr::Or(
        bounds
            .into_iter()
            .map(|(low, high)| range_or_equal(partition.clone(), low, high))
            .collect(),
    )))
}

fn range_or_equal(partition: SqlExpr, low: String, high: String) -> SqlExpr {
    if low == high {
        SqlExpr::binary(partition, BinaryOp::Eq, SqlExpr::string(low))
    } else {
        SqlExpr::And(vec![
            SqlExpr::binary(partition.clone(), BinaryOp::Gte, SqlExpr::string(low)),
            SqlExpr::binary(partition, BinaryOp::Lte, SqlExpr::string(high)),
        ])
    }
}
