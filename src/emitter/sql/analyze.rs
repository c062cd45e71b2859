//! Analyze path: `base_query` CTE, optional `fg_query` CTE, final SELECT

use super::accessor::Accessors;
use super::ast::{
    BinaryOp, Grouping, Ident, OrderItem, Select, SelectItem, Source, SqlExpr, Statement,
    TableName,
};
use super::filter::compile_predicate;
use crate::emitter::EmitError;
use crate::plan::{
    AggregateField, AggregateFunc, AggregateSource, AnalyzePlan, ComputedExpr, FacetStage,
    GroupKey, GroupStage, KeySource, Stage, TotalFunc, FACET_VALUE,
};
use crate::query::ArithmeticOp;

const BASE_QUERY: &str = "base_query";
const FACET_QUERY: &str = "fg_query";

pub fn build_analyze(plan: &AnalyzePlan, acc: &Accessors) -> Result<Statement, EmitError> {
    let group = plan
        .group()
        .ok_or_else(|| EmitError::InvalidPlan("analyze plan has no group stage".to_string()))?;

    let mut base = Select::new(Source::Table(TableName::parse(&acc.config().table)?));
    base.explode = acc.explode()?;
    for stage in &plan.stages {
        if let Stage::Match(predicate) = stage {
            base.selection = Some(compile_predicate(acc, predicate)?);
        }
    }
    base.items = group_items(acc, group)?;
    if group.has_aggregates() {
        base.group_by = Grouping::All;
    } else {
        // Keys only: one row per combination, as a grouping would give
        base.distinct = true;
    }

    let mut ctes = vec![(Ident::new(BASE_QUERY)?, base)];
    let mut body = match plan.facet() {
        Some(facet) => {
            ctes.push((Ident::new(FACET_QUERY)?, facet_totals(facet)?));
            facet_select(facet)?
        }
        None => {
            let mut select = Select::new(Source::Cte(Ident::new(BASE_QUERY)?));
            select.items = visible(plan)?
                .into_iter()
                .map(|a| SelectItem::bare(SqlExpr::Column(a)))
                .collect();
            select
        }
    };

    for stage in &plan.stages {
        match stage {
            Stage::Sort(keys) => {
                body.order_by = keys
                    .iter()
                    .map(|k| {
                        Ok(OrderItem {
                            expr: SqlExpr::column(&k.alias)?,
                            desc: k.desc,
                        })
                    })
                    .collect::<Result<Vec<_>, EmitError>>()?;
            }
            Stage::Skip(n) => body.offset = Some(*n),
            Stage::Limit(n) => body.limit = Some(*n),
            _ => {}
        }
    }

    Ok(Statement { ctes, body })
}

fn visible(plan: &AnalyzePlan) -> Result<Vec<Ident>, EmitError> {
    let aliases = plan
        .stages
        .iter()
        .find_map(|s| match s {
            Stage::Project(aliases) => Some(aliases),
            _ => None,
        })
        .ok_or_else(|| EmitError::InvalidPlan("analyze plan has no projection".to_string()))?;
    aliases.iter().map(|a| Ident::new(a)).collect()
}

// ---- base_query ----

fn group_items(acc: &Accessors, group: &GroupStage) -> Result<Vec<SelectItem>, EmitError> {
    let mut items = Vec::with_capacity(group.keys.len() + group.fields.len());
    for key in &group.keys {
        items.push(SelectItem::aliased(key_expr(acc, key)?, Ident::new(&key.alias)?));
    }
    for field in &group.fields {
        items.push(SelectItem::aliased(aggregate_expr(acc, field)?, Ident::new(&field.alias)?));
    }
    Ok(items)
}

fn key_expr(acc: &Accessors, key: &GroupKey) -> Result<SqlExpr, EmitError> {
    match &key.source {
        KeySource::Column(column) => acc.column(column),
        KeySource::DateBucket(precision) => acc.date_bucket(*precision),
        KeySource::Computed(expr) => computed_expr(acc, expr),
    }
}

fn aggregate_expr(acc: &Accessors, field: &AggregateField) -> Result<SqlExpr, EmitError> {
    let input = match &field.source {
        AggregateSource::Rows => SqlExpr::Keyword("*"),
        AggregateSource::Column(column) => acc.column(column)?,
        AggregateSource::Tuple(parts) => SqlExpr::NamedStruct(
            parts
                .iter()
                .map(|(name, column)| Ok((name.clone(), acc.column(column)?)))
                .collect::<Result<Vec<_>, EmitError>>()?,
        ),
    };
    let func = match field.func {
        AggregateFunc::Sum => "SUM",
        AggregateFunc::Average => "AVG",
        AggregateFunc::Max => "MAX",
        AggregateFunc::Min => "MIN",
        AggregateFunc::Count => "COUNT",
        AggregateFunc::Push => "ARRAY_AGG",
        AggregateFunc::AddToSet => "COLLECT_SET",
    };
    if matches!(input, SqlExpr::Keyword(_)) && field.func != AggregateFunc::Count {
        return Err(EmitError::InvalidPlan(format!(
            "aggregate '{}' needs an input column",
            field.alias
        )));
    }
    Ok(SqlExpr::call(func, vec![input]))
}

/// Computed select columns
pub fn computed_expr(acc: &Accessors, expr: &ComputedExpr) -> Result<SqlExpr, EmitError> {
    match expr {
        ComputedExpr::Column(column) => acc.column(column),
        ComputedExpr::Literal(value) => Ok(SqlExpr::Literal(value.clone())),
        ComputedExpr::Size(column) => {
            let array = acc.column(column)?;
            Ok(SqlExpr::Case {
                when_then: vec![(SqlExpr::is_null(array.clone(), false), SqlExpr::int(0))],
                otherwise: Box::new(SqlExpr::call("SIZE", vec![array])),
            })
        }
        ComputedExpr::Arithmetic { op, operands } => {
            let mut parts = operands.iter().map(|o| computed_expr(acc, o));
            let first = parts.next().ok_or_else(|| {
                EmitError::UnsupportedExpression("arithmetic without operands".to_string())
            })??;
            parts.try_fold(first, |left, right| {
                let right = right?;
                Ok(match op {
                    ArithmeticOp::Add => SqlExpr::binary(left, BinaryOp::Add, right),
                    ArithmeticOp::Subtract => SqlExpr::binary(left, BinaryOp::Sub, right),
                    ArithmeticOp::Multiply => SqlExpr::binary(left, BinaryOp::Mul, right),
                    // Division by zero yields NULL
                    ArithmeticOp::Divide => SqlExpr::binary(
                        left,
                        BinaryOp::Div,
                        SqlExpr::call("NULLIF", vec![right, SqlExpr::int(0)]),
                    ),
                })
            })
        }
    }
}

// ---- fg_query ----

fn partition_idents(facet: &FacetStage) -> Result<Vec<Ident>, EmitError> {
    facet.partition_keys.iter().map(|k| Ident::new(k)).collect()
}

fn facet_totals(facet: &FacetStage) -> Result<Select, EmitError> {
    let partition = partition_idents(facet)?;
    let windowed = |func: &'static str, alias: &str| -> Result<SqlExpr, EmitError> {
        Ok(SqlExpr::window(
            SqlExpr::call(func, vec![SqlExpr::column(alias)?]),
            partition.clone(),
        ))
    };

    let mut select = Select::new(Source::Cte(Ident::new(BASE_QUERY)?));
    select.items.push(SelectItem::bare(SqlExpr::Keyword("*")));
    for total in &facet.totals {
        let expr = match &total.func {
            TotalFunc::Sum(alias) => windowed("SUM", alias)?,
            TotalFunc::Min(alias) => windowed("MIN", alias)?,
            TotalFunc::Max(alias) => windowed("MAX", alias)?,
            TotalFunc::Ratio { sum, count } => SqlExpr::Case {
                when_then: vec![(
                    SqlExpr::binary(windowed("SUM", count)?, BinaryOp::Eq, SqlExpr::int(0)),
                    SqlExpr::int(0),
                )],
                otherwise: Box::new(SqlExpr::binary(
                    windowed("SUM", sum)?,
                    BinaryOp::Div,
                    windowed("SUM", count)?,
                )),
            },
        };
        select.items.push(SelectItem::aliased(expr, Ident::new(&total.alias)?));
    }
    Ok(select)
}

// ---- final select ----

fn facet_select(facet: &FacetStage) -> Result<Select, EmitError> {
    let partition = partition_idents(facet)?;
    let mut select = Select::new(Source::Cte(Ident::new(FACET_QUERY)?));

    for key in &partition {
        select.items.push(SelectItem::bare(SqlExpr::Column(key.clone())));
    }
    // Totals are constant within a partition
    for total in &facet.totals {
        select.items.push(SelectItem::aliased(
            SqlExpr::call("MAX", vec![SqlExpr::column(&total.alias)?]),
            Ident::new(&total.alias)?,
        ));
    }
    for array in &facet.arrays {
        let mut tuple = facet
            .facet_keys
            .iter()
            .map(|k| Ok((k.clone(), SqlExpr::column(k)?)))
            .collect::<Result<Vec<_>, EmitError>>()?;
        tuple.push((FACET_VALUE.to_string(), SqlExpr::column(array)?));
        select.items.push(SelectItem::aliased(
            SqlExpr::call("ARRAY_AGG", vec![SqlExpr::NamedStruct(tuple)]),
            Ident::new(array)?,
        ));
    }
    select.group_by = Grouping::Keys(partition);
    Ok(select)
}
