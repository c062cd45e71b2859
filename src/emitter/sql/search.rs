//! Search path: count, distinct values, or a page of rows

use super::accessor::Accessors;
use super::analyze::computed_expr;
use super::ast::{Ident, OrderItem, Select, SelectItem, Source, SqlExpr, Statement, TableName};
use super::filter::{compile_predicate, default_window};
use crate::emitter::EmitError;
use crate::plan::{Projection, SearchMode, SearchPlan};
use crate::planner::sanitize_alias;

/// Column carrying the row count of a count-only search
pub const TOTAL_COUNT: &str = "total_count";
/// Windowed total attached to every row of a row search
pub const WINDOW_TOTAL_COUNT: &str = "__total_count";
/// Column of a distinct search
pub const DISTINCT_VALUES: &str = "Values";

pub fn build_search(plan: &SearchPlan, acc: &Accessors) -> Result<Statement, EmitError> {
    let mut select = Select::new(Source::Table(TableName::parse(&acc.config().table)?));
    select.explode = acc.explode()?;

    let mut conditions = Vec::new();
    if let Some(predicate) = &plan.predicate {
        conditions.push(compile_predicate(acc, predicate)?);
    }
    if !plan.has_date_filter {
        conditions.push(default_window(acc)?);
    }
    select.selection = SqlExpr::all(conditions);

    match &plan.mode {
        SearchMode::Count => {
            select.items.push(SelectItem::aliased(
                SqlExpr::call("COUNT", vec![SqlExpr::Keyword("*")]),
                Ident::new(TOTAL_COUNT)?,
            ));
        }
        SearchMode::Distinct(column) => {
            select.distinct = true;
            select
                .items
                .push(SelectItem::aliased(acc.column(column)?, Ident::new(DISTINCT_VALUES)?));
        }
        SearchMode::Rows {
            projection,
            computed,
            sort,
            skip,
            limit,
        } => {
            match projection {
                Projection::All => select.items.push(SelectItem::bare(SqlExpr::Keyword("*"))),
                Projection::Columns(columns) => {
                    for column in columns {
                        select.items.push(SelectItem::aliased(
                            acc.column(column)?,
                            Ident::new(&sanitize_alias(&column.key()))?,
                        ));
                    }
                }
            }
            for (name, expr) in computed {
                select.items.push(SelectItem::aliased(
                    computed_expr(acc, expr)?,
                    Ident::new(&sanitize_alias(name))?,
                ));
            }
            select.items.push(SelectItem::aliased(
                SqlExpr::window(SqlExpr::call("COUNT", vec![SqlExpr::Keyword("*")]), Vec::new()),
                Ident::new(WINDOW_TOTAL_COUNT)?,
            ));
            select.order_by = sort
                .iter()
                .map(|(column, desc)| {
                    Ok(OrderItem {
                        expr: acc.column(column)?,
                        desc: *desc,
                    })
                })
                .collect::<Result<Vec<_>, EmitError>>()?;
            if let Some(limit) = limit {
                select.limit = Some(*limit);
                select.offset = Some(*skip);
            }
        }
    }

    Ok(Statement {
        ctes: Vec::new(),
        body: select,
    })
}
