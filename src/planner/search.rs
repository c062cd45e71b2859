//! Search plan building

use tracing::debug;

use super::{build_predicate, AliasRegistry};
use crate::config::WarehouseConfig;
use crate::plan::{ColumnPath, ComputedExpr, Projection, SearchMode, SearchPlan};
use crate::query::{DatePrecision, SearchQuery};

/// Build a search (list) plan
///
/// `count_only` wins over `distinct`, which in turn ignores sort, page and
/// projection. Only the row mode pages, and it fetches no lookahead row.
/// Projected and computed columns share one alias space; the first name to
/// claim an alias keeps it and later ones are dropped.
pub fn plan_search(query: &SearchQuery, config: &WarehouseConfig) -> SearchPlan {
    let predicate = build_predicate(&query.filter, &query.filter_or);

    let date_columns = [
        config.billed_at_column.as_str(),
        config.partition_column.as_str(),
        DatePrecision::Day.column(),
        DatePrecision::Month.column(),
        DatePrecision::Year.column(),
    ];
    let has_date_filter = predicate
        .as_ref()
        .is_some_and(|p| p.references_any(&date_columns));

    let mut registry = AliasRegistry::new();
    let mode = if query.count_only {
        SearchMode::Count
    } else if let Some(column) = &query.distinct {
        SearchMode::Distinct(ColumnPath::parse(column))
    } else {
        let projection = if !query.only.is_empty() {
            Projection::Columns(query.only.iter().map(|k| ColumnPath::parse(k)).collect())
        } else if query.minimal {
            Projection::Columns(
                config
                    .minimal_fields
                    .iter()
                    .map(|k| ColumnPath::parse(k))
                    .collect(),
            )
        } else {
            Projection::All
        };
        let projection = match projection {
            Projection::Columns(columns) => Projection::Columns(
                columns
                    .into_iter()
                    .filter(|c| registry.register(&c.key()).new_alias().is_some())
                    .collect(),
            ),
            Projection::All => Projection::All,
        };
        SearchMode::Rows {
            projection,
            computed: query
                .select
                .iter()
                .filter(|(name, _)| registry.register(name).new_alias().is_some())
                .map(|(name, expr)| (name.clone(), ComputedExpr::from_select(expr)))
                .collect(),
            sort: query
                .sort
                .iter()
                .map(|s| (ColumnPath::parse(&s.key), s.desc))
                .collect(),
            skip: query.page.map(|p| p.offset()).unwrap_or(0),
            limit: query.page.map(|p| p.limit),
        }
    };
    debug!(?mode, has_date_filter, "planned search");

    let (outputs, collisions) = registry.into_parts();
    SearchPlan {
        unwind: query.unwind.as_deref().map(ColumnPath::parse),
        predicate,
        has_date_filter,
        mode,
        outputs,
        collisions,
    }
}
