//! Analyze plan building logic

use tracing::{debug, warn};

use super::alias::{AliasRegistry, Registration};
use super::error::PlanError;
use super::predicate::build_predicate;
use crate::plan::{
    AggregateField, AggregateFunc, AggregateSource, AnalyzePlan, ColumnPath, ComputedExpr,
    FacetStage, FacetTotal, GroupKey, GroupStage, KeySource, OrderKey, Predicate, Stage, TotalFunc,
};
use crate::query::{AnalyzeQuery, ColumnRef, Comparison, FieldOperator, FieldSpec, Literal};
use crate::validator::TOTAL_PREFIX;

/// Alias of the granularity date key
pub const DATE_KEY: &str = "date";

const HIDDEN_SUM_PREFIX: &str = "__sum_";
const HIDDEN_COUNT_PREFIX: &str = "__count_";

/// A visible aggregate and what the facet stage needs to know about it
struct PlannedField {
    name: String,
    alias: String,
    func: AggregateFunc,
    /// (sum alias, count alias) for a decomposed average
    decomposed: Option<(String, String)>,
}

/// Build an analyze plan from a validated query
pub fn plan_analyze(query: &AnalyzeQuery) -> Result<AnalyzePlan, PlanError> {
    let mut registry = AliasRegistry::new();
    let mut stages = Vec::new();
    let faceted = !query.field_group.is_empty();

    if let Some(path) = &query.unwind {
        stages.push(Stage::Unwind(ColumnPath::parse(path)));
    }

    // Date window first so it is always the leading conjunct
    let mut conjuncts = date_range_predicates(query);
    if let Some(p) = build_predicate(&query.filter, &query.filter_or) {
        conjuncts.push(p);
    }
    if let Some(predicate) = Predicate::all(conjuncts) {
        stages.push(Stage::Match(predicate));
    }

    // Group keys
    let mut keys: Vec<GroupKey> = Vec::new();
    if let Some(precision) = query.granularity.bucket() {
        if let Some(alias) = registry.register(DATE_KEY).new_alias() {
            keys.push(GroupKey {
                alias,
                source: KeySource::DateBucket(precision),
            });
        }
    }
    for column in &query.group_by {
        add_column_key(&mut registry, &mut keys, column);
    }

    let mut facet_keys: Vec<String> = Vec::new();
    for column in &query.field_group {
        let alias = match query.group_by.iter().find(|g| g.key == column.key) {
            Some(grouped) => registry.alias_of(&grouped.name).map(str::to_string),
            None => {
                debug!(key = %column.key, "adding field_group column to group keys");
                add_column_key(&mut registry, &mut keys, column)
            }
        };
        if let Some(alias) = alias {
            if !facet_keys.contains(&alias) {
                facet_keys.push(alias);
            }
        }
    }
    if faceted && facet_keys.is_empty() {
        return Err(PlanError::InvalidQuery(
            "field_group does not resolve to any group key".to_string(),
        ));
    }

    for (name, expr) in &query.select {
        match registry.register(name) {
            Registration::New(alias) => keys.push(GroupKey {
                alias,
                source: KeySource::Computed(ComputedExpr::from_select(expr)),
            }),
            _ => warn!(name = %name, "dropping select column that shadows another output"),
        }
    }

    // Aggregates
    let mut fields: Vec<AggregateField> = Vec::new();
    let mut planned: Vec<PlannedField> = Vec::new();
    for spec in &query.fields {
        let alias = match registry.register(&spec.name) {
            Registration::New(alias) => alias,
            _ => {
                warn!(field = %spec.name, "dropping field whose name is already an output");
                continue;
            }
        };
        let func = aggregate_func(spec.operator);
        fields.push(AggregateField {
            alias: alias.clone(),
            func,
            source: aggregate_source(spec),
            hidden: false,
        });

        let decomposed = if faceted && func == AggregateFunc::Average {
            decompose_average(&mut registry, &mut fields, spec)
        } else {
            None
        };
        planned.push(PlannedField {
            name: spec.name.clone(),
            alias,
            func,
            decomposed,
        });
    }

    if keys.is_empty() && fields.is_empty() {
        return Err(PlanError::EmptyQuery);
    }

    let key_aliases: Vec<String> = keys.iter().map(|k| k.alias.clone()).collect();
    stages.push(Stage::Group(GroupStage { keys, fields }));

    // Facet folding
    let mut visible: Vec<String>;
    let mut totals_by_field: Vec<(String, String)> = Vec::new();
    if faceted {
        let partition_keys: Vec<String> = key_aliases
            .iter()
            .filter(|a| !facet_keys.contains(a))
            .cloned()
            .collect();

        let mut totals = Vec::new();
        let mut arrays = Vec::new();
        for field in &planned {
            arrays.push(field.alias.clone());
            let Some(func) = total_func(field) else {
                continue;
            };
            match registry.register(&format!("{}{}", TOTAL_PREFIX, field.name)) {
                Registration::New(total_alias) => {
                    totals_by_field.push((field.alias.clone(), total_alias.clone()));
                    totals.push(FacetTotal {
                        alias: total_alias,
                        func,
                    });
                }
                _ => warn!(field = %field.name, "facet total alias already taken"),
            }
        }

        visible = partition_keys.clone();
        visible.extend(totals.iter().map(|t| t.alias.clone()));
        visible.extend(arrays.iter().cloned());

        stages.push(Stage::Facet(FacetStage {
            partition_keys,
            facet_keys: facet_keys.clone(),
            totals,
            arrays,
        }));
    } else {
        visible = key_aliases.clone();
        visible.extend(planned.iter().map(|f| f.alias.clone()));
    }

    // Ordering
    let order: Vec<OrderKey> = query
        .sort
        .iter()
        .filter_map(|s| {
            let alias = resolve_sort_alias(&registry, &planned, &totals_by_field, &visible, &s.key);
            if alias.is_none() {
                warn!(key = %s.key, "dropping sort key that is not an output column");
            }
            alias.map(|alias| OrderKey { alias, desc: s.desc })
        })
        .collect();
    if !order.is_empty() {
        stages.push(Stage::Sort(order));
    }

    // Paging with one lookahead row
    if let Some(page) = query.page {
        stages.push(Stage::Skip(page.offset()));
        stages.push(Stage::Limit(page.limit.saturating_add(1)));
    }

    stages.push(Stage::Project(visible.clone()));

    let (entries, collisions) = registry.into_parts();
    let outputs = entries
        .into_iter()
        .filter(|e| visible.contains(&e.alias) || facet_keys.contains(&e.alias))
        .collect();

    Ok(AnalyzePlan {
        granularity: query.granularity,
        stages,
        outputs,
        page_limit: query.page.map(|p| p.limit),
        collisions,
    })
}

/// `>= start AND <= end` on the billed column matching the granularity
fn date_range_predicates(query: &AnalyzeQuery) -> Vec<Predicate> {
    let precision = query.granularity.range_precision();
    let column = ColumnPath::parse(precision.column());
    vec![
        Predicate::Compare {
            column: column.clone(),
            op: Comparison::Gte,
            value: Literal::String(precision.format(query.range.start)),
        },
        Predicate::Compare {
            column,
            op: Comparison::Lte,
            value: Literal::String(precision.format(query.range.end)),
        },
    ]
}

fn add_column_key(
    registry: &mut AliasRegistry,
    keys: &mut Vec<GroupKey>,
    column: &ColumnRef,
) -> Option<String> {
    match registry.register(&column.name) {
        Registration::New(alias) => {
            keys.push(GroupKey {
                alias: alias.clone(),
                source: KeySource::Column(ColumnPath::parse(&column.key)),
            });
            Some(alias)
        }
        Registration::Existing(alias) => Some(alias),
        Registration::Collision(_) => None,
    }
}

fn aggregate_func(operator: FieldOperator) -> AggregateFunc {
    match operator {
        FieldOperator::Sum => AggregateFunc::Sum,
        FieldOperator::Average => AggregateFunc::Average,
        FieldOperator::Max => AggregateFunc::Max,
        FieldOperator::Min => AggregateFunc::Min,
        FieldOperator::Count => AggregateFunc::Count,
        FieldOperator::Push => AggregateFunc::Push,
        FieldOperator::AddToSet => AggregateFunc::AddToSet,
    }
}

fn aggregate_source(spec: &FieldSpec) -> AggregateSource {
    match (spec.operator, &spec.key) {
        (FieldOperator::Count, _) | (_, None) => AggregateSource::Rows,
        (FieldOperator::Push, _) => AggregateSource::Tuple(
            spec.fields
                .iter()
                .map(|(name, key)| (super::alias::sanitize_alias(name), ColumnPath::parse(key)))
                .collect(),
        ),
        (_, Some(key)) => AggregateSource::Column(ColumnPath::parse(key)),
    }
}

/// Add hidden sum and non-null count columns for a faceted average
fn decompose_average(
    registry: &mut AliasRegistry,
    fields: &mut Vec<AggregateField>,
    spec: &FieldSpec,
) -> Option<(String, String)> {
    let key = spec.key.as_deref()?;
    let column = ColumnPath::parse(key);
    let sum = registry
        .register(&format!("{}{}", HIDDEN_SUM_PREFIX, spec.name))
        .new_alias()?;
    let count = registry
        .register(&format!("{}{}", HIDDEN_COUNT_PREFIX, spec.name))
        .new_alias()?;
    fields.push(AggregateField {
        alias: sum.clone(),
        func: AggregateFunc::Sum,
        source: AggregateSource::Column(column.clone()),
        hidden: true,
    });
    fields.push(AggregateField {
        alias: count.clone(),
        func: AggregateFunc::Count,
        source: AggregateSource::Column(column),
        hidden: true,
    });
    Some((sum, count))
}

fn total_func(field: &PlannedField) -> Option<TotalFunc> {
    match field.func {
        // Per-row counts add up to the partition count
        AggregateFunc::Sum | AggregateFunc::Count => Some(TotalFunc::Sum(field.alias.clone())),
        AggregateFunc::Min => Some(TotalFunc::Min(field.alias.clone())),
        AggregateFunc::Max => Some(TotalFunc::Max(field.alias.clone())),
        AggregateFunc::Average => field
            .decomposed
            .as_ref()
            .map(|(sum, count)| TotalFunc::Ratio {
                sum: sum.clone(),
                count: count.clone(),
            }),
        AggregateFunc::Push | AggregateFunc::AddToSet => None,
    }
}

/// Sort keys may name a display name or an alias. Under faceting a numeric
/// field only exists as its `_total_` column at the top level.
fn resolve_sort_alias(
    registry: &AliasRegistry,
    planned: &[PlannedField],
    totals_by_field: &[(String, String)],
    visible: &[String],
    key: &str,
) -> Option<String> {
    let field_alias = planned
        .iter()
        .find(|f| f.name == key || f.alias == key)
        .map(|f| f.alias.as_str());
    if let Some(field_alias) = field_alias {
        if let Some((_, total)) = totals_by_field.iter().find(|(f, _)| f == field_alias) {
            return Some(total.clone());
        }
    }

    let alias = registry
        .alias_of(key)
        .map(str::to_string)
        .or_else(|| registry.contains_alias(key).then(|| key.to_string()))?;
    visible.contains(&alias).then_some(alias)
}
