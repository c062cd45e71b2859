//! Stage types
//!
//! An analyze plan is an ordered stage list:
//! `[Unwind] [Match] Group [Facet] [Sort] [Skip] [Limit] Project`.
//! Both emitters walk the same list, so they cannot disagree about keys,
//! aggregates, facets or paging.

use super::expr::{ColumnPath, ComputedExpr, Predicate};
use crate::query::{DatePrecision, Granularity};

/// Where a group key's value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    Column(ColumnPath),
    /// Billing date cut to a precision
    DateBucket(DatePrecision),
    Computed(ComputedExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupKey {
    pub alias: String,
    pub source: KeySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Sum,
    Average,
    Max,
    Min,
    Count,
    Push,
    AddToSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateSource {
    Column(ColumnPath),
    /// Row count, no input column
    Rows,
    /// Output alias → column, for push
    Tuple(Vec<(String, ColumnPath)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateField {
    pub alias: String,
    pub func: AggregateFunc,
    pub source: AggregateSource,
    /// Helper column never shown to callers
    pub hidden: bool,
}

/// First grouping over raw rows
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStage {
    pub keys: Vec<GroupKey>,
    pub fields: Vec<AggregateField>,
}

impl GroupStage {
    pub fn has_aggregates(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Total over one partition of grouped rows, by alias of the group output
#[derive(Debug, Clone, PartialEq)]
pub enum TotalFunc {
    Sum(String),
    Min(String),
    Max(String),
    /// Σsum / Σcount, 0 when Σcount is 0
    Ratio { sum: String, count: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacetTotal {
    pub alias: String,
    pub func: TotalFunc,
}

/// Second grouping that folds facet columns into arrays
///
/// Output: one row per `partition_keys` combination carrying every total
/// and, per entry of `arrays`, a list of `{facet_keys..., value}` tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetStage {
    pub partition_keys: Vec<String>,
    pub facet_keys: Vec<String>,
    pub totals: Vec<FacetTotal>,
    pub arrays: Vec<String>,
}

/// Name of the value slot inside facet tuples
pub const FACET_VALUE: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub alias: String,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Unwind(ColumnPath),
    Match(Predicate),
    Group(GroupStage),
    Facet(FacetStage),
    Sort(Vec<OrderKey>),
    Skip(u64),
    /// Rows to fetch, already including the lookahead row
    Limit(u64),
    /// Visible output aliases in order
    Project(Vec<String>),
}

/// Internal alias and caller-facing name of an output column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub alias: String,
    pub name: String,
}

/// A raw name that sanitized onto an alias already taken by another name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasCollision {
    pub alias: String,
    pub kept: String,
    pub dropped: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzePlan {
    pub granularity: Granularity,
    pub stages: Vec<Stage>,
    /// Alias → display name for every visible column and facet key
    pub outputs: Vec<OutputColumn>,
    /// Page size requested by the caller, without lookahead
    pub page_limit: Option<u64>,
    pub collisions: Vec<AliasCollision>,
}

impl AnalyzePlan {
    pub fn group(&self) -> Option<&GroupStage> {
        self.stages.iter().find_map(|s| match s {
            Stage::Group(g) => Some(g),
            _ => None,
        })
    }

    pub fn facet(&self) -> Option<&FacetStage> {
        self.stages.iter().find_map(|s| match s {
            Stage::Facet(f) => Some(f),
            _ => None,
        })
    }

    pub fn fetch_limit(&self) -> Option<u64> {
        self.stages.iter().find_map(|s| match s {
            Stage::Limit(n) => Some(*n),
            _ => None,
        })
    }
}

/// Columns returned by a list search
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<ColumnPath>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchMode {
    /// Bare row count
    Count,
    /// Distinct values of one column
    Distinct(ColumnPath),
    Rows {
        projection: Projection,
        computed: Vec<(String, ComputedExpr)>,
        sort: Vec<(ColumnPath, bool)>,
        skip: u64,
        limit: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    pub unwind: Option<ColumnPath>,
    pub predicate: Option<Predicate>,
    /// The filters already bound the billing period
    pub has_date_filter: bool,
    pub mode: SearchMode,
    /// Alias → requested key for projected and computed columns
    pub outputs: Vec<OutputColumn>,
    pub collisions: Vec<AliasCollision>,
}
