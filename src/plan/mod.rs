//! Plan types (noun module)
//!
//! The intermediate stage list shared by both emitters.

mod expr;
mod stage;

pub use expr::{ColumnPath, ComputedExpr, Predicate};
pub use stage::{
    AggregateField, AggregateFunc, AggregateSource, AliasCollision, AnalyzePlan, FacetStage,
    FacetTotal, GroupKey, GroupStage, KeySource, OrderKey, OutputColumn, Projection, SearchMode,
    SearchPlan, Stage, TotalFunc, FACET_VALUE,
};
