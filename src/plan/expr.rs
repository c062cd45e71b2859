//! Expression types for the plan

use crate::query::{ArithmeticOp, Comparison, Literal, RelativeTime, SelectExpr};

/// A column reference: a top-level column plus an optional map sub-key
///
/// `tags.Name` is `{root: "tags", sub: Some("Name")}`; only the first dot
/// splits, so `data.usage.cost` keeps `usage.cost` as the sub-key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnPath {
    pub root: String,
    pub sub: Option<String>,
}

impl ColumnPath {
    pub fn parse(key: &str) -> Self {
        match key.split_once('.') {
            Some((root, sub)) if !sub.is_empty() => Self {
                root: root.to_string(),
                sub: Some(sub.to_string()),
            },
            _ => Self {
                root: key.trim_end_matches('.').to_string(),
                sub: None,
            },
        }
    }

    /// Dotted form, as written in requests
    pub fn key(&self) -> String {
        match &self.sub {
            Some(sub) => format!("{}.{}", self.root, sub),
            None => self.root.clone(),
        }
    }

    /// True when `self` is `prefix` or lies beneath it
    pub fn starts_with(&self, prefix: &ColumnPath) -> bool {
        let key = self.key();
        let prefix = prefix.key();
        key == prefix || key.starts_with(&format!("{}.", prefix))
    }
}

/// Backend-agnostic filter predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    IsNull(ColumnPath),
    IsNotNull(ColumnPath),
    /// column <op> value, value is never null
    Compare {
        column: ColumnPath,
        op: Comparison,
        value: Literal,
    },
    Regex {
        column: ColumnPath,
        pattern: String,
    },
    /// Case-insensitive substring match
    Contains {
        column: ColumnPath,
        text: String,
        negated: bool,
    },
    /// Non-null values only; null membership is a separate IsNull/IsNotNull
    InList {
        column: ColumnPath,
        values: Vec<Literal>,
        negated: bool,
    },
    Datetime {
        column: ColumnPath,
        op: Comparison,
        value: String,
    },
    Timediff {
        column: ColumnPath,
        op: Comparison,
        value: RelativeTime,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// Matches nothing
    Never,
}

impl Predicate {
    /// AND the parts together, flattening nested ANDs
    pub fn all(parts: Vec<Predicate>) -> Option<Predicate> {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Predicate::And(flat)),
        }
    }

    /// The column this leaf tests, if it is a leaf
    pub fn column(&self) -> Option<&ColumnPath> {
        match self {
            Predicate::IsNull(c) | Predicate::IsNotNull(c) => Some(c),
            Predicate::Compare { column, .. }
            | Predicate::Regex { column, .. }
            | Predicate::Contains { column, .. }
            | Predicate::InList { column, .. }
            | Predicate::Datetime { column, .. }
            | Predicate::Timediff { column, .. } => Some(column),
            Predicate::And(_) | Predicate::Or(_) | Predicate::Never => None,
        }
    }

    /// True if any leaf tests one of the given top-level columns
    pub fn references_any(&self, roots: &[&str]) -> bool {
        match self {
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().any(|p| p.references_any(roots))
            }
            leaf => leaf
                .column()
                .is_some_and(|c| roots.contains(&c.root.as_str())),
        }
    }
}

/// Computed column expression
#[derive(Debug, Clone, PartialEq)]
pub enum ComputedExpr {
    Column(ColumnPath),
    Literal(Literal),
    Arithmetic {
        op: ArithmeticOp,
        operands: Vec<ComputedExpr>,
    },
    /// Number of elements in an array column
    Size(ColumnPath),
}

impl ComputedExpr {
    pub fn from_select(expr: &SelectExpr) -> Self {
        match expr {
            SelectExpr::Field(key) => ComputedExpr::Column(ColumnPath::parse(key)),
            SelectExpr::Literal(value) => ComputedExpr::Literal(value.clone()),
            SelectExpr::Arithmetic { op, operands } => ComputedExpr::Arithmetic {
                op: *op,
                operands: operands.iter().map(ComputedExpr::from_select).collect(),
            },
            SelectExpr::Size(key) => ComputedExpr::Size(ColumnPath::parse(key)),
        }
    }
}
