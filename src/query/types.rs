//! Strongly-typed query structures
//!
//! Produced once by the validator; the planner and emitters never look at
//! the loose request again.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Time bucket size for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Daily,
    Monthly,
    Yearly,
    Accumulated,
}

impl Granularity {
    /// Date bucket used as the `date` group key, if any
    pub fn bucket(&self) -> Option<DatePrecision> {
        match self {
            Granularity::Daily => Some(DatePrecision::Day),
            Granularity::Monthly => Some(DatePrecision::Month),
            Granularity::Yearly => Some(DatePrecision::Year),
            Granularity::Accumulated => None,
        }
    }

    /// Precision of the injected date-range filter
    pub fn range_precision(&self) -> DatePrecision {
        match self {
            Granularity::Monthly | Granularity::Accumulated => DatePrecision::Month,
            Granularity::Daily | Granularity::Yearly => DatePrecision::Day,
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Granularity::Daily),
            "MONTHLY" => Ok(Granularity::Monthly),
            "YEARLY" => Ok(Granularity::Yearly),
            "ACCUMULATED" => Ok(Granularity::Accumulated),
            _ => Err(format!("unknown granularity '{}'", s)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Daily => "DAILY",
            Granularity::Monthly => "MONTHLY",
            Granularity::Yearly => "YEARLY",
            Granularity::Accumulated => "ACCUMULATED",
        };
        f.write_str(s)
    }
}

/// String precision of a billing date column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

impl DatePrecision {
    /// Length of the `YYYY[-MM[-DD]]` prefix
    pub fn width(&self) -> usize {
        match self {
            DatePrecision::Year => 4,
            DatePrecision::Month => 7,
            DatePrecision::Day => 10,
        }
    }

    /// Name of the stored column holding a value at this precision
    pub fn column(&self) -> &'static str {
        match self {
            DatePrecision::Year => "billed_year",
            DatePrecision::Month => "billed_month",
            DatePrecision::Day => "billed_date",
        }
    }

    pub fn format(&self, date: NaiveDate) -> String {
        match self {
            DatePrecision::Year => date.format("%Y").to_string(),
            DatePrecision::Month => date.format("%Y-%m").to_string(),
            DatePrecision::Day => date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Inclusive date window, already normalized to full dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A column reference with its output name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    pub key: String,
    pub name: String,
}

impl ColumnRef {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
        }
    }

    pub fn named(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

/// Scalar literal carried by filters and select expressions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON scalar; arrays and objects are not literals
    pub fn from_json(value: &serde_json::Value) -> Option<Literal> {
        match value {
            serde_json::Value::Null => Some(Literal::Null),
            serde_json::Value::Bool(b) => Some(Literal::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Literal::Int(i)),
                None => n.as_f64().map(Literal::Float),
            },
            serde_json::Value::String(s) => Some(Literal::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::Null => serde_json::Value::Null,
            Literal::Bool(b) => serde_json::Value::Bool(*b),
            Literal::Int(i) => serde_json::Value::from(*i),
            Literal::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Literal::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Text form, used where a value is matched as a string
    pub fn to_text(&self) -> String {
        match self {
            Literal::Null => String::new(),
            Literal::Bool(b) => b.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::String(s) => s.clone(),
        }
    }
}

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Not,
    Lt,
    Lte,
    Gt,
    Gte,
    Regex,
    Exists,
    Contain,
    NotContain,
    In,
    NotIn,
    ContainIn,
    NotContainIn,
    RegexIn,
    DatetimeGt,
    DatetimeGte,
    DatetimeLt,
    DatetimeLte,
    TimediffGt,
    TimediffGte,
    TimediffLt,
    TimediffLte,
}

impl Operator {
    /// Operators whose value is a list
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            Operator::In
                | Operator::NotIn
                | Operator::ContainIn
                | Operator::NotContainIn
                | Operator::RegexIn
        )
    }

    /// Comparison direction for the ordering families
    pub fn comparison(&self) -> Option<Comparison> {
        match self {
            Operator::Lt | Operator::DatetimeLt | Operator::TimediffLt => Some(Comparison::Lt),
            Operator::Lte | Operator::DatetimeLte | Operator::TimediffLte => Some(Comparison::Lte),
            Operator::Gt | Operator::DatetimeGt | Operator::TimediffGt => Some(Comparison::Gt),
            Operator::Gte | Operator::DatetimeGte | Operator::TimediffGte => Some(Comparison::Gte),
            _ => None,
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "eq" => Operator::Eq,
            "not" => Operator::Not,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "regex" => Operator::Regex,
            "exists" => Operator::Exists,
            "contain" => Operator::Contain,
            "not_contain" => Operator::NotContain,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "contain_in" => Operator::ContainIn,
            "not_contain_in" => Operator::NotContainIn,
            "regex_in" => Operator::RegexIn,
            "datetime_gt" => Operator::DatetimeGt,
            "datetime_gte" => Operator::DatetimeGte,
            "datetime_lt" => Operator::DatetimeLt,
            "datetime_lte" => Operator::DatetimeLte,
            "timediff_gt" => Operator::TimediffGt,
            "timediff_gte" => Operator::TimediffGte,
            "timediff_lt" => Operator::TimediffLt,
            "timediff_lte" => Operator::TimediffLte,
            other => return Err(other.to_string()),
        };
        Ok(op)
    }
}

/// Ordering comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// Time unit accepted by `timediff_*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

/// `now`, `now/d`, optionally shifted by `[+-]N[dhmsw]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelativeTime {
    /// Truncate `now` to the start of the day
    pub day_start: bool,
    /// Signed offset from the anchor
    pub offset: Option<(i64, TimeUnit)>,
}

/// Typed value of a condition, shaped by its operator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Scalar(Literal),
    List(Vec<Literal>),
    Flag(bool),
    Relative(RelativeTime),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub key: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

/// Aggregation operators for `fields`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOperator {
    Sum,
    Average,
    Max,
    Min,
    Count,
    Push,
    AddToSet,
}

impl FieldOperator {
    /// Numeric aggregations get a facet total
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldOperator::Sum
                | FieldOperator::Average
                | FieldOperator::Max
                | FieldOperator::Min
                | FieldOperator::Count
        )
    }
}

impl FromStr for FieldOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(FieldOperator::Sum),
            "average" => Ok(FieldOperator::Average),
            "max" => Ok(FieldOperator::Max),
            "min" => Ok(FieldOperator::Min),
            "count" => Ok(FieldOperator::Count),
            "push" => Ok(FieldOperator::Push),
            "add_to_set" => Ok(FieldOperator::AddToSet),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub operator: FieldOperator,
    /// Absent only for `count`
    pub key: Option<String>,
    /// Output name → source key, for `push`
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub key: String,
    pub desc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    /// 1-based
    pub start: u64,
    pub limit: u64,
}

impl Page {
    pub fn offset(&self) -> u64 {
        self.start.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Computed column definition from `select`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SelectExpr {
    Field(String),
    Literal(Literal),
    Arithmetic {
        op: ArithmeticOp,
        operands: Vec<SelectExpr>,
    },
    Size(String),
}

/// Validated analyze (aggregation) query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeQuery {
    pub granularity: Granularity,
    pub range: DateRange,
    pub filter: Vec<Condition>,
    pub filter_or: Vec<Condition>,
    pub group_by: Vec<ColumnRef>,
    pub fields: Vec<FieldSpec>,
    pub field_group: Vec<ColumnRef>,
    pub select: Vec<(String, SelectExpr)>,
    pub sort: Vec<SortKey>,
    pub page: Option<Page>,
    pub unwind: Option<String>,
}

impl AnalyzeQuery {
    /// Stable key for caller-side result caches
    pub fn cache_key(&self) -> String {
        digest("analyze", self)
    }
}

/// Validated search (list) query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub filter: Vec<Condition>,
    pub filter_or: Vec<Condition>,
    pub sort: Vec<SortKey>,
    pub page: Option<Page>,
    pub distinct: Option<String>,
    pub select: Vec<(String, SelectExpr)>,
    pub unwind: Option<String>,
    pub minimal: bool,
    pub only: Vec<String>,
    pub count_only: bool,
}

impl SearchQuery {
    pub fn cache_key(&self) -> String {
        digest("search", self)
    }
}

fn digest<T: Serialize>(kind: &str, value: &T) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    // Typed queries hold only JSON-safe data, so this cannot fail in practice.
    if let Ok(bytes) = serde_json::to_vec(value) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}
