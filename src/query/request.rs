use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A filter condition as sent by clients
///
/// Accepts both the long (`key`/`value`/`operator`) and the short
/// (`k`/`v`/`o`) spellings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConditionRequest {
    #[serde(alias = "k")]
    pub key: String,
    #[serde(alias = "v", default)]
    pub value: serde_json::Value,
    /// Defaults to `eq`
    #[serde(alias = "o", default)]
    pub operator: Option<String>,
}

/// An aggregation requested in `fields`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct FieldRequest {
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    /// Output name → source key, only meaningful for `push`
    #[serde(default)]
    pub fields: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SortRequest {
    pub key: String,
    #[serde(default)]
    pub desc: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PageRequest {
    /// 1-based page number
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum UnwindRequest {
    Path(String),
    Spec { path: String },
}

impl UnwindRequest {
    pub fn path(&self) -> &str {
        match self {
            UnwindRequest::Path(p) => p,
            UnwindRequest::Spec { path } => path,
        }
    }
}

/// Request body for analyze and search calls
///
/// This is the loose wire shape. Nothing here is trusted until it has gone
/// through [`crate::validator`].
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct QueryRequest {
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub filter: Vec<ConditionRequest>,
    #[serde(default)]
    pub filter_or: Vec<ConditionRequest>,
    /// Items are either a column key or `{key, name}`
    #[serde(default)]
    pub group_by: Vec<serde_json::Value>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRequest>,
    #[serde(default)]
    pub field_group: Vec<serde_json::Value>,
    #[serde(default)]
    pub sort: Vec<SortRequest>,
    #[serde(default)]
    pub page: Option<PageRequest>,
    #[serde(default)]
    pub distinct: Option<String>,
    #[serde(default)]
    pub select: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub unwind: Option<UnwindRequest>,
    #[serde(default)]
    pub minimal: bool,
    #[serde(default)]
    pub only: Vec<String>,
    #[serde(default)]
    pub count_only: bool,
}
