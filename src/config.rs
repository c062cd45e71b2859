//! Compiler and execution settings

use serde::{Deserialize, Serialize};

/// Physical layout of the cost table in the warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Table holding billing records
    pub table: String,
    /// ISO timestamp string column the billed_* columns are cut from
    pub billed_at_column: String,
    /// Coarse `YYYY-MM` partition column
    pub partition_column: String,
    /// Map columns whose sub-fields are numeric
    pub numeric_prefixes: Vec<String>,
    pub decimal_precision: u8,
    pub decimal_scale: u8,
    /// Projection used by `minimal` searches
    pub minimal_fields: Vec<String>,
    pub limits: RangeLimits,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            table: "cost".to_string(),
            billed_at_column: "billed_at".to_string(),
            partition_column: "billed_partition".to_string(),
            numeric_prefixes: vec!["data".to_string()],
            decimal_precision: 38,
            decimal_scale: 10,
            minimal_fields: [
                "cost_id",
                "provider",
                "region_code",
                "product",
                "usage_type",
                "cost",
                "billed_date",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            limits: RangeLimits::default(),
        }
    }
}

impl WarehouseConfig {
    pub fn is_numeric_prefix(&self, root: &str) -> bool {
        self.numeric_prefixes.iter().any(|p| p == root)
    }
}

/// Maximum span of an analyze date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeLimits {
    pub daily_max_days: i64,
    pub monthly_max_months: i64,
}

impl Default for RangeLimits {
    fn default() -> Self {
        Self {
            daily_max_days: 31,
            monthly_max_months: 12,
        }
    }
}

/// Retry settings for collaborator calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// Top-level settings document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub warehouse: WarehouseConfig,
    pub retry: RetryConfig,
}
