use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One long-format metric observation as stored per client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongRecord {
    /// Month key, `YYYY-MM`.
    pub period: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub category: String,
    pub metric_name: String,
    #[serde(default)]
    pub unit: String,
    /// "actual", "plan", "actual_cumulative", "plan_cumulative", ...
    #[serde(default = "LongRecord::default_classification")]
    pub classification: String,
    #[serde(default)]
    pub value: Option<f64>,
}

impl LongRecord {
    fn default_classification() -> String {
        "actual".to_string()
    }

    /// Series key used as the wide-row column name: the metric name alone
    /// for actuals, `metricName(classification)` for everything else.
    pub fn series_key(&self) -> String {
        if self.classification == "actual" {
            self.metric_name.clone()
        } else {
            format!("{}({})", self.metric_name, self.classification)
        }
    }
}

/// One chart-ready row: a period plus series values keyed by series name.
/// A key may be absent (never observed) or null (suppressed by
/// aggregation). Serializes flat: `{"period": "2025-01", "netSales": 100}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRow {
    pub period: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

impl WideRow {
    pub fn new(period: &str) -> Self {
        Self {
            period: period.to_string(),
            values: BTreeMap::new(),
        }
    }

    /// The numeric value for a series key, if present and non-null.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().flatten()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), Some(value));
    }

    pub fn set_null(&mut self, key: &str) {
        self.values.insert(key.to_string(), None);
    }
}

/// Aggregation applied to pivoted rows before charting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggKey {
    #[default]
    Raw,
    YoyDiff,
    YoyPct,
    Cumulative,
}

impl AggKey {
    pub fn parse(input: &str) -> Result<Self> {
        match input {
            "raw" => Ok(Self::Raw),
            "yoy_diff" => Ok(Self::YoyDiff),
            "yoy_pct" => Ok(Self::YoyPct),
            "cumulative" => Ok(Self::Cumulative),
            other => Err(Error::Validation(format!("unknown aggregation: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::YoyDiff => "yoy_diff",
            Self::YoyPct => "yoy_pct",
            Self::Cumulative => "cumulative",
        }
    }
}

/// What to do when two records collide on the same pivot cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicatePolicy {
    #[default]
    LastWins,
    FirstWins,
    Error,
}

impl DuplicatePolicy {
    pub fn parse(input: &str) -> Result<Self> {
        match input {
            "lastWins" | "last-wins" => Ok(Self::LastWins),
            "firstWins" | "first-wins" => Ok(Self::FirstWins),
            "error" => Ok(Self::Error),
            other => Err(Error::Validation(format!(
                "unknown duplicate policy: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    Date,
    String,
    Unknown,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Date => "date",
            Self::String => "string",
            Self::Unknown => "unknown",
        }
    }
}

/// Classified description of one column, for the column-picker UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub label: String,
    pub column_type: ColumnType,
    pub unit: String,
    pub sample_values: Vec<serde_json::Value>,
    pub is_system: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// The chart wire payload: rows plus the series keys present in them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub rows: Vec<WideRow>,
    pub columns: Vec<String>,
}
