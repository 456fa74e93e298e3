use std::collections::HashMap;

use serde_json::Value;

use crate::date_util::looks_like_date;
use crate::metrics::types::{ColumnInfo, ColumnType};

/// How many rows to scan and how many samples to keep per column.
const SCAN_ROW_LIMIT: usize = 100;
const SAMPLE_LIMIT: usize = 10;

/// Sample-based column classifier. The numeric threshold is the fraction
/// of non-empty samples that must parse as numbers; date detection only
/// runs when enabled, so the lenient preset never labels a column "date".
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    pub numeric_threshold: f64,
    pub detect_dates: bool,
}

impl Classifier {
    /// Import-time preset: strict numeric bar, dates recognized.
    pub fn strict() -> Self {
        Self {
            numeric_threshold: 0.80,
            detect_dates: true,
        }
    }

    /// Column-picker preset: mixed columns still chart, dates ignored.
    pub fn lenient() -> Self {
        Self {
            numeric_threshold: 0.50,
            detect_dates: false,
        }
    }

    /// Classify a column from its sampled values. Nulls and empty strings
    /// are dropped before ratios are computed; a column with nothing left
    /// is "unknown".
    pub fn classify(&self, samples: &[Value]) -> ColumnType {
        let kept: Vec<&Value> = samples.iter().filter(|v| !is_blank(v)).collect();
        if kept.is_empty() {
            return ColumnType::Unknown;
        }
        let total = kept.len() as f64;
        let numeric = kept.iter().filter(|v| is_numeric(v)).count() as f64;
        if numeric / total >= self.numeric_threshold {
            return ColumnType::Number;
        }
        if self.detect_dates {
            let dates = kept.iter().filter(|v| is_date_like(v)).count() as f64;
            if dates / total >= self.numeric_threshold {
                return ColumnType::Date;
            }
        }
        ColumnType::String
    }

    /// Build the full column description for one named column.
    pub fn describe(&self, name: &str, samples: Vec<Value>) -> ColumnInfo {
        let column_type = self.classify(&samples);
        let unit = if column_type == ColumnType::Number {
            infer_unit(name).to_string()
        } else {
            String::new()
        };
        ColumnInfo {
            name: name.to_string(),
            label: name.to_string(),
            column_type,
            unit,
            sample_values: samples,
            is_system: name.starts_with('_'),
            category: None,
        }
    }

    /// Describe every column appearing in the given object rows, keys in
    /// first-seen order. Scans at most the first 100 rows and keeps at
    /// most 10 non-empty samples per column.
    pub fn collect_columns(&self, rows: &[Value]) -> Vec<ColumnInfo> {
        let mut order: Vec<String> = Vec::new();
        let mut samples: HashMap<String, Vec<Value>> = HashMap::new();
        for row in rows.iter().take(SCAN_ROW_LIMIT) {
            let Some(object) = row.as_object() else {
                continue;
            };
            for (key, value) in object {
                if !samples.contains_key(key) {
                    order.push(key.clone());
                }
                let bucket = samples.entry(key.clone()).or_default();
                if is_blank(value) {
                    continue;
                }
                if bucket.len() < SAMPLE_LIMIT {
                    bucket.push(value.clone());
                }
            }
        }
        order
            .into_iter()
            .map(|name| {
                let collected = samples.remove(&name).unwrap_or_default();
                self.describe(&name, collected)
            })
            .collect()
    }
}

/// Default display unit for a numeric column, keyed off the vocabulary
/// the client data actually uses. The caller may override it.
pub fn infer_unit(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains('率') || lower.contains("rate") {
        return "%";
    }
    if lower.contains("売上")
        || lower.contains("単価")
        || lower.contains('額')
        || lower.contains("sales")
        || lower.contains("price")
        || lower.contains("amount")
    {
        return "円";
    }
    if lower.contains("客数") || lower.contains("人数") || lower.contains("customers") {
        return "人";
    }
    if lower.contains("室数") || lower.contains("rooms") {
        return "室";
    }
    ""
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn is_date_like(value: &Value) -> bool {
    match value {
        Value::String(s) => looks_like_date(s),
        _ => false,
    }
}
