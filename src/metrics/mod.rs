pub mod aggregate;
pub mod classify;
pub mod pivot;
pub mod types;

use std::collections::BTreeSet;

use serde_json::Value;

use crate::model::Chart;
use classify::Classifier;
use types::{ChartData, ColumnInfo, LongRecord};

/// Build the wire payload for one chart from a client's raw records:
/// filter by the chart's department/category, pivot to wide rows, then
/// apply the configured aggregation and window.
pub fn chart_data(records: &[LongRecord], chart: &Chart) -> ChartData {
    let filtered = filter_records(records, &chart.filters.department, &chart.filters.category);
    let rows = pivot::pivot(&filtered);
    let rows = aggregate::aggregate(
        rows,
        chart.agg_key,
        &chart.series_keys,
        chart.filters.last_n,
    );
    let mut columns: BTreeSet<String> = BTreeSet::new();
    for row in &rows {
        columns.extend(row.values.keys().cloned());
    }
    ChartData {
        rows,
        columns: columns.into_iter().collect(),
    }
}

/// Columns selectable for charting, derived from the pivoted records and
/// enriched with the unit and category the records themselves carry.
/// Lenient classification: a series with patchy data should still appear.
pub fn columns_for_records(records: &[LongRecord]) -> Vec<ColumnInfo> {
    let rows = pivot::pivot(records);
    let row_values: Vec<Value> = rows
        .iter()
        .filter_map(|row| serde_json::to_value(row).ok())
        .collect();
    let mut columns = Classifier::lenient().collect_columns(&row_values);
    for column in &mut columns {
        if let Some(rec) = records
            .iter()
            .find(|r| r.series_key() == column.name && !r.unit.is_empty())
        {
            column.unit = rec.unit.clone();
        }
        if column.category.is_none() {
            column.category = records
                .iter()
                .find(|r| r.series_key() == column.name && !r.category.is_empty())
                .map(|r| r.category.clone());
        }
    }
    columns
}

fn filter_records(
    records: &[LongRecord],
    department: &Option<String>,
    category: &Option<String>,
) -> Vec<LongRecord> {
    records
        .iter()
        .filter(|r| match department {
            Some(d) if !d.is_empty() => &r.department == d,
            _ => true,
        })
        .filter(|r| match category {
            Some(c) if !c.is_empty() => &r.category == c,
            _ => true,
        })
        .cloned()
        .collect()
}
