use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};
use crate::metrics::types::{DuplicatePolicy, LongRecord, WideRow};

/// Pivot long-format records into one row per period, last write winning
/// when records collide on the same cell. Records with a null value are
/// skipped entirely, so their series key stays absent from that row.
/// Rows come back sorted ascending by period.
pub fn pivot(records: &[LongRecord]) -> Vec<WideRow> {
    let mut rows: BTreeMap<String, WideRow> = BTreeMap::new();
    for rec in records {
        let Some(value) = rec.value else { continue };
        let row = rows
            .entry(rec.period.clone())
            .or_insert_with(|| WideRow::new(&rec.period));
        row.set(&rec.series_key(), value);
    }
    rows.into_values().collect()
}

/// Pivot with explicit duplicate handling. Two records are duplicates when
/// they share (period, department, metricName, classification); under
/// `DuplicatePolicy::Error` the first such pair aborts the pivot.
pub fn pivot_with_policy(
    records: &[LongRecord],
    policy: DuplicatePolicy,
) -> Result<Vec<WideRow>> {
    let mut rows: BTreeMap<String, WideRow> = BTreeMap::new();
    let mut seen: HashSet<(String, String, String, String)> = HashSet::new();
    for rec in records {
        let Some(value) = rec.value else { continue };
        let series_key = rec.series_key();
        if policy == DuplicatePolicy::Error {
            let full_key = (
                rec.period.clone(),
                rec.department.clone(),
                rec.metric_name.clone(),
                rec.classification.clone(),
            );
            if !seen.insert(full_key) {
                return Err(Error::Duplicate {
                    period: rec.period.clone(),
                    series_key,
                });
            }
        }
        let row = rows
            .entry(rec.period.clone())
            .or_insert_with(|| WideRow::new(&rec.period));
        match policy {
            DuplicatePolicy::FirstWins => {
                if !row.contains(&series_key) {
                    row.set(&series_key, value);
                }
            }
            DuplicatePolicy::LastWins | DuplicatePolicy::Error => {
                row.set(&series_key, value);
            }
        }
    }
    Ok(rows.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(period: &str, metric: &str, classification: &str, value: Option<f64>) -> LongRecord {
        LongRecord {
            period: period.to_string(),
            department: "全社".to_string(),
            category: "売上".to_string(),
            metric_name: metric.to_string(),
            unit: String::new(),
            classification: classification.to_string(),
            value,
        }
    }

    #[test]
    fn test_pivot_groups_by_period_sorted() {
        let records = vec![
            rec("2025-02", "netSales", "actual", Some(110.0)),
            rec("2025-01", "netSales", "actual", Some(100.0)),
            rec("2025-01", "customers", "actual", Some(50.0)),
        ];
        let rows = pivot(&records);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period, "2025-01");
        assert_eq!(rows[0].value("netSales"), Some(100.0));
        assert_eq!(rows[0].value("customers"), Some(50.0));
        assert_eq!(rows[1].period, "2025-02");
        assert_eq!(rows[1].value("netSales"), Some(110.0));
    }

    #[test]
    fn test_pivot_null_values_leave_key_absent() {
        let records = vec![
            rec("2025-01", "netSales", "actual", Some(100.0)),
            rec("2025-01", "customers", "actual", None),
        ];
        let rows = pivot(&records);
        assert!(rows[0].contains("netSales"));
        assert!(!rows[0].contains("customers"));
    }

    #[test]
    fn test_pivot_classification_suffixes_key() {
        let records = vec![
            rec("2025-01", "netSales", "actual", Some(100.0)),
            rec("2025-01", "netSales", "plan", Some(120.0)),
        ];
        let rows = pivot(&records);
        assert_eq!(rows[0].value("netSales"), Some(100.0));
        assert_eq!(rows[0].value("netSales(plan)"), Some(120.0));
    }

    #[test]
    fn test_pivot_deterministic() {
        let records = vec![
            rec("2025-01", "netSales", "actual", Some(100.0)),
            rec("2025-02", "netSales", "actual", Some(110.0)),
        ];
        assert_eq!(pivot(&records), pivot(&records));
    }

    #[test]
    fn test_pivot_duplicate_last_wins_default() {
        let records = vec![
            rec("2025-01", "netSales", "actual", Some(100.0)),
            rec("2025-01", "netSales", "actual", Some(999.0)),
        ];
        let rows = pivot(&records);
        assert_eq!(rows[0].value("netSales"), Some(999.0));
    }

    #[test]
    fn test_pivot_duplicate_first_wins() {
        let records = vec![
            rec("2025-01", "netSales", "actual", Some(100.0)),
            rec("2025-01", "netSales", "actual", Some(999.0)),
        ];
        let rows = pivot_with_policy(&records, DuplicatePolicy::FirstWins).unwrap();
        assert_eq!(rows[0].value("netSales"), Some(100.0));
    }

    #[test]
    fn test_pivot_duplicate_error_policy() {
        let records = vec![
            rec("2025-01", "netSales", "actual", Some(100.0)),
            rec("2025-01", "netSales", "actual", Some(999.0)),
        ];
        let err = pivot_with_policy(&records, DuplicatePolicy::Error).unwrap_err();
        match err {
            Error::Duplicate { period, series_key } => {
                assert_eq!(period, "2025-01");
                assert_eq!(series_key, "netSales");
            }
            other => panic!("expected Duplicate, got {other:?}"),
        }
    }

    #[test]
    fn test_pivot_error_policy_allows_distinct_classifications() {
        let records = vec![
            rec("2025-01", "netSales", "actual", Some(100.0)),
            rec("2025-01", "netSales", "plan", Some(120.0)),
        ];
        assert!(pivot_with_policy(&records, DuplicatePolicy::Error).is_ok());
    }

    #[test]
    fn test_pivot_null_duplicate_does_not_trip_error_policy() {
        let records = vec![
            rec("2025-01", "netSales", "actual", None),
            rec("2025-01", "netSales", "actual", Some(100.0)),
        ];
        let rows = pivot_with_policy(&records, DuplicatePolicy::Error).unwrap();
        assert_eq!(rows[0].value("netSales"), Some(100.0));
    }
}
