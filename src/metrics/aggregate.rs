use std::collections::HashSet;

use crate::date_util::fiscal_year_of;
use crate::metrics::types::{AggKey, WideRow};

/// Apply a chart's aggregation to pivoted rows.
///
/// Order matters: the window is truncated to the last `last_n` rows first,
/// then cumulative-marked series outside the window's latest fiscal year
/// are nulled, then the transform runs. A `last_n` of zero means no
/// truncation, matching how saved chart configs encode "all rows".
pub fn aggregate(
    mut rows: Vec<WideRow>,
    agg_key: AggKey,
    series_keys: &[String],
    last_n: Option<usize>,
) -> Vec<WideRow> {
    if let Some(n) = last_n.filter(|n| *n > 0) {
        if rows.len() > n {
            rows.drain(..rows.len() - n);
        }
    }
    let keys = dedupe_keys(series_keys);
    null_out_stale_cumulative(&mut rows, &keys);
    match agg_key {
        AggKey::Raw => rows,
        AggKey::Cumulative => cumulative(rows, &keys),
        AggKey::YoyDiff => year_over_year(rows, &keys, YoyMode::Diff),
        AggKey::YoyPct => year_over_year(rows, &keys, YoyMode::Pct),
    }
}

/// Series carrying a cumulative marker in the key. Matches both the
/// Japanese label and classification suffixes like "(actual_cumulative)".
pub fn is_cumulative_key(key: &str) -> bool {
    key.contains("累計") || key.contains("cumulative")
}

fn dedupe_keys(series_keys: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    series_keys
        .iter()
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect()
}

/// A running total restarts each fiscal year, so carrying a cumulative
/// series across the boundary would chart last year's totals against this
/// year's. Null those cells instead of showing them.
fn null_out_stale_cumulative(rows: &mut [WideRow], series_keys: &[String]) {
    let cumulative_keys: Vec<&String> =
        series_keys.iter().filter(|k| is_cumulative_key(k)).collect();
    if cumulative_keys.is_empty() {
        return;
    }
    let Some(last) = rows.last() else {
        return;
    };
    let Ok(latest_fy) = fiscal_year_of(&last.period) else {
        return;
    };
    for row in rows.iter_mut() {
        let Ok(fy) = fiscal_year_of(&row.period) else {
            continue;
        };
        if fy != latest_fy {
            for key in &cumulative_keys {
                row.set_null(key);
            }
        }
    }
}

fn cumulative(mut rows: Vec<WideRow>, series_keys: &[String]) -> Vec<WideRow> {
    for key in series_keys {
        let mut sum = 0.0;
        for row in rows.iter_mut() {
            if let Some(value) = row.value(key) {
                sum += value;
                row.set(key, sum);
            }
        }
    }
    rows
}

#[derive(Clone, Copy)]
enum YoyMode {
    Diff,
    Pct,
}

/// Prior-year comparison base for a series, read from the same row.
/// Only the three headline metrics have one; everything else passes
/// through year-over-year modes untouched.
fn yoy_base(row: &WideRow, key: &str) -> Option<f64> {
    match key {
        "netSales" => row.value("prevYearSales"),
        "customers" => row.value("prevYearCustomers"),
        "customerPrice" => {
            let sales = row.value("prevYearSales")?;
            let customers = row.value("prevYearCustomers")?;
            if customers == 0.0 {
                None
            } else {
                Some(sales / customers)
            }
        }
        _ => None,
    }
}

fn year_over_year(mut rows: Vec<WideRow>, series_keys: &[String], mode: YoyMode) -> Vec<WideRow> {
    for row in rows.iter_mut() {
        for key in series_keys {
            let Some(value) = row.value(key) else {
                continue;
            };
            let Some(base) = yoy_base(row, key) else {
                continue;
            };
            if base == 0.0 {
                continue;
            }
            let transformed = match mode {
                YoyMode::Diff => value - base,
                // Percent of prior year, one decimal: 110 vs 100 -> 110.0.
                YoyMode::Pct => (value / base * 1000.0).round() / 10.0,
            };
            row.set(key, transformed);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(period: &str, pairs: &[(&str, f64)]) -> WideRow {
        let mut r = WideRow::new(period);
        for (key, value) in pairs {
            r.set(key, *value);
        }
        r
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_raw_passthrough() {
        let rows = vec![row("2025-01", &[("netSales", 100.0), ("other", 5.0)])];
        let out = aggregate(rows.clone(), AggKey::Raw, &keys(&["netSales"]), None);
        assert_eq!(out, rows);
    }

    #[test]
    fn test_last_n_truncates_before_cumulative() {
        let rows = vec![
            row("2025-01", &[("netSales", 1.0)]),
            row("2025-02", &[("netSales", 2.0)]),
            row("2025-03", &[("netSales", 3.0)]),
            row("2025-04", &[("netSales", 4.0)]),
            row("2025-05", &[("netSales", 5.0)]),
        ];
        let out = aggregate(rows, AggKey::Cumulative, &keys(&["netSales"]), Some(3));
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].value("netSales"), Some(3.0));
        assert_eq!(out[1].value("netSales"), Some(7.0));
        assert_eq!(out[2].value("netSales"), Some(12.0));
    }

    #[test]
    fn test_last_n_zero_keeps_everything() {
        let rows = vec![
            row("2025-01", &[("netSales", 1.0)]),
            row("2025-02", &[("netSales", 2.0)]),
        ];
        let out = aggregate(rows, AggKey::Raw, &keys(&["netSales"]), Some(0));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_cumulative_skips_null_cells() {
        let mut middle = WideRow::new("2025-02");
        middle.set_null("netSales");
        let rows = vec![
            row("2025-01", &[("netSales", 1.0)]),
            middle,
            row("2025-03", &[("netSales", 2.0)]),
        ];
        let out = aggregate(rows, AggKey::Cumulative, &keys(&["netSales"]), None);
        assert_eq!(out[0].value("netSales"), Some(1.0));
        assert_eq!(out[1].value("netSales"), None);
        assert!(out[1].contains("netSales"));
        assert_eq!(out[2].value("netSales"), Some(3.0));
    }

    #[test]
    fn test_cumulative_only_touches_selected_keys() {
        let rows = vec![
            row("2025-01", &[("netSales", 1.0), ("customers", 10.0)]),
            row("2025-02", &[("netSales", 2.0), ("customers", 20.0)]),
        ];
        let out = aggregate(rows, AggKey::Cumulative, &keys(&["netSales"]), None);
        assert_eq!(out[1].value("netSales"), Some(3.0));
        assert_eq!(out[1].value("customers"), Some(20.0));
    }

    #[test]
    fn test_fiscal_year_null_out_applies_to_older_rows() {
        // Fiscal years: 2024-10 -> 2024, 2024-11 onward -> 2025.
        let rows = vec![
            row("2024-10", &[("売上累計", 900.0), ("netSales", 90.0)]),
            row("2024-11", &[("売上累計", 100.0), ("netSales", 100.0)]),
            row("2024-12", &[("売上累計", 210.0), ("netSales", 110.0)]),
        ];
        let out = aggregate(
            rows,
            AggKey::Raw,
            &keys(&["売上累計", "netSales"]),
            None,
        );
        assert!(out[0].contains("売上累計"));
        assert_eq!(out[0].value("売上累計"), None);
        assert_eq!(out[0].value("netSales"), Some(90.0));
        assert_eq!(out[1].value("売上累計"), Some(100.0));
        assert_eq!(out[2].value("売上累計"), Some(210.0));
    }

    #[test]
    fn test_fiscal_null_out_recognizes_classification_suffix() {
        let rows = vec![
            row("2024-10", &[("netSales(actual_cumulative)", 900.0)]),
            row("2024-11", &[("netSales(actual_cumulative)", 100.0)]),
        ];
        let out = aggregate(
            rows,
            AggKey::Raw,
            &keys(&["netSales(actual_cumulative)"]),
            None,
        );
        assert_eq!(out[0].value("netSales(actual_cumulative)"), None);
        assert_eq!(out[1].value("netSales(actual_cumulative)"), Some(100.0));
    }

    #[test]
    fn test_fiscal_null_out_window_relative() {
        // With the window cut to fiscal 2024 rows only, nothing is stale.
        let rows = vec![
            row("2024-09", &[("売上累計", 800.0)]),
            row("2024-10", &[("売上累計", 900.0)]),
            row("2024-11", &[("売上累計", 100.0)]),
        ];
        let out = aggregate(rows, AggKey::Raw, &keys(&["売上累計"]), Some(2));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].value("売上累計"), None);
        assert_eq!(out[1].value("売上累計"), Some(100.0));
    }

    #[test]
    fn test_yoy_pct_is_percent_of_prior_year() {
        let rows = vec![row(
            "2025-01",
            &[("netSales", 110.0), ("prevYearSales", 100.0)],
        )];
        let out = aggregate(rows, AggKey::YoyPct, &keys(&["netSales"]), None);
        assert_eq!(out[0].value("netSales"), Some(110.0));
        assert_eq!(out[0].value("prevYearSales"), Some(100.0));
    }

    #[test]
    fn test_yoy_pct_rounds_to_one_decimal() {
        let rows = vec![row("2025-01", &[("netSales", 1.0), ("prevYearSales", 3.0)])];
        let out = aggregate(rows, AggKey::YoyPct, &keys(&["netSales"]), None);
        assert_eq!(out[0].value("netSales"), Some(33.3));
    }

    #[test]
    fn test_yoy_diff_subtracts_base() {
        let rows = vec![row(
            "2025-01",
            &[
                ("netSales", 110.0),
                ("prevYearSales", 100.0),
                ("customers", 45.0),
                ("prevYearCustomers", 50.0),
            ],
        )];
        let out = aggregate(
            rows,
            AggKey::YoyDiff,
            &keys(&["netSales", "customers"]),
            None,
        );
        assert_eq!(out[0].value("netSales"), Some(10.0));
        assert_eq!(out[0].value("customers"), Some(-5.0));
    }

    #[test]
    fn test_yoy_customer_price_uses_derived_base() {
        // Prior-year price = 1000 / 10 = 100.
        let rows = vec![row(
            "2025-01",
            &[
                ("customerPrice", 110.0),
                ("prevYearSales", 1000.0),
                ("prevYearCustomers", 10.0),
            ],
        )];
        let out = aggregate(rows, AggKey::YoyPct, &keys(&["customerPrice"]), None);
        assert_eq!(out[0].value("customerPrice"), Some(110.0));
    }

    #[test]
    fn test_yoy_missing_or_zero_base_leaves_cell() {
        let rows = vec![
            row("2025-01", &[("netSales", 110.0)]),
            row("2025-02", &[("netSales", 110.0), ("prevYearSales", 0.0)]),
            row("2025-03", &[("roomCount", 42.0)]),
        ];
        let out = aggregate(
            rows,
            AggKey::YoyPct,
            &keys(&["netSales", "roomCount"]),
            None,
        );
        assert_eq!(out[0].value("netSales"), Some(110.0));
        assert_eq!(out[1].value("netSales"), Some(110.0));
        assert_eq!(out[2].value("roomCount"), Some(42.0));
    }

    #[test]
    fn test_duplicate_selected_keys_apply_once() {
        let rows = vec![
            row("2025-01", &[("netSales", 1.0)]),
            row("2025-02", &[("netSales", 2.0)]),
        ];
        let out = aggregate(
            rows,
            AggKey::Cumulative,
            &keys(&["netSales", "netSales"]),
            None,
        );
        assert_eq!(out[1].value("netSales"), Some(3.0));
    }
}
