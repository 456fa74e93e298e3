use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{Error, Result};

/// Months at or after this month belong to the next fiscal year.
/// November 2024 and December 2024 both fall in fiscal 2025.
pub const FISCAL_YEAR_START_MONTH: u32 = 11;

static RE_MONTH_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

static RE_ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());

/// Parse a `YYYY-MM` month key into (year, month).
pub fn parse_month_key(key: &str) -> Result<(i32, u32)> {
    let caps = RE_MONTH_KEY
        .captures(key)
        .ok_or_else(|| Error::PeriodParse(key.to_string()))?;
    let year: i32 = caps[1]
        .parse()
        .map_err(|_| Error::PeriodParse(key.to_string()))?;
    let month: u32 = caps[2]
        .parse()
        .map_err(|_| Error::PeriodParse(key.to_string()))?;
    if !(1..=12).contains(&month) {
        return Err(Error::PeriodParse(key.to_string()));
    }
    Ok((year, month))
}

/// Fiscal year for a `YYYY-MM` month key.
pub fn fiscal_year_of(key: &str) -> Result<i32> {
    let (year, month) = parse_month_key(key)?;
    if month >= FISCAL_YEAR_START_MONTH {
        Ok(year + 1)
    } else {
        Ok(year)
    }
}

/// True if the string starts with an ISO date shape (`YYYY-MM-DD`).
/// Full datetime strings and plain dates both qualify.
pub fn looks_like_date(s: &str) -> bool {
    RE_ISO_DATE.is_match(s.trim())
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("invalid date: {s}")))
}
