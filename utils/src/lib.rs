//! # Trendwatch Utilities
//!
//! Small shared helpers for text normalization and UTC date arithmetic.

use chrono::NaiveDate;

/// Trim a string and collapse internal whitespace runs to single spaces.
///
/// # Examples
///
/// ```
/// use utils::collapse_whitespace;
///
/// assert_eq!(collapse_whitespace("  a \t b\n c  "), "a b c");
/// ```
#[must_use]
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical `YYYY-MM-DD` form of a date, used for partition keys.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use utils::date_key;
///
/// let d = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
/// assert_eq!(date_key(d), "2025-06-01");
/// ```
#[must_use]
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The calendar day before `date`.
#[must_use]
pub fn previous_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().expect("date is not the minimum representable day")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_whitespace_handles_mixed_runs() {
        assert_eq!(collapse_whitespace("a\u{3000}b"), "a b");
        assert_eq!(collapse_whitespace(""), "");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn previous_day_crosses_month_boundary() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(previous_day(d), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }
}
