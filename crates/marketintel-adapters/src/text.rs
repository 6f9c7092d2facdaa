//! Vietnamese-locale numeric and date parsing.
//!
//! Source pages mix thousands-dot and decimal-comma formatting
//! (`"1.234,56"`) with the occasional plain decimal (`"3,5"`). Both are
//! handled by a single rule: the last `,`/`.` encountered is the decimal
//! separator, everything before it is thousands grouping.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Date/time formats attempted in order, matching the formats seen
/// across SBV tables and news bylines.
const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Parses a Vietnamese-locale numeric string into an `f64`.
///
/// Strips everything but digits, `.`, `,` and a leading `-`, then
/// normalizes by replacing `,` with `.` and treating the final
/// dot-delimited group as the decimal part; any earlier groups are
/// concatenated as the integer part. Returns `None` if nothing numeric
/// remains.
pub fn parse_vn_number(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    let negative = trimmed.starts_with('-');
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    // Dots are always thousands grouping; only the last comma (if any) is
    // a decimal separator. A dot-only string has no decimal part at all.
    let candidate = match cleaned.rfind(',') {
        Some(last_comma) => {
            let (integer_part, rest) = cleaned.split_at(last_comma);
            let decimal_part = &rest[1..];
            let integer_digits: String =
                integer_part.chars().filter(|c| c.is_ascii_digit()).collect();
            format!("{integer_digits}.{decimal_part}")
        }
        None => cleaned.chars().filter(|c| c.is_ascii_digit()).collect(),
    };
    if candidate.is_empty() || candidate == "." {
        return None;
    }

    let value: f64 = candidate.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Parses a Vietnamese/ISO date or datetime string, trying each known
/// format in order. Returns `None` if none match.
pub fn parse_vn_datetime(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(to_utc(naive));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(to_utc(date.and_hms_opt(0, 0, 0).expect("midnight is valid")));
        }
    }
    None
}

/// As [`parse_vn_datetime`], but falls back to "now" when every format
/// fails, for fields the pipeline requires to always have a value.
pub fn parse_vn_datetime_or_now(input: &str) -> DateTime<Utc> {
    parse_vn_datetime(input).unwrap_or_else(Utc::now)
}

fn to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thousands_dot_decimal_comma() {
        assert_eq!(parse_vn_number("1.234.567,89"), Some(1_234_567.89));
    }

    #[test]
    fn parses_plain_decimal_comma() {
        assert_eq!(parse_vn_number("3,5"), Some(3.5));
    }

    #[test]
    fn parses_plain_integer() {
        assert_eq!(parse_vn_number("23400"), Some(23400.0));
    }

    #[test]
    fn parses_single_thousands_group_with_no_decimal() {
        assert_eq!(parse_vn_number("1.234"), Some(1234.0));
    }

    #[test]
    fn parses_negative_values() {
        assert_eq!(parse_vn_number("-0,15"), Some(-0.15));
    }

    #[test]
    fn strips_surrounding_unit_glyphs() {
        assert_eq!(parse_vn_number("23.400 VND/USD"), Some(23400.0));
        assert_eq!(parse_vn_number("tăng 0,5%"), Some(0.5));
    }

    #[test]
    fn returns_none_for_non_numeric_input() {
        assert_eq!(parse_vn_number("không có dữ liệu"), None);
    }

    #[test]
    fn parses_slash_date() {
        let dt = parse_vn_datetime("25/12/2025").expect("should parse");
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2025-12-25");
    }

    #[test]
    fn parses_slash_datetime_with_seconds() {
        let dt = parse_vn_datetime("25/12/2025 14:30:00").expect("should parse");
        assert_eq!(dt.format("%H:%M:%S").to_string(), "14:30:00");
    }

    #[test]
    fn parses_iso_date() {
        let dt = parse_vn_datetime("2025-12-25").expect("should parse");
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2025-12-25");
    }

    #[test]
    fn falls_back_to_now_on_garbage_input() {
        let before = Utc::now();
        let dt = parse_vn_datetime_or_now("not a date");
        assert!(dt >= before);
    }
}
