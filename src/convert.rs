//! Conversions between wire-format fields and their normalized forms.
//!
//! EDI dates and times arrive as bare digit runs whose meaning depends on
//! the segment. These helpers normalize them without ever failing: anything
//! that does not match the expected shape is left alone and the caller keeps
//! the raw element.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Normalize a `CCYYMMDD` or `YYMMDD` date element to `YYYY-MM-DD`.
///
/// Two-digit years follow the X12 century cutoff: 00 through 29 are 20xx,
/// 30 through 99 are 19xx. Anything else (wrong length, non-digits) yields
/// `None` and the raw element stands on its own.
pub fn normalize_date(raw: &str) -> Option<String> {
    let digits = raw.trim();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match digits.len() {
        8 => Some(format!(
            "{}-{}-{}",
            &digits[0..4],
            &digits[4..6],
            &digits[6..8]
        )),
        6 => {
            let century = if &digits[0..2] <= "29" { "20" } else { "19" };
            Some(format!(
                "{}{}-{}-{}",
                century,
                &digits[0..2],
                &digits[2..4],
                &digits[4..6]
            ))
        }
        _ => None,
    }
}

/// Normalize an `HHMM` or `HHMMSS` time element to `HH:MM` or `HH:MM:SS`.
pub fn normalize_time(raw: &str) -> Option<String> {
    let digits = raw.trim();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match digits.len() {
        4 => Some(format!("{}:{}", &digits[0..2], &digits[2..4])),
        6 => Some(format!(
            "{}:{}:{}",
            &digits[0..2],
            &digits[2..4],
            &digits[4..6]
        )),
        _ => None,
    }
}

/// Parse a monetary element into an exact decimal.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed).ok()
}

/// Safe converter for monetary fields: the parsed value with the raw
/// element retained whenever the conversion had to fall back.
pub fn decimal_with_raw(raw: &str, default: Decimal) -> (Decimal, Option<String>) {
    match parse_decimal(raw) {
        Some(value) => (value, None),
        None if raw.trim().is_empty() => (default, None),
        None => (default, Some(raw.to_string())),
    }
}

/// Safe integer converter with a caller-provided default.
pub fn parse_int_or(raw: &str, default: i64) -> i64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return default;
    }
    trimmed.parse::<i64>().unwrap_or(default)
}

/// Parse a date element under one of the named wire formats used by rule
/// configuration. Returns a calendar-checked date or `None`.
pub fn parse_wire_date(raw: &str, format: &str) -> Option<NaiveDate> {
    let digits = raw.trim();
    match format {
        "CCYYMMDD" => NaiveDate::parse_from_str(digits, "%Y%m%d").ok(),
        "YYMMDD" => {
            let normalized = normalize_date(digits)?;
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()
        }
        "MMDDCCYY" => NaiveDate::parse_from_str(digits, "%m%d%Y").ok(),
        "MMDDYY" => {
            if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let reordered = format!("{}{}", &digits[4..6], &digits[0..4]);
            let normalized = normalize_date(&reordered)?;
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()
        }
        "ISO" | "YYYY-MM-DD" => NaiveDate::parse_from_str(digits, "%Y-%m-%d").ok(),
        _ => None,
    }
}

/// Luhn check over an identifier with the NPI card-issuer prefix `80840`
/// prepended. A distinct check from the 10-digit shape validation.
pub fn npi_luhn_valid(npi: &str) -> bool {
    let npi = npi.trim();
    if npi.len() != 10 || !npi.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let full = format!("80840{}", npi);
    let mut sum = 0u32;
    for (i, c) in full.chars().rev().enumerate() {
        let mut digit = c.to_digit(10).unwrap_or(0);
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

#[test]
fn normalizes_eight_digit_dates() {
    assert_eq!(normalize_date("20241226").as_deref(), Some("2024-12-26"));
    assert_eq!(normalize_date("20240101").as_deref(), Some("2024-01-01"));
}

#[test]
fn six_digit_dates_follow_the_century_cutoff() {
    assert_eq!(normalize_date("241226").as_deref(), Some("2024-12-26"));
    assert_eq!(normalize_date("001231").as_deref(), Some("2000-12-31"));
    assert_eq!(normalize_date("291231").as_deref(), Some("2029-12-31"));
    assert_eq!(normalize_date("301231").as_deref(), Some("1930-12-31"));
    assert_eq!(normalize_date("991231").as_deref(), Some("1999-12-31"));
}

#[test]
fn malformed_dates_are_left_alone() {
    assert_eq!(normalize_date("2024"), None);
    assert_eq!(normalize_date("ABCDABCD"), None);
    assert_eq!(normalize_date(""), None);
    assert_eq!(normalize_date("   "), None);
}

#[test]
fn normalizes_times() {
    assert_eq!(normalize_time("1430").as_deref(), Some("14:30"));
    assert_eq!(normalize_time("0000").as_deref(), Some("00:00"));
    assert_eq!(normalize_time("235959").as_deref(), Some("23:59:59"));
    assert_eq!(normalize_time("143"), None);
    assert_eq!(normalize_time("AB30"), None);
}

#[test]
fn decimal_conversion_retains_the_raw_element_on_failure() {
    let zero = Decimal::ZERO;
    assert_eq!(
        decimal_with_raw("123.45", zero),
        (Decimal::from_str("123.45").unwrap(), None)
    );
    assert_eq!(decimal_with_raw("", zero), (zero, None));
    assert_eq!(decimal_with_raw("N/A", zero), (zero, Some("N/A".to_string())));
}

#[test]
fn wire_date_parsing_checks_the_calendar() {
    assert!(parse_wire_date("20241226", "CCYYMMDD").is_some());
    assert!(parse_wire_date("20241301", "CCYYMMDD").is_none());
    assert!(parse_wire_date("20240229", "CCYYMMDD").is_some());
    assert!(parse_wire_date("241226", "YYMMDD").is_some());
    assert!(parse_wire_date("12262024", "MMDDCCYY").is_some());
    assert!(parse_wire_date("122624", "MMDDYY").is_some());
    assert!(parse_wire_date("2024-12-26", "ISO").is_some());
    assert!(parse_wire_date("20241226", "UNKNOWN").is_none());
}

#[test]
fn npi_luhn_rejects_bad_checksums() {
    // 1234567893 is the canonical valid example checksum
    assert!(npi_luhn_valid("1234567893"));
    assert!(!npi_luhn_valid("1234567890"));
    assert!(!npi_luhn_valid("123"));
    assert!(!npi_luhn_valid("abcdefghij"));
}
