//! Lenient scalar parsing for trip columns
//!
//! Numeric fields degrade to zero instead of failing the row.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use taxi_common::types::{FLAG_NO, FLAG_YES};

pub fn parse_int(raw: &str) -> i32 {
    raw.trim().parse().unwrap_or(0)
}

/// Non-finite values (`NaN`, `inf`) also map to zero.
pub fn parse_float(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Integer digits a stored amount may carry
const MAX_INTEGER_DIGITS: i64 = 28;

/// Fraction digits kept before truncation
const MAX_SCALE: i64 = 28;

/// Accepts thousands separators, e.g. `1,234.50`.
///
/// Values with more than 28 integer digits degrade to zero. Fractions beyond
/// 28 digits are truncated.
pub fn parse_decimal(raw: &str) -> BigDecimal {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let Ok(value) = BigDecimal::from_str(&cleaned) else {
        return BigDecimal::from(0);
    };

    let (_, scale) = value.as_bigint_and_exponent();
    let integer_digits = value.digits() as i64 - scale;
    if integer_digits > MAX_INTEGER_DIGITS {
        return BigDecimal::from(0);
    }
    if scale > MAX_SCALE {
        return value.with_scale(MAX_SCALE);
    }
    value
}

/// `Y` becomes `Yes`, `N` becomes `No`, anything else passes through.
pub fn normalize_flag(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("y") {
        FLAG_YES.to_string()
    } else if trimmed.eq_ignore_ascii_case("n") {
        FLAG_NO.to_string()
    } else {
        trimmed.to_string()
    }
}
