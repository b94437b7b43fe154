//! Parsing of monetary values as they appear in statement exports.
//!
//! Statement amounts arrive in many shapes: `1,234.50`, `₹ 500`, `(1,234.50)`, `500.00 CR`,
//! `-$12.00`. [`parse_amount`] reduces all of them to a signed `Decimal`.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Currency symbols stripped before parsing.
const CURRENCY_SYMBOLS: &[char] = &['₹', '$', '€', '£'];

/// Debit and credit markers, as they appear at the end of an amount.
const DEBIT_MARKERS: &[&str] = &["DR", "Dr", "dr"];
const CREDIT_MARKERS: &[&str] = &["CR", "Cr", "cr"];

/// The sign hint carried by a trailing debit or credit marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Debit,
    Credit,
}

/// Parses a statement amount.
///
/// - A trailing `DR`/`Dr` marks a debit and forces a negative result.
/// - A trailing `CR`/`Cr` marks a credit and forces a positive result.
/// - Parentheses, e.g. `(50.00)`, and a leading minus force a negative result.
/// - Currency symbols, spaces and thousands separators are ignored.
///
/// Returns `None` when what remains is not a decimal number.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let marker = strip_marker(&mut s);

    let mut parenthesized = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        parenthesized = true;
        s = inner;
    }

    let cleaned: String = s
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && !c.is_whitespace() && *c != ',')
        .collect();

    let (minus, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    let digits = digits.strip_prefix('+').unwrap_or(digits);
    if digits.is_empty() || digits.starts_with(['-', '+']) {
        return None;
    }
    let value = Decimal::from_str(digits).ok()?;

    if parenthesized || minus || marker == Some(Marker::Debit) {
        Some(-value.abs())
    } else if marker == Some(Marker::Credit) {
        Some(value.abs())
    } else {
        Some(value)
    }
}

/// Removes a trailing debit or credit marker from `s` and reports which one it was.
fn strip_marker(s: &mut &str) -> Option<Marker> {
    let markers = DEBIT_MARKERS
        .iter()
        .map(|m| (*m, Marker::Debit))
        .chain(CREDIT_MARKERS.iter().map(|m| (*m, Marker::Credit)));
    for (text, marker) in markers {
        if let Some(rest) = s.strip_suffix(text) {
            *s = rest.trim_end();
            return Some(marker);
        }
    }
    None
}

/// Formats a `Decimal` with thousands separators and two decimal places, e.g. `-1,234.50`.
/// Rounds half away from zero. The value never passes through a float.
pub fn format_amount(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let digits = format!("{:.2}", rounded.abs());
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}.{fraction}")
}
