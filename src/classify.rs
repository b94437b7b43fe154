//! Classifies raw cell values as dates, amounts, plain numbers or text.
//!
//! Dates and amounts are checked before plain numbers so that `12/05/2024` or `1,200.00` is never
//! reported as a bare number.

use crate::model::ValueType;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Date shapes: `D/M/Y`, `Y/M/D`, `D-Mon-Y` and `Mon D, Y`, with `/` or `-` separators.
const DATE_PATTERNS: &[&str] = &[
    r"^\d{1,2}[-/]\d{1,2}[-/]\d{2,4}$",
    r"^\d{2,4}[-/]\d{1,2}[-/]\d{1,2}$",
    r"^\d{1,2}-[A-Za-z]{3}-\d{2,4}$",
    r"^[A-Za-z]{3}\s+\d{1,2},?\s+\d{4}$",
];

/// Amount shapes: symbol-prefixed or comma-grouped decimals, an optional `CR`/`DR` suffix, or
/// parentheses for accounting negatives.
const AMOUNT_PATTERNS: &[&str] = &[
    r"^[₹$€£]?\s*-?\d{1,3}(,\d{3})*(\.\d{1,2})?$",
    r"(?i)^-?\d{1,3}(,\d{3})*(\.\d{1,2})?\s*(cr|dr)?$",
    r"^\(?[₹$€£]?\s*\d{1,3}(,\d{3})*(\.\d{1,2})?\)?$",
    // Indian lakh grouping, e.g. 1,00,000.00
    r"(?i)^[₹$€£]?\s*-?\d{1,2}(,\d{2})*,\d{3}(\.\d{1,2})?(\s*(cr|dr))?$",
    r"(?i)^[₹$€£]\s*-?\d+(\.\d{1,2})?(\s*(cr|dr))?$",
];

const NUMBER_PATTERN: &str = r"^-?\d+(\.\d+)?$";

static DATES: Lazy<Vec<Regex>> = Lazy::new(|| compile(DATE_PATTERNS));
static AMOUNTS: Lazy<Vec<Regex>> = Lazy::new(|| compile(AMOUNT_PATTERNS));
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(NUMBER_PATTERN).expect("number pattern is a valid regex"));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("classifier patterns are valid regexes"))
        .collect()
}

/// Classifies a single raw value. Empty or whitespace-only input is `Unknown`.
pub fn classify(value: &str) -> ValueType {
    let s = value.trim();
    if s.is_empty() {
        return ValueType::Unknown;
    }
    if DATES.iter().any(|re| re.is_match(s)) {
        return ValueType::Date;
    }
    if AMOUNTS.iter().any(|re| re.is_match(s)) {
        return ValueType::Amount;
    }
    if NUMBER.is_match(s) {
        return ValueType::Number;
    }
    ValueType::Text
}

/// A classification memo scoped to one extraction call. Statement columns repeat the same values
/// often (e.g. `0.00`), so this avoids re-running the patterns for each repeat.
#[derive(Debug, Default)]
pub(crate) struct Classifier {
    memo: HashMap<String, ValueType>,
}

impl Classifier {
    pub(crate) fn classify(&mut self, value: &str) -> ValueType {
        if let Some(t) = self.memo.get(value) {
            return *t;
        }
        let t = classify(value);
        self.memo.insert(value.to_string(), t);
        t
    }
}

/// The most frequent known class among `types`. Ties go to the class declared first in
/// [`ValueType`]. Returns `Unknown` when every type is `Unknown` or `types` is empty.
pub fn dominant_type(types: &[ValueType]) -> ValueType {
    let mut best = ValueType::Unknown;
    let mut best_count = 0;
    for candidate in ValueType::KNOWN {
        let count = types.iter().filter(|t| **t == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}
