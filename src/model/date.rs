//! Date formats found in statement exports and the functions that parse them.
//!
//! The supported formats are kept as data in [`DATE_FORMATS`], ordered by priority. Day-first
//! formats come before month-first formats because the statements this crate was built for are
//! predominantly day-first; a value like `05/03/2024` is therefore read as 5 March.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// A named date format, e.g. `DD/MM/YYYY`, with the exact text shape it accepts and the `chrono`
/// pattern used to read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFormat {
    /// The identifier stored in a template's field mapping.
    pub id: &'static str,
    /// A regular expression that the trimmed value must match in full.
    shape: &'static str,
    /// The `chrono` parse pattern.
    pattern: &'static str,
}

/// All strict formats in priority order.
pub const DATE_FORMATS: &[DateFormat] = &[
    DateFormat {
        id: "DD/MM/YYYY",
        shape: r"^\d{1,2}/\d{1,2}/\d{4}$",
        pattern: "%d/%m/%Y",
    },
    DateFormat {
        id: "DD-MM-YYYY",
        shape: r"^\d{1,2}-\d{1,2}-\d{4}$",
        pattern: "%d-%m-%Y",
    },
    DateFormat {
        id: "DD/MM/YY",
        shape: r"^\d{1,2}/\d{1,2}/\d{2}$",
        pattern: "%d/%m/%y",
    },
    DateFormat {
        id: "DD-MM-YY",
        shape: r"^\d{1,2}-\d{1,2}-\d{2}$",
        pattern: "%d-%m-%y",
    },
    DateFormat {
        id: "YYYY-MM-DD",
        shape: r"^\d{4}-\d{1,2}-\d{1,2}$",
        pattern: "%Y-%m-%d",
    },
    DateFormat {
        id: "YYYY/MM/DD",
        shape: r"^\d{4}/\d{1,2}/\d{1,2}$",
        pattern: "%Y/%m/%d",
    },
    DateFormat {
        id: "MM/DD/YYYY",
        shape: r"^\d{1,2}/\d{1,2}/\d{4}$",
        pattern: "%m/%d/%Y",
    },
    DateFormat {
        id: "MM-DD-YYYY",
        shape: r"^\d{1,2}-\d{1,2}-\d{4}$",
        pattern: "%m-%d-%Y",
    },
    DateFormat {
        id: "DD-MMM-YYYY",
        shape: r"^\d{1,2}-[A-Za-z]{3}-\d{4}$",
        pattern: "%d-%b-%Y",
    },
    DateFormat {
        id: "DD-MMM-YY",
        shape: r"^\d{1,2}-[A-Za-z]{3}-\d{2}$",
        pattern: "%d-%b-%y",
    },
    DateFormat {
        id: "MMM DD, YYYY",
        shape: r"^[A-Za-z]{3}\s+\d{1,2},?\s+\d{4}$",
        pattern: "%b %d %Y",
    },
];

static SHAPES: Lazy<Vec<Regex>> = Lazy::new(|| {
    DATE_FORMATS
        .iter()
        .map(|f| Regex::new(f.shape).expect("date format shapes are valid regular expressions"))
        .collect()
});

/// Non-strict patterns tried after every strict format has failed.
const LENIENT_DATE_PATTERNS: &[&str] = &["%d %b %Y", "%d %B %Y", "%B %d %Y", "%d.%m.%Y"];
const LENIENT_DATETIME_PATTERNS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Excel serial numbers accepted by the lenient parser, roughly the years 1954 through 2119.
const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<f64> = 20_000.0..=80_000.0;

impl DateFormat {
    /// Looks up a format by its identifier, e.g. `"DD/MM/YYYY"`.
    pub fn by_id(id: &str) -> Option<&'static DateFormat> {
        DATE_FORMATS.iter().find(|f| f.id == id)
    }

    /// Parses `value` strictly: the value must have exactly this format's shape and be a real
    /// calendar date.
    pub fn parse(&self, value: &str) -> Option<NaiveDate> {
        let value = value.trim();
        let ix = DATE_FORMATS.iter().position(|f| f.id == self.id)?;
        if !SHAPES[ix].is_match(value) {
            return None;
        }
        let normalized = value.replace(',', " ");
        NaiveDate::parse_from_str(&normalized, self.pattern).ok()
    }
}

/// Parses a date using the stored `format` if there is one, otherwise each strict format in
/// priority order, otherwise the lenient fallbacks.
pub fn parse_date(value: &str, format: Option<&str>) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(date) = format
        .and_then(DateFormat::by_id)
        .and_then(|f| f.parse(value))
    {
        return Some(date);
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| f.parse(value))
        .or_else(|| parse_date_lenient(value))
}

/// Best-effort parsing for values that none of the strict formats accept.
pub fn parse_date_lenient(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for pattern in LENIENT_DATETIME_PATTERNS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
            return Some(dt.date());
        }
    }
    let normalized = value.replace(',', " ");
    for pattern in LENIENT_DATE_PATTERNS {
        if let Ok(date) = NaiveDate::parse_from_str(&normalized, pattern) {
            return Some(date);
        }
    }
    match value.parse::<f64>() {
        Ok(serial) if EXCEL_SERIAL_RANGE.contains(&serial) => excel_serial_to_date(serial),
        _ => None,
    }
}

/// Converts an Excel serial day number to a date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Picks the first format, in priority order, that parses every one of `samples`. When no format
/// accepts all of them, the first format that accepts the first sample is used.
pub fn detect_format<S: AsRef<str>>(samples: &[S]) -> Option<&'static str> {
    let first = samples.first()?;
    DATE_FORMATS
        .iter()
        .find(|f| samples.iter().all(|s| f.parse(s.as_ref()).is_some()))
        .or_else(|| DATE_FORMATS.iter().find(|f| f.parse(first.as_ref()).is_some()))
        .map(|f| f.id)
}
