//! The vocabulary of known institutions and a scorer that guesses which one issued a document.

use serde::{Deserialize, Serialize};

/// Institution names recorded as text patterns when they appear near the top of a sample file.
pub const KNOWN_INSTITUTIONS: &[&str] = &[
    "hdfc bank",
    "icici bank",
    "sbi",
    "state bank of india",
    "axis bank",
    "kotak mahindra",
    "yes bank",
    "idfc first",
    "federal bank",
    "karnataka bank",
    "canara bank",
    "punjab national bank",
    "bank of baroda",
    "union bank",
    "indian bank",
];

/// Generic statement markers recorded alongside institution names.
pub const STATEMENT_MARKERS: &[&str] = &["credit card", "statement"];

/// Weighted evidence for each institution: `(institution, phrase, weight)`.
const EVIDENCE: &[(&str, &str, u32)] = &[
    ("HDFC Bank", "hdfc bank limited", 10),
    ("HDFC Bank", "hdfc bank ltd", 8),
    ("HDFC Bank", "hdfcbank.com", 8),
    ("HDFC Bank", "hdfc bank", 2),
    ("Kotak Mahindra Bank", "kotak mahindra bank limited", 10),
    ("Kotak Mahindra Bank", "kotak mahindra bank", 8),
    ("Kotak Mahindra Bank", "kotak.com", 5),
    ("Kotak Mahindra Bank", "kkbk0", 5),
    ("ICICI Bank", "icici bank limited", 10),
    ("ICICI Bank", "team icici bank", 10),
    ("ICICI Bank", "statement of transactions in saving account", 8),
    ("ICICI Bank", "icicibank.com", 5),
    ("ICICI Bank", "icici bank", 2),
    ("State Bank of India", "state bank of india", 10),
    ("State Bank of India", "sbi.co.in", 8),
    ("State Bank of India", "sbin0", 5),
    ("Axis Bank", "axis bank limited", 10),
    ("Axis Bank", "axisbank.com", 8),
    ("Axis Bank", "utib0", 5),
    ("Axis Bank", "axis bank", 2),
    ("Yes Bank", "yes bank limited", 10),
    ("Yes Bank", "yesbank.in", 8),
    ("IDFC First Bank", "idfc first bank", 10),
    ("Federal Bank", "federal bank", 8),
    ("Karnataka Bank", "karnataka bank", 8),
    ("Canara Bank", "canara bank", 8),
    ("Punjab National Bank", "punjab national bank", 8),
    ("Bank of Baroda", "bank of baroda", 8),
    ("Union Bank of India", "union bank of india", 8),
    ("Indian Bank", "indian bank", 5),
];

/// Scores at or above this are reported with full confidence.
const CONFIDENT_SCORE: u32 = 10;

/// A guess at the institution that issued a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionGuess {
    pub institution: String,
    pub score: u32,
    /// `score / 10`, capped at 1.
    pub confidence: f64,
}

/// Guesses the issuing institution from document text. Returns `None` when nothing in the
/// vocabulary appears. Ties go to the institution listed first.
pub fn detect_institution(text: &str) -> Option<InstitutionGuess> {
    let text = text.to_lowercase();
    let mut totals: Vec<(&str, u32)> = Vec::new();
    for (institution, phrase, weight) in EVIDENCE {
        if !text.contains(phrase) {
            continue;
        }
        match totals.iter_mut().find(|(name, _)| name == institution) {
            Some((_, total)) => *total += weight,
            None => totals.push((institution, *weight)),
        }
    }
    let mut best: Option<(&str, u32)> = None;
    for (name, total) in totals {
        if best.map_or(true, |(_, b)| total > b) {
            best = Some((name, total));
        }
    }
    best.map(|(institution, score)| InstitutionGuess {
        institution: institution.to_string(),
        score,
        confidence: (score as f64 / CONFIDENT_SCORE as f64).min(1.0),
    })
}
