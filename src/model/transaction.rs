use crate::model::SystemField;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// The most row errors kept in a [`ParseOutcome`]. Counters are not affected by the cap.
pub const MAX_ROW_ERRORS: usize = 50;

/// One normalized statement line.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    /// Serialized as an ISO date, e.g. `2024-05-12`.
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_date: Option<NaiveDate>,
    #[serde(default)]
    pub narration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Always non-negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal: Option<Decimal>,
    /// Always non-negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    /// The original text of every mapped cell, keyed by field.
    #[serde(default, alias = "raw_data", deserialize_with = "deserialize_raw_data")]
    pub raw_data: BTreeMap<SystemField, String>,
}

impl ParsedTransaction {
    /// The narration, or the merchant when there is no narration.
    pub fn description(&self) -> Option<&str> {
        if !self.narration.is_empty() {
            Some(self.narration.as_str())
        } else {
            self.merchant.as_deref().filter(|m| !m.is_empty())
        }
    }

    /// The signed effect of the transaction: `amount` when present, otherwise `deposit` minus
    /// `withdrawal`.
    pub fn net(&self) -> Option<Decimal> {
        if let Some(amount) = self.amount {
            return Some(amount);
        }
        match (self.withdrawal, self.deposit) {
            (None, None) => None,
            (w, d) => Some(d.unwrap_or_default() - w.unwrap_or_default()),
        }
    }
}

/// Reads raw cell values, dropping cells that were recorded as `null`.
fn deserialize_raw_data<'de, D>(deserializer: D) -> Result<BTreeMap<SystemField, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<SystemField, Option<String>> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect())
}

/// The result of parsing one file with a template.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParseOutcome {
    pub success: bool,
    pub transactions: Vec<ParsedTransaction>,
    /// Human-readable reasons for rejected rows, e.g. `Row 14: Missing amount`.
    pub errors: Vec<String>,
    #[serde(alias = "rows_processed")]
    pub rows_processed: usize,
    #[serde(alias = "rows_skipped")]
    pub rows_skipped: usize,
}

impl ParseOutcome {
    /// Records a rejected row.
    pub(crate) fn reject(&mut self, row_number: usize, reason: &str) {
        self.rows_skipped += 1;
        if self.errors.len() < MAX_ROW_ERRORS {
            self.errors.push(format!("Row {row_number}: {reason}"));
        }
    }
}
