use crate::model::{DetectionPatterns, FieldMapping};
use serde::{Deserialize, Serialize};

/// The class of a single cell value, or the inferred class of a column.
///
/// Declaration order matters: when two classes are equally frequent in a column, the one declared
/// first wins.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Date,
    Amount,
    Number,
    Text,
    Unknown,
}

serde_plain::derive_display_from_serialize!(ValueType);
serde_plain::derive_fromstr_from_deserialize!(ValueType);

impl ValueType {
    /// The classes that can be inferred for a column, in tie-breaking order.
    pub const KNOWN: [ValueType; 4] = [
        ValueType::Date,
        ValueType::Amount,
        ValueType::Number,
        ValueType::Text,
    ];
}

/// One detected column of a sample file.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedField {
    pub index: usize,
    /// The header text, which may be empty.
    pub name: String,
    pub inferred_type: ValueType,
    /// Up to five raw values from the column.
    pub sample_values: Vec<String>,
}

/// Everything learned from a sample file before a human reviews it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub headers: Vec<String>,
    pub columns: Vec<ExtractedField>,
    /// The first five data rows.
    pub sample_rows: Vec<Vec<String>>,
    /// The number of non-blank data rows after the header.
    pub row_count: usize,
    pub header_row_index: usize,
    pub suggested_mappings: FieldMapping,
    pub detection_patterns: DetectionPatterns,
}
