use crate::model::FieldMapping;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// The broad kind of file a template was learned from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Spreadsheet,
    DelimitedText,
    Pdf,
}

serde_plain::derive_display_from_serialize!(FileKind);
serde_plain::derive_fromstr_from_deserialize!(FileKind);

impl FileKind {
    /// Determines the kind of file from its extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(FileKind::DelimitedText),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(FileKind::Spreadsheet),
            "pdf" => Some(FileKind::Pdf),
            _ => None,
        }
    }
}

/// Substrings and patterns used to recognize that a file matches a template. They are never used
/// for parsing.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionPatterns {
    #[serde(default)]
    pub text_patterns: BTreeSet<String>,
    /// Plain substrings and/or regular expressions matched against the file name.
    #[serde(default)]
    pub filename_patterns: BTreeSet<String>,
}

impl DetectionPatterns {
    pub fn is_empty(&self) -> bool {
        self.text_patterns.is_empty() && self.filename_patterns.is_empty()
    }

    /// Adds every pattern of `other` to `self`.
    pub fn merge(&mut self, other: DetectionPatterns) {
        self.text_patterns.extend(other.text_patterns);
        self.filename_patterns.extend(other.filename_patterns);
    }
}

/// The fields supplied by the caller when a learned template is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub name: String,
    pub institution: String,
    pub statement_type: String,
    pub file_kind: FileKind,
    pub field_mapping: FieldMapping,
    pub detection_patterns: DetectionPatterns,
    pub sample_headers: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
}

/// A persisted, reusable description of how to recognize and parse one statement format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedTemplate {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub institution: String,
    pub statement_type: String,
    pub file_kind: FileKind,
    pub field_mapping: FieldMapping,
    pub detection_patterns: DetectionPatterns,
    pub sample_headers: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub is_active: bool,
    pub times_used: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
