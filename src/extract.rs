//! Finds the header row of a sample table, infers column types and suggests a field mapping.

use crate::classify::{dominant_type, Classifier};
use crate::institution::{KNOWN_INSTITUTIONS, STATEMENT_MARKERS};
use crate::model::{
    detect_format, is_blank_row, Cell, DetectionPatterns, ExtractedField, ExtractionResult,
    FieldKind, FieldMapping, FieldSource, RawTable, SystemField, ValueType, SUGGESTION_ORDER,
};
use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use tracing::debug;

/// How many leading rows are searched for a header.
pub const HEADER_SCAN_ROWS: usize = 15;

/// A row containing any of these words is taken as the header.
const HEADER_KEYWORDS: &[&str] = &[
    "date",
    "amount",
    "balance",
    "narration",
    "description",
    "debit",
    "credit",
    "reference",
    "particulars",
];

/// The share of non-empty cells that must be text for a keyword-free row to count as a header.
const TEXT_HEADER_RATIO: f64 = 0.6;

const TYPE_SAMPLE_LIMIT: usize = 10;
const SAMPLE_VALUES: usize = 5;
const SAMPLE_ROWS: usize = 5;
const DETECTION_SCAN_ROWS: usize = 10;
const MAX_HEADER_PATTERNS: usize = 3;
const HEADER_PATTERN_STOPLIST: &[&str] = &["date", "amount", "balance"];

/// Why a table could not be analysed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExtractError {
    /// The table has no rows at all.
    EmptyInput,
    /// Nothing follows the header row.
    NoDataRows,
}

impl Display for ExtractError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::EmptyInput => write!(f, "The file contains no rows"),
            ExtractError::NoDataRows => write!(f, "No data rows were found after the header row"),
        }
    }
}

impl StdError for ExtractError {}

/// Analyses a sample table.
pub fn extract(table: &RawTable) -> Result<ExtractionResult, ExtractError> {
    if table.is_empty() {
        return Err(ExtractError::EmptyInput);
    }
    let rows = table.rows();
    let header_row_index = find_header_row(rows);
    let data: Vec<&Vec<Cell>> = rows[header_row_index + 1..]
        .iter()
        .filter(|row| !is_blank_row(row))
        .collect();
    if data.is_empty() {
        return Err(ExtractError::NoDataRows);
    }
    debug!(
        "Header found at row {header_row_index} with {} data rows",
        data.len()
    );

    let header = &rows[header_row_index];
    let width = data
        .iter()
        .map(|row| used_width(row))
        .chain(std::iter::once(used_width(header)))
        .max()
        .unwrap_or(0);
    let headers: Vec<String> = (0..width)
        .map(|i| header.get(i).map(Cell::text).unwrap_or_default())
        .collect();

    let mut classifier = Classifier::default();
    let columns: Vec<ExtractedField> = headers
        .iter()
        .enumerate()
        .map(|(index, name)| analyse_column(&mut classifier, index, name, &data))
        .collect();
    for c in &columns {
        debug!("Column {} '{}' is {}", c.index, c.name, c.inferred_type);
    }

    let sample_rows = data
        .iter()
        .take(SAMPLE_ROWS)
        .map(|row| {
            (0..width)
                .map(|i| row.get(i).map(Cell::text).unwrap_or_default())
                .collect()
        })
        .collect();

    let suggested_mappings = suggest_mappings(&columns);
    let detection_patterns = detection_patterns(table, &headers);

    Ok(ExtractionResult {
        headers,
        columns,
        sample_rows,
        row_count: data.len(),
        header_row_index,
        suggested_mappings,
        detection_patterns,
    })
}

/// The index of the first row within [`HEADER_SCAN_ROWS`] that looks like a header, or 0.
///
/// A row qualifies when a cell contains a header keyword, or when it has at least two non-empty
/// cells and [`TEXT_HEADER_RATIO`] of them are text. Single-cell rows are titles, not headers.
pub fn find_header_row(rows: &[Vec<Cell>]) -> usize {
    rows.iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| is_header_like(row))
        .unwrap_or(0)
}

fn is_header_like(row: &[Cell]) -> bool {
    let cells: Vec<String> = row
        .iter()
        .filter(|c| !c.is_empty())
        .map(Cell::text)
        .filter(|s| !s.is_empty())
        .collect();
    if cells.is_empty() {
        return false;
    }
    let has_keyword = cells.iter().any(|cell| {
        let lower = cell.to_lowercase();
        HEADER_KEYWORDS.iter().any(|k| lower.contains(k))
    });
    if has_keyword {
        return true;
    }
    if cells.len() < 2 {
        return false;
    }
    let text = row
        .iter()
        .filter(|c| matches!(c, Cell::Text(_)))
        .map(Cell::text)
        .filter(|s| crate::classify::classify(s) == ValueType::Text)
        .count();
    text as f64 >= TEXT_HEADER_RATIO * cells.len() as f64
}

fn used_width(row: &[Cell]) -> usize {
    row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1)
}

fn analyse_column(
    classifier: &mut Classifier,
    index: usize,
    name: &str,
    data: &[&Vec<Cell>],
) -> ExtractedField {
    let values: Vec<String> = data
        .iter()
        .filter_map(|row| row.get(index))
        .map(Cell::text)
        .filter(|s| !s.is_empty())
        .take(TYPE_SAMPLE_LIMIT)
        .collect();
    let types: Vec<ValueType> = values.iter().map(|v| classifier.classify(v)).collect();
    ExtractedField {
        index,
        name: name.to_string(),
        inferred_type: dominant_type(&types),
        sample_values: values.into_iter().take(SAMPLE_VALUES).collect(),
    }
}

/// Suggests a mapping from column headers. Each header is compared against the synonyms of every
/// field in a fixed priority order, so `Value Date` becomes a value date rather than a date. A
/// field already claimed by an earlier column is not assigned again. Date fields carry the format
/// detected from the column's sample values.
pub fn suggest_mappings(columns: &[ExtractedField]) -> FieldMapping {
    let mut mapping = FieldMapping::new();
    for column in columns {
        let name = column.name.trim();
        if name.is_empty() {
            continue;
        }
        let Some(field) = SUGGESTION_ORDER
            .iter()
            .copied()
            .find(|f| f.synonyms().iter().any(|s| header_matches(name, s)))
        else {
            continue;
        };
        if mapping.contains(field) {
            continue;
        }
        mapping.insert(field, source_for(field, column));
    }
    mapping
}

/// The source for `field` read from `column`, with a detected format for date fields.
pub(crate) fn source_for(field: SystemField, column: &ExtractedField) -> FieldSource {
    if field.kind() != FieldKind::Date {
        return FieldSource::column(column.index);
    }
    let dates: Vec<&String> = column
        .sample_values
        .iter()
        .filter(|v| crate::classify::classify(v) == ValueType::Date)
        .collect();
    match detect_format(&dates) {
        Some(format) => FieldSource::with_format(column.index, format),
        None => FieldSource::column(column.index),
    }
}

/// Synonyms this short are abbreviations such as `dr` and `cr`. They only match a whole header
/// word, so that `Description` is not read as a credit column.
const ABBREVIATION_LEN: usize = 2;

/// The header lowercased with everything but letters and digits removed, so that `Txn Date`,
/// `Txn.Date` and `TxnDate` compare equal.
fn compact(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// True when the header equals the synonym or contains it.
fn header_matches(header: &str, synonym: &str) -> bool {
    let wanted = compact(synonym);
    if wanted.is_empty() {
        return false;
    }
    if wanted.chars().count() <= ABBREVIATION_LEN {
        return header
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word.to_lowercase() == wanted);
    }
    compact(header).contains(&wanted)
}

fn detection_patterns(table: &RawTable, headers: &[String]) -> DetectionPatterns {
    let head = table.head_text(DETECTION_SCAN_ROWS).to_lowercase();
    let mut text_patterns: BTreeSet<String> = KNOWN_INSTITUTIONS
        .iter()
        .chain(STATEMENT_MARKERS)
        .filter(|p| head.contains(*p))
        .map(|p| p.to_string())
        .collect();
    text_patterns.extend(
        headers
            .iter()
            .map(|h| h.trim())
            .filter(|h| h.chars().count() > 3)
            .filter(|h| !HEADER_PATTERN_STOPLIST.contains(&h.to_lowercase().as_str()))
            .take(MAX_HEADER_PATTERNS)
            .map(str::to_string),
    );
    DetectionPatterns {
        text_patterns,
        filename_patterns: BTreeSet::new(),
    }
}
