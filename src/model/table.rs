use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A single raw cell as produced by a tabular-data reader. There is no inherent meaning to a cell;
/// it may hold a date, an amount or a description depending on which column it sits in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// True when the cell has no content once trimmed.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Number(_) => false,
            Cell::Text(s) => s.trim().is_empty(),
        }
    }

    /// The cell's textual content, trimmed. Empty cells produce an empty string.
    pub fn text(&self) -> String {
        self.to_string().trim().to_string()
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            // Whole numbers are written without a fractional part so that e.g. a cheque number of
            // 104 does not turn into "104.0".
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{n:.0}"),
            Cell::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

/// Rows of cells with no header. Row and column order are exactly as the reader produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTable {
    rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Builds a table from anything that looks like rows of strings.
    pub fn from_strings<S, R>(rows: impl IntoIterator<Item = R>) -> Self
    where
        S: Into<String>,
        R: IntoIterator<Item = S>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|s| Cell::from(s.into())).collect())
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The trimmed text of the cell at `row`, `col`. Missing cells are empty strings.
    pub fn text_at(&self, row: usize, col: usize) -> String {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(Cell::text)
            .unwrap_or_default()
    }

    /// Joins the first `limit` rows into a single block of text, cells separated by spaces and
    /// rows by newlines. Used for institution and template detection.
    pub fn head_text(&self, limit: usize) -> String {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                row.iter()
                    .filter(|c| !c.is_empty())
                    .map(Cell::text)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// True when every cell in `row` is empty.
pub(crate) fn is_blank_row(row: &[Cell]) -> bool {
    row.iter().all(Cell::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::Number(104.0).to_string(), "104");
        assert_eq!(Cell::Number(12.5).to_string(), "12.5");
        assert_eq!(Cell::Empty.to_string(), "");
        assert_eq!(Cell::from("  x ").text(), "x");
    }

    #[test]
    fn test_blank_row() {
        assert!(is_blank_row(&[Cell::Empty, Cell::from("  ")]));
        assert!(!is_blank_row(&[Cell::Empty, Cell::Number(0.0)]));
        assert!(is_blank_row(&[]));
    }

    #[test]
    fn test_head_text() {
        let table = RawTable::from_strings(vec![
            vec!["HDFC Bank", "", "Statement"],
            vec!["", "", ""],
            vec!["Date", "Narration"],
        ]);
        assert_eq!(table.head_text(2), "HDFC Bank Statement\n");
        assert_eq!(table.text_at(2, 1), "Narration");
        assert_eq!(table.text_at(9, 9), "");
    }
}
