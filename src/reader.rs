//! Reads spreadsheets and delimited text into a [`RawTable`].

use crate::model::{excel_serial_to_date, Cell, FileKind, RawTable};
use crate::Result;
use anyhow::{bail, Context};
use calamine::{Data, Reader};
use std::path::Path;
use tracing::debug;

/// Reads the file at `path`, choosing a reader by extension. Delimited text is read without a
/// header and rows may have different lengths. Spreadsheets are read from their first worksheet.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let kind = FileKind::from_path(path)
        .with_context(|| format!("Unsupported file type '{}'", path.display()))?;
    let table = match kind {
        FileKind::DelimitedText => read_delimited(path, delimiter_for(path))?,
        FileKind::Spreadsheet => read_workbook(path)?,
        FileKind::Pdf => bail!(
            "'{}' is a PDF and cannot be read as a table",
            path.display()
        ),
    };
    debug!("Read {} rows from {}", table.len(), path.display());
    Ok(table)
}

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("Unable to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Unable to read line {}", i + 1))?;
        rows.push(record.iter().map(|field| Cell::from(field.trim())).collect());
    }
    Ok(RawTable::new(rows))
}

fn read_workbook(path: &Path) -> Result<RawTable> {
    let mut workbook = calamine::open_workbook_auto(path)
        .with_context(|| format!("Unable to open workbook {}", path.display()))?;
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        bail!("The workbook {} has no worksheets", path.display());
    };
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("Unable to read worksheet '{sheet}'"))?;
    let rows = range
        .rows()
        .map(|row| row.iter().map(convert_cell).collect())
        .collect();
    Ok(RawTable::new(rows))
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::from(s.trim()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
            Some(date) => Cell::Text(date.format("%Y-%m-%d").to_string()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from(s.as_str()),
    }
}
