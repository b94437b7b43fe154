//! Parses statement files with a learned template.

use crate::model::{
    is_blank_row, parse_amount, parse_date, Cell, FieldSource, FileKind, LearnedTemplate,
    ParseOutcome, ParsedTransaction, RawTable, SystemField,
};
use crate::pdf::PdfExtractor;
use crate::reader::read_table;
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// How many leading rows are searched when re-locating the header.
const HEADER_SCAN_ROWS: usize = 15;

/// The most stored headers that must be found for a row to count as the header.
const MAX_REQUIRED_HEADERS: f64 = 3.0;

/// Parses a file with `template`. Spreadsheets and delimited text are read and parsed here; PDFs
/// are handed to `pdf` together with the template's mapping.
pub async fn parse_file(
    path: &Path,
    template: &LearnedTemplate,
    pdf: &dyn PdfExtractor,
    password: Option<&str>,
) -> Result<ParseOutcome> {
    let kind = FileKind::from_path(path).unwrap_or(template.file_kind);
    let outcome = match kind {
        FileKind::Pdf => pdf.parse(path, password, &template.field_mapping).await?,
        FileKind::Spreadsheet | FileKind::DelimitedText => {
            let owned = path.to_path_buf();
            let table = tokio::task::spawn_blocking(move || read_table(&owned))
                .await
                .context("The reader task failed")??;
            parse_table(&table, template)
        }
    };
    info!(
        "Parsed {} with template {}: {} transactions, {} rows skipped",
        path.display(),
        template.id,
        outcome.transactions.len(),
        outcome.rows_skipped
    );
    Ok(outcome)
}

/// Parses a table with `template`. Rows that fail validation are skipped and described in the
/// outcome's `errors`; the parse succeeds when at least one row produced a transaction.
pub fn parse_table(table: &RawTable, template: &LearnedTemplate) -> ParseOutcome {
    let rows = table.rows();
    let header = locate_header_row(rows, &template.sample_headers);
    debug!("Using row {header} as the header");

    let mut outcome = ParseOutcome {
        rows_processed: rows.len().saturating_sub(header + 1),
        ..Default::default()
    };
    for (index, row) in rows.iter().enumerate().skip(header + 1) {
        if is_blank_row(row) {
            outcome.rows_skipped += 1;
            continue;
        }
        match convert_row(row, template) {
            Ok(transaction) => outcome.transactions.push(transaction),
            Err(reason) => outcome.reject(index + 1, reason),
        }
    }
    outcome.success = !outcome.transactions.is_empty();
    outcome
}

/// Finds the header of a new file by looking for the headers stored with the template. A row
/// qualifies when its cells include at least `min(3, n / 2)` of the `n` stored headers, compared
/// case-insensitively. Falls back to row 0.
pub fn locate_header_row(rows: &[Vec<Cell>], sample_headers: &[String]) -> usize {
    let wanted: Vec<String> = sample_headers
        .iter()
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .collect();
    if wanted.is_empty() {
        return 0;
    }
    let required = MAX_REQUIRED_HEADERS.min(0.5 * sample_headers.len() as f64);
    rows.iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| {
            let cells: HashSet<String> = row.iter().map(|c| c.text().to_lowercase()).collect();
            let found = wanted.iter().filter(|h| cells.contains(*h)).count();
            found > 0 && found as f64 >= required
        })
        .unwrap_or(0)
}

/// Converts one row, or returns the reason it was rejected.
fn convert_row(
    row: &[Cell],
    template: &LearnedTemplate,
) -> std::result::Result<ParsedTransaction, &'static str> {
    let mut date: Option<NaiveDate> = None;
    let mut t = ParsedTransaction::default();

    for (field, source) in template.field_mapping.iter() {
        let raw = row.get(source.index()).map(Cell::text).unwrap_or_default();
        if !raw.is_empty() {
            t.raw_data.insert(field, raw.clone());
        }
        match field {
            SystemField::Date => date = parse_date_field(&raw, source),
            SystemField::ValueDate => t.value_date = parse_date_field(&raw, source),
            SystemField::Withdrawal => t.withdrawal = parse_leg(&raw),
            SystemField::Deposit => t.deposit = parse_leg(&raw),
            SystemField::Amount => t.amount = parse_amount(&raw),
            SystemField::Balance => t.balance = parse_amount(&raw),
            SystemField::Narration => t.narration = raw,
            SystemField::Reference => t.reference = non_empty(raw),
            SystemField::TransactionType => t.transaction_type = non_empty(raw),
            SystemField::Category => t.category = non_empty(raw),
            SystemField::Merchant => t.merchant = non_empty(raw),
            SystemField::CardNumber => t.card_number = non_empty(raw),
        }
    }

    t.date = date.ok_or("Missing or invalid date")?;
    if t.description().is_none() {
        return Err("Missing narration/description");
    }
    if t.withdrawal.is_none() && t.deposit.is_none() && t.amount.is_none() {
        return Err("Missing amount");
    }
    Ok(t)
}

fn parse_date_field(raw: &str, source: &FieldSource) -> Option<NaiveDate> {
    if raw.is_empty() {
        return None;
    }
    parse_date(raw, source.format.as_deref())
}

/// Withdrawal and deposit legs are unsigned, and a zero leg is treated as absent.
fn parse_leg(raw: &str) -> Option<Decimal> {
    parse_amount(raw)
        .map(|a| a.abs())
        .filter(|a| !a.is_zero())
}

fn non_empty(raw: String) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DetectionPatterns, FieldMapping, MAX_ROW_ERRORS};
    use chrono::Utc;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template(mapping: FieldMapping, headers: &[&str]) -> LearnedTemplate {
        LearnedTemplate {
            id: 7,
            owner: "user".to_string(),
            name: "HDFC savings".to_string(),
            institution: "HDFC Bank".to_string(),
            statement_type: "savings".to_string(),
            file_kind: FileKind::Spreadsheet,
            field_mapping: mapping,
            detection_patterns: DetectionPatterns::default(),
            sample_headers: headers.iter().map(|s| s.to_string()).collect(),
            sample_rows: vec![],
            is_active: true,
            times_used: 0,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    fn debit_credit_template() -> LearnedTemplate {
        template(
            [
                (SystemField::Date, FieldSource::with_format(0, "DD/MM/YYYY")),
                (SystemField::Narration, FieldSource::column(1)),
                (SystemField::Withdrawal, FieldSource::column(2)),
                (SystemField::Deposit, FieldSource::column(3)),
                (SystemField::Balance, FieldSource::column(4)),
            ]
            .into_iter()
            .collect(),
            &["Date", "Particulars", "Debit", "Credit", "Balance"],
        )
    }

    fn training_rows() -> Vec<Vec<&'static str>> {
        vec![
            vec!["Statement of account", "", "", "", ""],
            vec!["Date", "Particulars", "Debit", "Credit", "Balance"],
            vec!["12/05/2024", "UPI-AMAZON", "1,234.50", "", "10,000.00"],
            vec!["13/05/2024", "NEFT SALARY", "0.00", "50,000.00", "60,000.00"],
            vec!["14/05/2024", "ATM WDL", "(500.00)", "", "59,500.00"],
        ]
    }

    #[test]
    fn test_parse_debit_credit_statement() {
        let outcome = parse_table(
            &RawTable::from_strings(training_rows()),
            &debit_credit_template(),
        );
        assert!(outcome.success);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.rows_processed, 3);
        assert_eq!(outcome.rows_skipped, 0);
        assert_eq!(outcome.transactions.len(), 3);

        let t = &outcome.transactions[0];
        assert_eq!(t.date, ymd(2024, 5, 12));
        assert_eq!(t.narration, "UPI-AMAZON");
        assert_eq!(t.withdrawal, Some(dec("1234.50")));
        assert_eq!(t.deposit, None);
        assert_eq!(t.balance, Some(dec("10000.00")));
        assert_eq!(t.raw_data[&SystemField::Withdrawal], "1,234.50");
        assert!(!t.raw_data.contains_key(&SystemField::Deposit));

        // A zero leg is absent, not a zero withdrawal.
        let t = &outcome.transactions[1];
        assert_eq!(t.withdrawal, None);
        assert_eq!(t.deposit, Some(dec("50000.00")));

        // Legs are unsigned.
        assert_eq!(outcome.transactions[2].withdrawal, Some(dec("500.00")));
    }

    #[test]
    fn test_missing_description_is_skipped() {
        let mut rows = training_rows();
        rows.push(vec!["15/05/2024", "", "10.00", "", "59,490.00"]);
        let outcome = parse_table(&RawTable::from_strings(rows), &debit_credit_template());
        assert_eq!(outcome.transactions.len(), 3);
        assert_eq!(outcome.rows_skipped, 1);
        assert_eq!(outcome.errors, vec!["Row 6: Missing narration/description"]);
    }

    #[test]
    fn test_merchant_stands_in_for_narration() {
        let mapping: FieldMapping = [
            (SystemField::Date, FieldSource::column(0)),
            (SystemField::Merchant, FieldSource::column(1)),
            (SystemField::Amount, FieldSource::column(2)),
        ]
        .into_iter()
        .collect();
        let table = RawTable::from_strings(vec![
            vec!["Date", "Merchant", "Amount"],
            vec!["2024-05-12", "Swiggy", "-250.00"],
            vec!["2024-05-13", "Refund", "0"],
        ]);
        let outcome = parse_table(&table, &template(mapping, &["Date", "Merchant", "Amount"]));
        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(outcome.transactions[0].merchant.as_deref(), Some("Swiggy"));
        assert_eq!(outcome.transactions[0].amount, Some(dec("-250.00")));
        // A zero signed amount is kept.
        assert_eq!(outcome.transactions[1].amount, Some(Decimal::ZERO));
    }

    #[test]
    fn test_row_rejections() {
        let mut rows = training_rows();
        rows.push(vec!["not a date", "X", "1.00", "", ""]);
        rows.push(vec!["16/05/2024", "Y", "", "", "1.00"]);
        rows.push(vec!["", "", "", "", ""]);
        let outcome = parse_table(&RawTable::from_strings(rows), &debit_credit_template());
        assert_eq!(outcome.transactions.len(), 3);
        assert_eq!(outcome.rows_processed, 6);
        assert_eq!(outcome.rows_skipped, 3);
        assert_eq!(
            outcome.errors,
            vec!["Row 6: Missing or invalid date", "Row 7: Missing amount"]
        );
    }

    #[test]
    fn test_relocates_shifted_header() {
        let training = parse_table(
            &RawTable::from_strings(training_rows()),
            &debit_credit_template(),
        );

        let mut shifted = training_rows();
        shifted.insert(1, vec!["", "", "", "", ""]);
        let rows = RawTable::from_strings(shifted);
        assert_eq!(
            locate_header_row(rows.rows(), &debit_credit_template().sample_headers),
            2
        );
        let outcome = parse_table(&rows, &debit_credit_template());
        assert_eq!(outcome.transactions.len(), training.transactions.len());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_header_threshold() {
        let headers: Vec<String> = ["Date", "Amount"].iter().map(|s| s.to_string()).collect();
        let rows = RawTable::from_strings(vec![
            vec!["Title", ""],
            vec!["DATE", "Other"],
            vec!["x", "y"],
        ]);
        // One of two stored headers meets min(3, 1).
        assert_eq!(locate_header_row(rows.rows(), &headers), 1);
        assert_eq!(locate_header_row(rows.rows(), &[]), 0);

        let five: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let rows = RawTable::from_strings(vec![vec!["a", "b"], vec!["a", "b", "c"]]);
        assert_eq!(locate_header_row(rows.rows(), &five), 1);
    }

    #[test]
    fn test_errors_are_capped() {
        let mut rows = vec![vec!["Date".to_string(), "Narration".to_string(), "Amount".to_string()]];
        for _ in 0..(MAX_ROW_ERRORS + 5) {
            rows.push(vec!["bad".to_string(), "x".to_string(), "1".to_string()]);
        }
        let mapping: FieldMapping = [
            (SystemField::Date, FieldSource::column(0)),
            (SystemField::Narration, FieldSource::column(1)),
            (SystemField::Amount, FieldSource::column(2)),
        ]
        .into_iter()
        .collect();
        let outcome = parse_table(
            &RawTable::from_strings(rows),
            &template(mapping, &["Date", "Narration", "Amount"]),
        );
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), MAX_ROW_ERRORS);
        assert_eq!(outcome.rows_skipped, MAX_ROW_ERRORS + 5);
    }

    #[tokio::test]
    async fn test_parse_file_routes_by_kind() {
        use crate::pdf::PdfExtractionError;
        use crate::test::TestPdfExtractor;

        let dir = tempfile::TempDir::new().unwrap();
        let csv = dir.path().join("may.csv");
        std::fs::write(
            &csv,
            "Statement of account,,,,\n\
             Date,Particulars,Debit,Credit,Balance\n\
             12/05/2024,UPI-AMAZON,\"1,234.50\",,\"10,000.00\"\n\
             13/05/2024,NEFT SALARY,0.00,\"50,000.00\",\"60,000.00\"\n\
             14/05/2024,ATM WDL,(500.00),,\"59,500.00\"\n",
        )
        .unwrap();

        let failing = TestPdfExtractor::with_error(PdfExtractionError::new("not called"));
        let outcome = parse_file(&csv, &debit_credit_template(), &failing, None)
            .await
            .unwrap();
        assert_eq!(outcome.transactions.len(), 3);
        assert_eq!(outcome.transactions[0].withdrawal, Some(dec("1234.50")));

        let err = parse_file(&dir.path().join("may.pdf"), &debit_credit_template(), &failing, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "not called");
    }
}
