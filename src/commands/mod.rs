//! Command handlers for the learner CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod init;
mod learn;
mod matching;
mod parse;
mod templates;

use crate::extract::HEADER_SCAN_ROWS;
use crate::model::FileKind;
use crate::pdf::PdfExtractor;
use crate::reader::read_table;
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::fmt::Debug;
use std::path::Path;
use tracing::{debug, info, warn};

pub use init::init;
pub use learn::{learn, LearnReport};
pub use matching::{match_file, TemplateScore};
pub use parse::{parse, ParseReport};
pub use templates::{
    activate_template, deactivate_template, list_templates, set_template_patterns, show_template,
};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// The text content of a statement for template matching and institution guessing: the rows a
/// header can be found in for tables, or what the collaborator reads from a PDF. A PDF the
/// collaborator cannot read is matched by file name only.
async fn file_text(
    path: &Path,
    pdf: &dyn PdfExtractor,
    password: Option<&str>,
) -> Result<Option<String>> {
    if FileKind::from_path(path) == Some(FileKind::Pdf) {
        return match pdf.text(path, password).await {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                warn!("Matching {} by file name only: {e}", path.display());
                Ok(None)
            }
        };
    }
    table_text(path).await.map(Some)
}

/// The leading rows of a spreadsheet or delimited file as text.
async fn table_text(path: &Path) -> Result<String> {
    let owned = path.to_path_buf();
    let table = tokio::task::spawn_blocking(move || read_table(&owned))
        .await
        .context("The reader task failed")??;
    Ok(table.head_text(HEADER_SCAN_ROWS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{PdfExtractionError, PdfStructure};
    use crate::test::{TestEnv, TestPdfExtractor};

    #[tokio::test]
    async fn test_file_text() {
        let env = TestEnv::new().await;
        let rows: Vec<String> = (0..40).map(|i| format!("row {i},x")).collect();
        let path = env.write_file("long.csv", &rows.join("\n")).await;
        let text = file_text(&path, &TestPdfExtractor::default(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text.lines().count(), HEADER_SCAN_ROWS);
        assert!(text.contains("row 14 x"));
        assert!(!text.contains("row 15 x"));

        let pdf = TestPdfExtractor::with_structure(PdfStructure {
            headers: vec!["Date".into(), "Amount".into()],
            row_count: 1,
            text_patterns: vec!["axis bank".into()],
            ..Default::default()
        });
        let pdf_path = env.root().join("axis.pdf");
        let text = file_text(&pdf_path, &pdf, None).await.unwrap().unwrap();
        assert!(text.contains("axis bank"));

        let locked = TestPdfExtractor::with_error(PdfExtractionError::new("encrypted"));
        assert!(file_text(&pdf_path, &locked, None).await.unwrap().is_none());
    }
}
