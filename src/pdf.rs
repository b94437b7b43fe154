//! The boundary to the external PDF text-extraction process.
//!
//! PDF statements are never read in-process. A collaborator program is run once per request with
//! the file path, an optional password and, when parsing, the template's field mapping. It prints
//! a single JSON object on stdout: either the result or `{"error": "..."}`.

use crate::config::PdfSettings;
use crate::extract::{suggest_mappings, ExtractError};
use crate::model::{
    DetectionPatterns, ExtractedField, ExtractionResult, FieldMapping, ParseOutcome, ValueType,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Reported instead of the collaborator's own wording for any password or encryption problem.
pub const PASSWORD_MESSAGE: &str =
    "PDF is password protected. Please provide the correct password.";

/// How many sample values are kept per column when converting a [`PdfStructure`].
const SAMPLE_VALUES: usize = 5;

/// A failure of the PDF collaborator. The message is the collaborator's own, or describes how the
/// process failed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PdfExtractionError {
    message: String,
}

impl PdfExtractionError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("password") || lower.contains("encrypt") {
            return Self {
                message: PASSWORD_MESSAGE.to_string(),
            };
        }
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for PdfExtractionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for PdfExtractionError {}

/// The table structure the collaborator found in a sample PDF.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PdfStructure {
    pub headers: Vec<String>,
    #[serde(default)]
    pub column_types: Vec<ValueType>,
    #[serde(default)]
    pub sample_rows: Vec<Vec<String>>,
    pub row_count: usize,
    #[serde(default)]
    pub header_row_index: usize,
    #[serde(default)]
    pub text_patterns: Vec<String>,
}

impl PdfStructure {
    /// The text the collaborator read from the PDF: its detected patterns, the header and the
    /// sample rows, one line each.
    pub fn text(&self) -> String {
        self.text_patterns
            .iter()
            .cloned()
            .chain(std::iter::once(self.headers.join(" ")))
            .chain(self.sample_rows.iter().map(|row| row.join(" ")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Converts the collaborator's findings into the same shape the tabular extractor produces,
    /// with a suggested mapping derived from the headers.
    pub fn into_extraction(self) -> Result<ExtractionResult, ExtractError> {
        if self.row_count == 0 {
            return Err(ExtractError::NoDataRows);
        }
        let columns: Vec<ExtractedField> = self
            .headers
            .iter()
            .enumerate()
            .map(|(index, name)| ExtractedField {
                index,
                name: name.clone(),
                inferred_type: self
                    .column_types
                    .get(index)
                    .copied()
                    .unwrap_or(ValueType::Unknown),
                sample_values: self
                    .sample_rows
                    .iter()
                    .filter_map(|row| row.get(index))
                    .filter(|v| !v.trim().is_empty())
                    .take(SAMPLE_VALUES)
                    .cloned()
                    .collect(),
            })
            .collect();
        let suggested_mappings = suggest_mappings(&columns);
        Ok(ExtractionResult {
            headers: self.headers,
            columns,
            sample_rows: self.sample_rows,
            row_count: self.row_count,
            header_row_index: self.header_row_index,
            suggested_mappings,
            detection_patterns: DetectionPatterns {
                text_patterns: self.text_patterns.into_iter().collect(),
                filename_patterns: Default::default(),
            },
        })
    }
}

/// Extracts structure from, and parses, PDF statements.
#[async_trait::async_trait]
pub trait PdfExtractor: Send + Sync {
    /// Finds the transaction table of a sample PDF.
    async fn extract_structure(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<PdfStructure, PdfExtractionError>;

    /// The text of a PDF, used to match it against templates and to guess its institution.
    async fn text(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<String, PdfExtractionError> {
        Ok(self.extract_structure(path, password).await?.text())
    }

    /// Parses a PDF with a learned field mapping. If the collaborator reports an error, no
    /// transactions are returned at all.
    async fn parse(
        &self,
        path: &Path,
        password: Option<&str>,
        mapping: &FieldMapping,
    ) -> Result<ParseOutcome, PdfExtractionError>;
}

/// Runs the configured collaborator commands as child processes.
#[derive(Debug, Clone)]
pub struct SubprocessPdfExtractor {
    settings: PdfSettings,
}

impl SubprocessPdfExtractor {
    pub fn new(settings: PdfSettings) -> Self {
        Self { settings }
    }

    /// Runs `command` with `args` appended and decodes its stdout.
    async fn run<T>(&self, command: &[String], args: Vec<String>) -> Result<T, PdfExtractionError>
    where
        T: DeserializeOwned,
    {
        let Some((program, base_args)) = command.split_first() else {
            return Err(PdfExtractionError::new(
                "No PDF extraction command is configured",
            ));
        };
        debug!("Running {program} {base_args:?} with {} arguments", args.len());
        let mut child = Command::new(program)
            .args(base_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PdfExtractionError::new(format!("Unable to start {program}: {e}")))?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(PdfExtractionError::new("The PDF extractor has no output pipes"));
        };

        let limit = self.settings.max_output_bytes;
        let (tx, rx) = tokio::sync::oneshot::channel::<Vec<u8>>();
        tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = stderr.take(limit as u64).read_to_end(&mut buf).await {
                debug!("Unable to read the PDF extractor stderr: {e}");
            }
            if tx.send(buf).is_err() {
                trace!("The PDF extractor stderr was not needed");
            }
        });

        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let finished = tokio::time::timeout(timeout, async {
            let mut out = Vec::new();
            stdout.take(limit as u64 + 1).read_to_end(&mut out).await?;
            if out.len() > limit {
                return Ok(None);
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(Some((status, out)))
        })
        .await;

        let (status, out) = match finished {
            Err(_) => {
                warn!("{program} did not finish within {}s", timeout.as_secs());
                return Err(PdfExtractionError::new(format!(
                    "PDF extraction timed out after {} seconds",
                    timeout.as_secs()
                )));
            }
            Ok(Err(e)) => {
                return Err(PdfExtractionError::new(format!(
                    "Unable to read the PDF extractor output: {e}"
                )))
            }
            Ok(Ok(None)) => {
                return Err(PdfExtractionError::new(format!(
                    "The PDF extractor produced more than {limit} bytes of output"
                )))
            }
            Ok(Ok(Some(done))) => done,
        };
        debug!("{program} exited with {status}");

        let decoded = decode::<T>(&out);
        if status.success() {
            return decoded.map_err(|e| match e {
                DecodeError::Reported(message) => PdfExtractionError::new(message),
                DecodeError::Invalid(e) => PdfExtractionError::new(format!(
                    "The PDF extractor returned invalid output: {e}"
                )),
            });
        }
        match decoded {
            Err(DecodeError::Reported(message)) => Err(PdfExtractionError::new(message)),
            _ => {
                let stderr = rx.await.unwrap_or_default();
                Err(PdfExtractionError::new(format!(
                    "The PDF extractor exited with {status}: {}",
                    String::from_utf8_lossy(&stderr).trim()
                )))
            }
        }
    }
}

enum DecodeError {
    /// The collaborator printed `{"error": "..."}`.
    Reported(String),
    Invalid(serde_json::Error),
}

/// Decodes collaborator output. An `error` member wins over anything else in the object.
fn decode<T: DeserializeOwned>(out: &[u8]) -> Result<T, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(out).map_err(DecodeError::Invalid)?;
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = match error.as_str() {
            Some(s) => s.to_string(),
            None => error.to_string(),
        };
        return Err(DecodeError::Reported(message));
    }
    serde_json::from_value(value).map_err(DecodeError::Invalid)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait::async_trait]
impl PdfExtractor for SubprocessPdfExtractor {
    async fn extract_structure(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<PdfStructure, PdfExtractionError> {
        let mut args = vec![path_arg(path)];
        args.extend(password.map(str::to_string));
        self.run(&self.settings.extract_command, args).await
    }

    async fn parse(
        &self,
        path: &Path,
        password: Option<&str>,
        mapping: &FieldMapping,
    ) -> Result<ParseOutcome, PdfExtractionError> {
        let mapping = serde_json::to_string(mapping).map_err(|e| {
            PdfExtractionError::new(format!("Unable to serialize the field mapping: {e}"))
        })?;
        let mut args = vec![path_arg(path), mapping];
        args.extend(password.map(str::to_string));
        let mut outcome: ParseOutcome = self.run(&self.settings.parse_command, args).await?;
        outcome.success = !outcome.transactions.is_empty();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSource, SystemField};

    fn shell(script: &str) -> Vec<String> {
        // `sh -c SCRIPT NAME ARGS...` exposes the appended arguments as $1, $2, ...
        vec!["sh".into(), "-c".into(), script.into(), "pdf".into()]
    }

    fn extractor(extract: &str, parse: &str, timeout_secs: u64) -> SubprocessPdfExtractor {
        SubprocessPdfExtractor::new(PdfSettings {
            extract_command: shell(extract),
            parse_command: shell(parse),
            timeout_secs,
            max_output_bytes: 4096,
        })
    }

    fn mapping() -> FieldMapping {
        [
            (SystemField::Date, FieldSource::column(0)),
            (SystemField::Narration, FieldSource::column(1)),
            (SystemField::Amount, FieldSource::column(2)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_password_messages_are_normalized() {
        assert_eq!(
            PdfExtractionError::new("file has not been decrypted").message(),
            "file has not been decrypted"
        );
        assert_eq!(
            PdfExtractionError::new("PdfminerException: Encrypted PDF").message(),
            PASSWORD_MESSAGE
        );
        assert_eq!(
            PdfExtractionError::new("incorrect password").message(),
            PASSWORD_MESSAGE
        );
    }

    #[test]
    fn test_structure_into_extraction() {
        let structure = PdfStructure {
            headers: vec!["Date".into(), "Narration".into(), "Withdrawal Amt.".into()],
            column_types: vec![ValueType::Date, ValueType::Text],
            sample_rows: vec![vec!["12/05/24".into(), "UPI".into(), "".into()]],
            row_count: 12,
            header_row_index: 1,
            text_patterns: vec!["hdfc bank".into()],
        };
        let result = structure.into_extraction().unwrap();
        assert_eq!(result.columns[2].inferred_type, ValueType::Unknown);
        assert!(result.columns[2].sample_values.is_empty());
        assert_eq!(result.row_count, 12);
        assert_eq!(
            result
                .suggested_mappings
                .get(SystemField::Withdrawal)
                .unwrap()
                .index(),
            2
        );
        assert!(result.detection_patterns.text_patterns.contains("hdfc bank"));

        let empty = PdfStructure {
            row_count: 0,
            ..Default::default()
        };
        assert_eq!(empty.into_extraction(), Err(ExtractError::NoDataRows));
    }

    #[tokio::test]
    async fn test_text() {
        let pdf = extractor(
            r#"echo '{"headers":["Date","Narration"],"sample_rows":[["01/04/2024","NEFT ACME"]],"row_count":1,"text_patterns":["hdfc bank","statement"]}'"#,
            "exit 1",
            10,
        );
        let text = pdf.text(Path::new("stmt.pdf"), None).await.unwrap();
        assert_eq!(text, "hdfc bank\nstatement\nDate Narration\n01/04/2024 NEFT ACME");
    }

    #[tokio::test]
    async fn test_extract_structure() {
        let pdf = extractor(
            r#"echo "{\"headers\":[\"Date\",\"$1\"],\"column_types\":[\"date\",\"text\"],\"sample_rows\":[],\"row_count\":3,\"header_row_index\":0,\"text_patterns\":[\"$2\"]}""#,
            "exit 1",
            10,
        );
        let s = pdf
            .extract_structure(Path::new("stmt.pdf"), Some("secret"))
            .await
            .unwrap();
        assert_eq!(s.headers, vec!["Date", "stmt.pdf"]);
        assert_eq!(s.text_patterns, vec!["secret"]);
        assert_eq!(s.row_count, 3);
    }

    #[tokio::test]
    async fn test_parse() {
        let pdf = extractor(
            "exit 1",
            r#"echo '{"transactions":[{"date":"2024-05-12","narration":"UPI","amount":-10.5,"raw_data":{"date":"12/05/2024"}}],"errors":["Row 4: Missing amount"],"rows_processed":2,"rows_skipped":1}'"#,
            10,
        );
        let outcome = pdf
            .parse(Path::new("stmt.pdf"), None, &mapping())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.rows_processed, 2);
        assert_eq!(outcome.rows_skipped, 1);
        assert_eq!(outcome.errors, vec!["Row 4: Missing amount"]);
    }

    #[tokio::test]
    async fn test_reported_error_discards_transactions() {
        let pdf = extractor(
            "exit 1",
            r#"echo '{"error":"No tables found in PDF","transactions":[{"date":"2024-05-12","narration":"x","amount":1}]}'"#,
            10,
        );
        let e = pdf
            .parse(Path::new("stmt.pdf"), None, &mapping())
            .await
            .unwrap_err();
        assert_eq!(e.message(), "No tables found in PDF");
    }

    #[tokio::test]
    async fn test_password_error() {
        let pdf = extractor(
            r#"echo '{"error":"PDF is password protected. Please provide the correct password."}'; exit 1"#,
            "exit 1",
            10,
        );
        let e = pdf
            .extract_structure(Path::new("stmt.pdf"), None)
            .await
            .unwrap_err();
        assert_eq!(e.message(), PASSWORD_MESSAGE);
    }

    #[tokio::test]
    async fn test_process_failures() {
        let pdf = extractor("echo boom >&2; exit 3", "echo not json", 10);
        let e = pdf
            .extract_structure(Path::new("stmt.pdf"), None)
            .await
            .unwrap_err();
        assert!(e.message().contains("boom"), "{}", e.message());

        let e = pdf
            .parse(Path::new("stmt.pdf"), None, &mapping())
            .await
            .unwrap_err();
        assert!(e.message().contains("invalid output"), "{}", e.message());

        let missing = SubprocessPdfExtractor::new(PdfSettings {
            extract_command: vec![],
            ..PdfSettings::default()
        });
        assert!(missing
            .extract_structure(Path::new("stmt.pdf"), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_stderr_is_capped() {
        let pdf = extractor("head -c 10000 /dev/zero | tr '\\0' x >&2; exit 2", "exit 1", 10);
        let e = pdf
            .extract_structure(Path::new("stmt.pdf"), None)
            .await
            .unwrap_err();
        assert!(e.message().contains("exited with"), "{}", e.message());
        assert!(e.message().ends_with(&"x".repeat(4096)), "{}", e.message());
        assert!(!e.message().contains(&"x".repeat(4097)));
    }

    #[tokio::test]
    async fn test_timeout_and_output_cap() {
        let pdf = extractor("sleep 10", "head -c 10000 /dev/zero", 1);
        let e = pdf
            .extract_structure(Path::new("stmt.pdf"), None)
            .await
            .unwrap_err();
        assert!(e.message().contains("timed out"), "{}", e.message());

        let e = pdf
            .parse(Path::new("stmt.pdf"), None, &mapping())
            .await
            .unwrap_err();
        assert!(e.message().contains("more than 4096 bytes"), "{}", e.message());
    }
}
