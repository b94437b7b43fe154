use crate::args::LearnArgs;
use crate::commands::{table_text, Out};
use crate::matcher::detect_institution;
use crate::model::{ExtractionResult, FieldMapping, FileKind, LearnedTemplate};
use crate::pdf::SubprocessPdfExtractor;
use crate::session::{SessionController, SessionError, Status, TemplateDetails};
use crate::{Config, Result};
use anyhow::{anyhow, bail};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

const UNKNOWN_INSTITUTION: &str = "Unknown";

/// What a learning run found and, unless it was a dry run, the template it created.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnReport {
    pub extraction: ExtractionResult,
    pub mapping: FieldMapping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<LearnedTemplate>,
}

/// Runs one learning session over `args.file()`: extraction, the manual overrides from `args`,
/// confirmation and template creation.
pub async fn learn(config: Config, args: LearnArgs) -> Result<Out<LearnReport>> {
    let pdf = SubprocessPdfExtractor::new(config.pdf().clone());
    let sessions = SessionController::new(
        config.owner(),
        Arc::new(config.db().clone()),
        Arc::new(pdf),
    );
    learn_with(&sessions, args).await
}

pub(crate) async fn learn_with(
    sessions: &SessionController,
    args: LearnArgs,
) -> Result<Out<LearnReport>> {
    let id = sessions
        .start_session(args.file(), args.password().map(str::to_string))
        .await;
    let snapshot = sessions.wait_session(id).await?;
    if snapshot.status == Status::Failed {
        let error = snapshot.error.unwrap_or_default();
        sessions.abandon_session(id).await?;
        bail!("Unable to learn from {}: {error}", args.file().display());
    }

    for field in args.unassigned() {
        sessions.unassign_field(id, *field).await?;
    }
    for assignment in args.assignments() {
        sessions
            .assign_field(id, assignment.field, assignment.column)
            .await?;
    }
    let snapshot = sessions.poll_session(id).await?;
    let extraction = snapshot
        .extraction_result
        .ok_or_else(|| anyhow!("The session has no extraction result"))?;
    let mapping = snapshot.mapping.unwrap_or_default();
    debug!("Working mapping: {}", serde_json::to_string(&mapping)?);

    if args.dry_run() {
        sessions.abandon_session(id).await?;
        let message = match mapping.validate(Some(extraction.columns.len())) {
            Ok(()) => format!(
                "Dry run: found {} data rows with header row {}; the mapping is usable",
                extraction.row_count, extraction.header_row_index
            ),
            Err(e) => format!(
                "Dry run: found {} data rows with header row {}; {e}",
                extraction.row_count, extraction.header_row_index
            ),
        };
        let report = LearnReport {
            extraction,
            mapping,
            template: None,
        };
        return Ok(Out::new(message, report));
    }

    match sessions.confirm_mapping(id, None).await {
        Ok(_) => {}
        Err(SessionError::Mapping(e)) => {
            sessions.abandon_session(id).await?;
            bail!("{e}. Use --map field=column to choose the columns");
        }
        Err(e) => return Err(e.into()),
    }

    let mut patterns = extraction.detection_patterns.clone();
    patterns
        .text_patterns
        .extend(args.text_patterns().iter().map(|p| p.trim().to_lowercase()));
    patterns
        .filename_patterns
        .extend(args.filename_patterns().iter().cloned());

    let institution = match args.institution() {
        Some(institution) => institution.to_string(),
        None => guess_institution(&args, &extraction).await,
    };

    let template = sessions
        .finalize_template(
            id,
            TemplateDetails {
                name: args.name().to_string(),
                institution,
                statement_type: args.statement_type().to_string(),
                detection_patterns: Some(patterns),
            },
        )
        .await?;
    let message = format!(
        "Learned template {} '{}' for {} from {} data rows",
        template.id, template.name, template.institution, extraction.row_count
    );
    let report = LearnReport {
        extraction,
        mapping,
        template: Some(template),
    };
    Ok(Out::new(message, report))
}

/// Guesses the institution from the sample's leading rows. For a PDF the text the collaborator
/// already returned during extraction is used instead of reading the file again.
async fn guess_institution(args: &LearnArgs, extraction: &ExtractionResult) -> String {
    let text = if FileKind::from_path(args.file()) == Some(FileKind::Pdf) {
        extraction_text(extraction)
    } else {
        match table_text(args.file()).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "Unable to read {} for an institution guess: {e:#}",
                    args.file().display()
                );
                extraction_text(extraction)
            }
        }
    };
    match detect_institution(&text) {
        Some(guess) => {
            debug!(
                "Guessed institution {} with confidence {:.2}",
                guess.institution, guess.confidence
            );
            guess.institution
        }
        None => UNKNOWN_INSTITUTION.to_string(),
    }
}

fn extraction_text(extraction: &ExtractionResult) -> String {
    extraction
        .detection_patterns
        .text_patterns
        .iter()
        .cloned()
        .chain(std::iter::once(extraction.headers.join(" ")))
        .chain(extraction.sample_rows.iter().map(|row| row.join(" ")))
        .collect::<Vec<_>>()
        .join("\n")
}
