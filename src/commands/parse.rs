use crate::args::ParseArgs;
use crate::commands::{file_text, Out};
use crate::db::TemplateStore;
use crate::matcher::{best_match, MatchResult};
use crate::model::{format_amount, LearnedTemplate, ParseOutcome};
use crate::parser::parse_file;
use crate::pdf::{PdfExtractor, SubprocessPdfExtractor};
use crate::{utils, Config, Result};
use anyhow::{bail, Context};
use format_num::format_num;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

/// The template a file was parsed with and the result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseReport {
    pub template_id: i64,
    pub template_name: String,
    /// Present when the template was chosen by matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchResult>,
    pub outcome: ParseOutcome,
}

/// Parses `args.file()` with the requested template, or with the best matching active template.
/// Usage of the template is recorded when at least one transaction was parsed.
pub async fn parse(config: Config, args: ParseArgs) -> Result<Out<ParseReport>> {
    let pdf = SubprocessPdfExtractor::new(config.pdf().clone());
    parse_with(config.db(), config.owner(), &pdf, args).await
}

pub(crate) async fn parse_with(
    store: &dyn TemplateStore,
    owner: &str,
    pdf: &dyn PdfExtractor,
    args: ParseArgs,
) -> Result<Out<ParseReport>> {
    let path = args.file();
    let (template, matched) = match args.template() {
        Some(id) => {
            let Some(template) = store.get(owner, id).await? else {
                bail!("Template {id} was not found");
            };
            (template, None)
        }
        None => {
            let (template, result) =
                choose_template(store, owner, pdf, path, args.password()).await?;
            (template, Some(result))
        }
    };

    let outcome = parse_file(path, &template, pdf, args.password())
        .await
        .with_context(|| format!("Unable to parse {}", path.display()))?;
    if outcome.success {
        store.record_usage(owner, template.id).await?;
    }

    let message = if outcome.success {
        let net: Decimal = outcome.transactions.iter().filter_map(|t| t.net()).sum();
        format!(
            "Parsed {} transactions from {} with template {} '{}' ({} rows skipped, net {})",
            format_num!(",d", outcome.transactions.len() as f64),
            path.display(),
            template.id,
            template.name,
            outcome.rows_skipped,
            format_amount(net)
        )
    } else {
        let first = outcome.errors.first().map(String::as_str).unwrap_or("");
        format!(
            "No transactions were parsed from {} with template {} '{}'. {first}",
            path.display(),
            template.id,
            template.name
        )
    };
    let report = ParseReport {
        template_id: template.id,
        template_name: template.name,
        matched,
        outcome,
    };
    Ok(Out::new(message, report))
}

async fn choose_template(
    store: &dyn TemplateStore,
    owner: &str,
    pdf: &dyn PdfExtractor,
    path: &std::path::Path,
    password: Option<&str>,
) -> Result<(LearnedTemplate, MatchResult)> {
    let templates = store.list_active(owner).await?;
    if templates.is_empty() {
        bail!("There are no active templates. Use `learner learn` to create one");
    }
    let text = file_text(path, pdf, password).await?;
    let Some((template, result)) = best_match(text.as_deref(), utils::file_name(path), &templates)
    else {
        bail!(
            "No active template matches {}. Pass --template to choose one",
            path.display()
        );
    };
    info!(
        "Using template {} '{}' (confidence {:.2})",
        template.id, template.name, result.confidence
    );
    Ok((template.clone(), result))
}
