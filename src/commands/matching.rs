use crate::args::MatchArgs;
use crate::commands::{file_text, Out};
use crate::db::TemplateStore;
use crate::matcher::{match_template, MatchResult};
use crate::pdf::{PdfExtractor, SubprocessPdfExtractor};
use crate::{utils, Config, Result};
use serde::Serialize;

/// How one template scored against a file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateScore {
    pub template_id: i64,
    pub name: String,
    pub institution: String,
    #[serde(flatten)]
    pub result: MatchResult,
}

/// Scores every active template against `args.file()`, best first.
pub async fn match_file(config: Config, args: MatchArgs) -> Result<Out<Vec<TemplateScore>>> {
    let pdf = SubprocessPdfExtractor::new(config.pdf().clone());
    match_with(config.db(), config.owner(), &pdf, args).await
}

pub(crate) async fn match_with(
    store: &dyn TemplateStore,
    owner: &str,
    pdf: &dyn PdfExtractor,
    args: MatchArgs,
) -> Result<Out<Vec<TemplateScore>>> {
    let path = args.file();
    let templates = store.list_active(owner).await?;
    let text = file_text(path, pdf, args.password()).await?;
    let filename = utils::file_name(path);

    let mut scores: Vec<TemplateScore> = templates
        .into_iter()
        .map(|t| TemplateScore {
            result: match_template(text.as_deref(), filename, &t),
            template_id: t.id,
            name: t.name,
            institution: t.institution,
        })
        .collect();
    // Stable, so equal scores keep the oldest template first.
    scores.sort_by(|a, b| b.result.score.cmp(&a.result.score));

    let message = match scores.first().filter(|s| s.result.matched) {
        Some(best) => format!(
            "{} matches template {} '{}' with confidence {:.2}",
            path.display(),
            best.template_id,
            best.name,
            best.result.confidence
        ),
        None => format!(
            "None of the {} active templates match {}",
            scores.len(),
            path.display()
        ),
    };
    Ok(Out::new(message, scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DetectionPatterns, FieldMapping, FileKind, NewTemplate};
    use crate::test::{TestEnv, TestPdfExtractor};

    fn new_template(name: &str, text: &[&str], filename: &[&str]) -> NewTemplate {
        NewTemplate {
            name: name.to_string(),
            institution: "Kotak Mahindra Bank".to_string(),
            statement_type: "savings".to_string(),
            file_kind: FileKind::DelimitedText,
            field_mapping: FieldMapping::new(),
            detection_patterns: DetectionPatterns {
                text_patterns: text.iter().map(|s| s.to_string()).collect(),
                filename_patterns: filename.iter().map(|s| s.to_string()).collect(),
            },
            sample_headers: vec![],
            sample_rows: vec![],
        }
    }

    #[tokio::test]
    async fn test_match_scores_active_templates() {
        let env = TestEnv::new().await;
        let config = env.config();
        let db = config.db();
        let owner = config.owner();
        let weak = db
            .create(owner, new_template("weak", &[], &["kotak"]))
            .await
            .unwrap();
        let strong = db
            .create(owner, new_template("strong", &["kotak mahindra"], &["kotak"]))
            .await
            .unwrap();
        let inactive = db
            .create(owner, new_template("inactive", &["kotak mahindra"], &[]))
            .await
            .unwrap();
        db.set_active(owner, inactive.id, false).await.unwrap();

        let path = env
            .write_file("kotak_may.csv", "Kotak Mahindra Bank\nDate,Description,Amount\n")
            .await;
        let pdf = TestPdfExtractor::default();
        let out = match_with(db, owner, &pdf, MatchArgs::new(&path))
            .await
            .unwrap();
        let scores = out.structure().unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].template_id, strong.id);
        // 10 for the text pattern, 5 + 8 for the filename pattern.
        assert_eq!(scores[0].result.score, 23);
        assert_eq!(scores[1].template_id, weak.id);
        assert!(scores[1].result.matched);
        assert!(out.message().contains("'strong'"));
    }

    #[tokio::test]
    async fn test_no_templates_match() {
        let env = TestEnv::new().await;
        let config = env.config();
        let path = env.write_file("x.csv", "Date,Description,Amount\n").await;
        let pdf = TestPdfExtractor::default();
        let out = match_with(config.db(), config.owner(), &pdf, MatchArgs::new(&path))
            .await
            .unwrap();
        assert!(out.structure().unwrap().is_empty());
        assert!(out.message().starts_with("None of the 0"));
    }
}
