use crate::args::PatternArgs;
use crate::commands::Out;
use crate::db::TemplateStore;
use crate::model::{DetectionPatterns, LearnedTemplate};
use crate::{Config, Result};
use anyhow::bail;

/// Lists every template of the configured owner, oldest first.
pub async fn list_templates(config: Config) -> Result<Out<Vec<LearnedTemplate>>> {
    let templates = config.db().list(config.owner()).await?;
    let active = templates.iter().filter(|t| t.is_active).count();
    let mut lines = vec![format!(
        "{} templates ({active} active)",
        templates.len()
    )];
    for t in &templates {
        lines.push(format!(
            "  {:>4}  {}  {} / {} / {}  used {} times",
            t.id,
            if t.is_active { "active  " } else { "inactive" },
            t.name,
            t.institution,
            t.file_kind,
            t.times_used
        ));
    }
    Ok(Out::new(lines.join("\n"), templates))
}

pub async fn show_template(config: Config, id: i64) -> Result<Out<LearnedTemplate>> {
    let template = get(&config, id).await?;
    let message = format!(
        "Template {} '{}': {} {} ({}), mapping {}",
        template.id,
        template.name,
        template.institution,
        template.statement_type,
        template.file_kind,
        serde_json::to_string(&template.field_mapping)?
    );
    Ok(Out::new(message, template))
}

pub async fn activate_template(config: Config, id: i64) -> Result<Out<()>> {
    config.db().set_active(config.owner(), id, true).await?;
    Ok(format!("Template {id} is active").into())
}

/// Deactivated templates are kept but no longer take part in matching.
pub async fn deactivate_template(config: Config, id: i64) -> Result<Out<()>> {
    config.db().set_active(config.owner(), id, false).await?;
    Ok(format!("Template {id} is inactive").into())
}

/// Replaces the detection patterns of a template.
pub async fn set_template_patterns(
    config: Config,
    args: PatternArgs,
) -> Result<Out<LearnedTemplate>> {
    let patterns = DetectionPatterns {
        text_patterns: args
            .text_patterns()
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect(),
        filename_patterns: args.filename_patterns().iter().cloned().collect(),
    };
    if patterns.is_empty() {
        bail!("Give at least one --text-pattern or --filename-pattern");
    }
    config
        .db()
        .update_patterns(config.owner(), args.id(), patterns)
        .await?;
    let template = get(&config, args.id()).await?;
    Ok(Out::new(
        format!("Updated the detection patterns of template {}", template.id),
        template,
    ))
}

async fn get(config: &Config, id: i64) -> Result<LearnedTemplate> {
    match config.db().get(config.owner(), id).await? {
        Some(template) => Ok(template),
        None => bail!("Template {id} was not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMapping, FileKind, NewTemplate};
    use crate::test::TestEnv;

    async fn create(env: &TestEnv) -> LearnedTemplate {
        let template = NewTemplate {
            name: "SBI savings".to_string(),
            institution: "State Bank of India".to_string(),
            statement_type: "savings".to_string(),
            file_kind: FileKind::Spreadsheet,
            field_mapping: FieldMapping::new(),
            detection_patterns: DetectionPatterns::default(),
            sample_headers: vec![],
            sample_rows: vec![],
        };
        env.config()
            .db()
            .create(env.config().owner(), template)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_and_show() {
        let env = TestEnv::new().await;
        let template = create(&env).await;
        let out = list_templates(env.config()).await.unwrap();
        assert!(out.message().starts_with("1 templates (1 active)"));
        assert!(out.message().contains("SBI savings"));
        let out = show_template(env.config(), template.id).await.unwrap();
        assert_eq!(out.structure().unwrap(), &template);
        assert!(show_template(env.config(), template.id + 1).await.is_err());
    }

    #[tokio::test]
    async fn test_activation() {
        let env = TestEnv::new().await;
        let template = create(&env).await;
        deactivate_template(env.config(), template.id).await.unwrap();
        let out = list_templates(env.config()).await.unwrap();
        assert!(out.message().starts_with("1 templates (0 active)"));
        activate_template(env.config(), template.id).await.unwrap();
        assert!(show_template(env.config(), template.id)
            .await
            .unwrap()
            .structure()
            .unwrap()
            .is_active);
        assert!(activate_template(env.config(), 404).await.is_err());
    }

    #[tokio::test]
    async fn test_set_patterns() {
        let env = TestEnv::new().await;
        let template = create(&env).await;
        let args = PatternArgs::new(
            template.id,
            vec!["  State Bank of India ".to_string()],
            vec![r"^sbi_\d+".to_string()],
        );
        let out = set_template_patterns(env.config(), args).await.unwrap();
        let patterns = &out.structure().unwrap().detection_patterns;
        assert!(patterns.text_patterns.contains("state bank of india"));
        assert!(patterns.filename_patterns.contains(r"^sbi_\d+"));

        let empty = PatternArgs::new(template.id, vec![], vec![]);
        assert!(set_template_patterns(env.config(), empty).await.is_err());
    }
}
