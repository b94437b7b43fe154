//! Scores how well a file fits a learned template, using the template's detection patterns.

use crate::model::LearnedTemplate;
use regex::RegexBuilder;
use serde::Serialize;
use tracing::{debug, trace};

pub use crate::institution::{detect_institution, InstitutionGuess};

/// Awarded for each text pattern found in the document content.
const TEXT_WEIGHT: u32 = 10;
/// Awarded for each filename pattern found as a substring of the filename.
const FILENAME_WEIGHT: u32 = 5;
/// Awarded in addition when a filename pattern also matches as a regular expression.
const FILENAME_REGEX_WEIGHT: u32 = 8;
/// The score a template needs to count as matched.
pub const MATCH_THRESHOLD: u32 = 10;
/// The score that maps to full confidence.
const FULL_CONFIDENCE_SCORE: u32 = 30;

/// How well one template fits a file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub matched: bool,
    /// `score / 30`, capped at 1.
    pub confidence: f64,
    pub score: u32,
}

/// Scores `template` against a file's text content and name. Either may be absent.
pub fn match_template(
    content: Option<&str>,
    filename: Option<&str>,
    template: &LearnedTemplate,
) -> MatchResult {
    let patterns = &template.detection_patterns;
    let mut score = 0;

    if let Some(content) = content {
        let content = content.to_lowercase();
        score += patterns
            .text_patterns
            .iter()
            .filter(|p| !p.is_empty() && content.contains(&p.to_lowercase()))
            .count() as u32
            * TEXT_WEIGHT;
    }

    if let Some(filename) = filename {
        let lower = filename.to_lowercase();
        for pattern in patterns.filename_patterns.iter().filter(|p| !p.is_empty()) {
            if lower.contains(&pattern.to_lowercase()) {
                score += FILENAME_WEIGHT;
            }
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) if re.is_match(filename) => score += FILENAME_REGEX_WEIGHT,
                Ok(_) => {}
                Err(_) => trace!("Skipping filename pattern '{pattern}': not a valid regex"),
            }
        }
    }

    MatchResult {
        matched: score >= MATCH_THRESHOLD,
        confidence: (score as f64 / FULL_CONFIDENCE_SCORE as f64).min(1.0),
        score,
    }
}

/// Returns the matched template with the strictly highest score, and its result. The first
/// template seen wins a tie.
pub fn best_match<'a>(
    content: Option<&str>,
    filename: Option<&str>,
    templates: &'a [LearnedTemplate],
) -> Option<(&'a LearnedTemplate, MatchResult)> {
    let mut best: Option<(&LearnedTemplate, MatchResult)> = None;
    for template in templates {
        let result = match_template(content, filename, template);
        debug!(
            "Template {} '{}' scored {}",
            template.id, template.name, result.score
        );
        if !result.matched {
            continue;
        }
        if best.map_or(true, |(_, b)| result.score > b.score) {
            best = Some((template, result));
        }
    }
    best
}
