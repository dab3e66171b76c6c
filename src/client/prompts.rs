//! Prompt assembly for the three pipeline operations.
//!
//! Pure string formatting; all control flow of interest lives in the
//! client and pipeline.

use std::fmt::Write as _;

use crate::content::ContentBrief;
use crate::quality::QualityIssue;

/// System prompt for draft and rewrite calls.
pub(crate) fn writer_system(brief: &ContentBrief) -> String {
    let mut system = format!(
        "You are a senior travel-marketing copywriter producing {} content. \
         Write in a {} tone. Start with a single Markdown H1 title line.",
        brief.content_type.as_str().replace('_', " "),
        brief.tone.as_str(),
    );
    if let Some(voice) = &brief.brand_voice {
        let _ = write!(system, " Brand voice: {voice}");
    }
    system
}

/// User prompt for the initial draft.
pub(crate) fn draft_prompt(brief: &ContentBrief) -> String {
    let mut prompt = format!(
        "Write content targeting the keyword \"{}\" for site {}. \
         Length: {}-{} words.",
        brief.target_keyword, brief.site_id, brief.target_length.min, brief.target_length.max,
    );
    if !brief.secondary_keywords.is_empty() {
        let _ = write!(
            prompt,
            " Work in these secondary keywords where natural: {}.",
            brief.secondary_keywords.join(", ")
        );
    }
    if let Some(destination) = &brief.destination {
        let _ = write!(prompt, " Destination: {destination}.");
    }
    if let Some(category) = &brief.category {
        let _ = write!(prompt, " Category: {category}.");
    }
    if !brief.source_data.is_empty() {
        prompt.push_str("\n\nUse only these verified facts:\n");
        for (label, fact) in &brief.source_data {
            let _ = writeln!(prompt, "- {label}: {fact}");
        }
    }
    prompt
}

/// System prompt for assessment calls.
pub(crate) fn assessor_system() -> String {
    "You are a strict content quality reviewer. Respond with a single JSON \
     object and nothing else."
        .to_owned()
}

/// User prompt asking for a structured assessment of `body`.
pub(crate) fn assess_prompt(body: &str, brief: &ContentBrief) -> String {
    let mut prompt = format!(
        "Assess the content below, written for keyword \"{}\" ({}-{} words, {} tone).\n\
         Score each dimension 0-100 and list concrete issues.\n\
         Reply with JSON exactly in this shape:\n\
         {{\"factual_accuracy\": 0, \"seo_compliance\": 0, \"readability\": 0, \
         \"uniqueness\": 0, \"engagement\": 0, \
         \"issues\": [{{\"type\": \"factual|seo|readability|uniqueness|engagement\", \
         \"severity\": \"low|medium|high|critical\", \"location\": \"\", \
         \"description\": \"\", \"suggestion\": \"\"}}], \
         \"suggestions\": [\"\"]}}\n",
        brief.target_keyword, brief.target_length.min, brief.target_length.max,
        brief.tone.as_str(),
    );
    if !brief.source_data.is_empty() {
        prompt.push_str("\nJudge factual accuracy against these facts:\n");
        for (label, fact) in &brief.source_data {
            let _ = writeln!(prompt, "- {label}: {fact}");
        }
    }
    let _ = write!(prompt, "\n---\n{body}");
    prompt
}

/// User prompt asking for a rewrite of the current version.
///
/// The rewrite always builds on the latest text, not the original draft;
/// issues come from the latest assessment.
pub(crate) fn rewrite_prompt(
    body: &str,
    issues: &[QualityIssue],
    suggestions: &[String],
    brief: &ContentBrief,
) -> String {
    let mut prompt = format!(
        "Revise the content below for keyword \"{}\". Fix every issue listed, \
         keep what already works, and stay within {}-{} words.\n\nIssues:\n",
        brief.target_keyword, brief.target_length.min, brief.target_length.max,
    );
    for issue in issues {
        let _ = writeln!(
            prompt,
            "- [{}/{}] {}",
            issue.severity.as_str(),
            issue.issue_type.as_str(),
            issue.description
        );
    }
    if !suggestions.is_empty() {
        prompt.push_str("\nSuggestions:\n");
        for suggestion in suggestions {
            let _ = writeln!(prompt, "- {suggestion}");
        }
    }
    let _ = write!(prompt, "\n---\n{body}");
    prompt
}
