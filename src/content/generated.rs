//! Generated content: the versioned output of one pipeline run.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::content::ContentBrief;
use crate::quality::QualityAssessment;

/// Publication state of a generated piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    /// Produced but not yet past the quality gate.
    Draft,
    /// Met the quality bar.
    Approved,
    /// Exhausted the rewrite budget or was judged unsalvageable; a human
    /// decides what happens next.
    NeedsReview,
}

/// Derive a URL-safe slug from a keyword. Deterministic: the same keyword
/// always yields the same slug.
pub fn slugify(keyword: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    // Static pattern; compilation cannot fail.
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));
    let lowered = keyword.to_lowercase();
    re.replace_all(&lowered, "-").trim_matches('-').to_owned()
}

/// Split generated text into a title and body.
///
/// A leading Markdown heading becomes the title; otherwise the keyword is
/// used as-is and the whole text is the body.
pub(crate) fn split_title(text: &str, fallback: &str) -> (String, String) {
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix('#') {
        if let Some((first_line, body)) = rest.split_once('\n') {
            let title = first_line.trim_start_matches('#').trim();
            if !title.is_empty() {
                return (title.to_owned(), body.trim_start().to_owned());
            }
        }
    }
    (fallback.to_owned(), text.to_owned())
}

/// One piece of generated content, versioned in place through the rewrite
/// loop and handed to the caller at termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    /// Unique content identifier.
    pub id: String,
    /// Brief this content was generated from.
    pub brief_id: String,
    /// Category of the content.
    pub content_type: super::ContentType,
    /// Display title.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Primary keyword the content targets.
    pub target_keyword: String,
    /// URL-safe slug, derived deterministically from the keyword.
    pub slug: String,
    /// Version number; 1 for the draft, +1 per rewrite.
    pub version: u32,
    /// Publication state.
    pub status: ContentStatus,
    /// Latest quality assessment, once the gate has run.
    pub quality: Option<QualityAssessment>,
    /// Tokens consumed so far across draft, assessments, and rewrites.
    pub tokens_used: u64,
    /// Cost accumulated so far in USD.
    pub estimated_cost: f64,
    /// Wall-clock generation time accumulated so far.
    pub generation_time_ms: u64,
    /// Rewrite iterations executed.
    pub rewrite_count: u32,
    /// Rewrite iterations allowed.
    pub max_rewrites: u32,
}

impl GeneratedContent {
    /// Create version 1 from the draft text.
    pub fn draft(brief: &ContentBrief, text: &str, max_rewrites: u32) -> Self {
        let (title, body) = split_title(text, &brief.target_keyword);
        Self {
            id: super::next_id("content"),
            brief_id: brief.id.clone(),
            content_type: brief.content_type,
            title,
            body,
            target_keyword: brief.target_keyword.clone(),
            slug: slugify(&brief.target_keyword),
            version: 1,
            status: ContentStatus::Draft,
            quality: None,
            tokens_used: 0,
            estimated_cost: 0.0,
            generation_time_ms: 0,
            rewrite_count: 0,
            max_rewrites,
        }
    }

    /// Replace the text with a rewritten version, bumping the version and
    /// rewrite counters.
    pub fn apply_rewrite(&mut self, text: &str) {
        let (title, body) = split_title(text, &self.target_keyword);
        self.title = title;
        self.body = body;
        self.version += 1;
        self.rewrite_count += 1;
    }

    /// Accumulate token, cost, and timing usage. All three fields are
    /// monotonically non-decreasing across a run.
    pub fn record_usage(&mut self, tokens: u64, cost: f64, elapsed_ms: u64) {
        self.tokens_used += tokens;
        self.estimated_cost += cost.max(0.0);
        self.generation_time_ms += elapsed_ms;
    }

    /// Attach the latest assessment.
    pub fn attach_assessment(&mut self, assessment: QualityAssessment) {
        self.quality = Some(assessment);
    }

    /// Word count of the body.
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}
