//! Quality assessment model: scores, issues, severities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weights applied to the five breakdown scores, in breakdown field order:
/// factual accuracy, SEO compliance, readability, uniqueness, engagement.
///
/// Must sum to exactly 1.0 (test invariant).
pub const SCORE_WEIGHTS: [f64; 5] = [0.25, 0.20, 0.15, 0.20, 0.20];

/// Category of a quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// Claims that contradict the provided facts or common knowledge.
    Factual,
    /// Keyword targeting, structure, or metadata problems.
    Seo,
    /// Prose that is hard to follow.
    Readability,
    /// Generic or duplicated phrasing.
    Uniqueness,
    /// Flat openings, weak calls to action.
    Engagement,
}

impl IssueType {
    /// Stable label used in prompts and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Factual => "factual",
            IssueType::Seo => "seo",
            IssueType::Readability => "readability",
            IssueType::Uniqueness => "uniqueness",
            IssueType::Engagement => "engagement",
        }
    }

    /// Map a free-form label to the closest category. Unrecognized labels
    /// default to `Factual`, the category that always warrants a look.
    pub fn normalize(label: &str) -> Self {
        let lowered = label.to_lowercase();
        if lowered.contains("seo") || lowered.contains("keyword") {
            IssueType::Seo
        } else if lowered.contains("read") {
            IssueType::Readability
        } else if lowered.contains("uniq") || lowered.contains("dup") || lowered.contains("plagiar")
        {
            IssueType::Uniqueness
        } else if lowered.contains("engag") {
            IssueType::Engagement
        } else {
            IssueType::Factual
        }
    }
}

/// How urgently an issue must be addressed. Totally ordered:
/// `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Stable label used in prompts and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Map a free-form label to the closest severity. Unrecognized labels
    /// default to `Medium`.
    pub fn normalize(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "low" | "minor" | "info" => Severity::Low,
            "high" | "major" => Severity::High,
            "critical" | "blocker" | "severe" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

/// One classified problem with the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Category of the issue.
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// Urgency of the issue.
    pub severity: Severity,
    /// Where in the content the issue occurs, when known.
    pub location: Option<String>,
    /// What is wrong.
    pub description: String,
    /// How to fix it, when the assessor offered one.
    pub suggestion: Option<String>,
}

/// The five sub-scores, each 0..=100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub factual_accuracy: u8,
    pub seo_compliance: u8,
    pub readability: u8,
    pub uniqueness: u8,
    pub engagement: u8,
}

impl ScoreBreakdown {
    /// Sub-scores in weight order.
    pub fn scores(&self) -> [u8; 5] {
        [
            self.factual_accuracy,
            self.seo_compliance,
            self.readability,
            self.uniqueness,
            self.engagement,
        ]
    }

    /// Category labels in weight order, matching [`IssueType`].
    pub fn categories() -> [IssueType; 5] {
        [
            IssueType::Factual,
            IssueType::Seo,
            IssueType::Readability,
            IssueType::Uniqueness,
            IssueType::Engagement,
        ]
    }

    /// Weighted overall score, rounded to the nearest integer.
    pub fn weighted_overall(&self) -> u8 {
        let weight_sum: f64 = SCORE_WEIGHTS.iter().sum();
        let weighted: f64 = self
            .scores()
            .iter()
            .zip(SCORE_WEIGHTS.iter())
            .map(|(score, weight)| f64::from(*score) * weight)
            .sum();
        (weighted / weight_sum).round() as u8
    }
}

/// Structured verdict of the quality gate for one content version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Weighted overall score, 0..=100.
    pub overall_score: u8,
    /// The five sub-scores.
    pub breakdown: ScoreBreakdown,
    /// Whether `overall_score` met the gate's pass threshold.
    pub passed: bool,
    /// Classified issues, upstream-reported and synthesized.
    pub issues: Vec<QualityIssue>,
    /// Free-form improvement suggestions.
    pub suggestions: Vec<String>,
    /// When the assessment was made.
    pub assessed_at: DateTime<Utc>,
    /// Model tier that produced the raw assessment.
    pub assessed_by: String,
}

impl QualityAssessment {
    /// Highest severity among the issues, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|issue| issue.severity).max()
    }

    /// Whether any issue is at least `severity`.
    pub fn has_issue_at_least(&self, severity: Severity) -> bool {
        self.issues.iter().any(|issue| issue.severity >= severity)
    }
}
