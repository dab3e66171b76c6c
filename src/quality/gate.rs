//! The quality gate: turns raw assessor output into a structured verdict
//! and answers publish/rewrite policy questions.

use std::sync::Arc;
use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{prompts, GenerationClient, TokenCount};
use crate::content::ContentBrief;
use crate::error::GenerationError;

use super::assessment::{
    IssueType, QualityAssessment, QualityIssue, ScoreBreakdown, Severity,
};
use super::parse::extract_json_object;

/// Category score below which a synthetic critical issue is generated.
const CRITICAL_BELOW: u8 = 40;
/// Category score below which a synthetic high issue is generated.
const HIGH_BELOW: u8 = 60;
/// Category score below which a synthetic medium issue is generated.
const MEDIUM_BELOW: u8 = 75;

/// Overall score below which content is considered unsalvageable by
/// incremental rewriting; the policy signal is to regenerate from scratch.
const MIN_SALVAGEABLE_SCORE: u8 = 20;

/// Pass and auto-publish bars, kept together so the invariant
/// `auto_publish >= threshold` holds under concurrent updates.
#[derive(Debug, Clone, Copy)]
struct Thresholds {
    threshold: u8,
    auto_publish: u8,
}

/// Result of one gate run.
#[derive(Debug, Clone)]
pub struct AssessmentOutcome {
    /// The structured verdict.
    pub assessment: QualityAssessment,
    /// Raw assessor response, retained for audit.
    pub raw_response: String,
    /// Tokens billed for the assessment call.
    pub tokens_used: TokenCount,
    /// Cost of the assessment call in USD.
    pub cost: f64,
}

/// Scores and classifies generated content, and decides pass / rewrite /
/// publish policy.
#[derive(Debug)]
pub struct QualityGate {
    client: Arc<GenerationClient>,
    thresholds: RwLock<Thresholds>,
}

impl QualityGate {
    /// Default pass bar.
    pub const DEFAULT_THRESHOLD: u8 = 75;
    /// Default auto-publish bar; stricter than the pass bar.
    pub const DEFAULT_AUTO_PUBLISH_THRESHOLD: u8 = 90;

    /// Create a gate with the default thresholds.
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self {
            client,
            thresholds: RwLock::new(Thresholds {
                threshold: Self::DEFAULT_THRESHOLD,
                auto_publish: Self::DEFAULT_AUTO_PUBLISH_THRESHOLD,
            }),
        }
    }

    /// Current `(threshold, auto_publish_threshold)` pair.
    pub fn thresholds(&self) -> (u8, u8) {
        let t = read(&self.thresholds);
        (t.threshold, t.auto_publish)
    }

    /// Update both bars. Each is clamped to 0..=100, and the auto-publish
    /// bar is raised to at least the pass bar: a publish gate below the
    /// pass gate is nonsensical and prevented here.
    pub fn set_thresholds(&self, threshold: u8, auto_publish_threshold: u8) {
        let threshold = threshold.min(100);
        let auto_publish = auto_publish_threshold.min(100).max(threshold);
        let mut guard = write(&self.thresholds);
        guard.threshold = threshold;
        guard.auto_publish = auto_publish;
    }

    /// Assess `body` against its brief: one upstream call, then structured
    /// interpretation. Client errors (budget, upstream) propagate; a
    /// malformed response is recovered into a conservative verdict and
    /// never surfaces as an error.
    pub async fn assess(
        &self,
        body: &str,
        brief: &ContentBrief,
        content_id: Option<&str>,
    ) -> Result<AssessmentOutcome, GenerationError> {
        let prompt = prompts::assess_prompt(body, brief);
        let outcome = self
            .client
            .assess(prompts::assessor_system(), prompt, content_id)
            .await?;

        let threshold = read(&self.thresholds).threshold;
        let assessment = interpret_assessment(&outcome.content, threshold, &outcome.model);
        debug!(
            overall_score = assessment.overall_score,
            passed = assessment.passed,
            issues = assessment.issues.len(),
            "content assessed"
        );

        Ok(AssessmentOutcome {
            assessment,
            raw_response: outcome.content,
            tokens_used: outcome.usage,
            cost: outcome.cost,
        })
    }

    /// Whether content may ship without human review: passed, at or above
    /// the auto-publish bar, and free of high or critical issues.
    pub fn should_auto_publish(&self, assessment: &QualityAssessment) -> bool {
        let auto_publish = read(&self.thresholds).auto_publish;
        assessment.passed
            && assessment.overall_score >= auto_publish
            && !assessment.has_issue_at_least(Severity::High)
    }

    /// Whether a rewrite is worth attempting.
    ///
    /// Content that already passed with nothing critical needs no rewrite;
    /// content scoring below the salvage floor should be regenerated from
    /// scratch rather than patched.
    pub fn should_rewrite(&self, assessment: &QualityAssessment) -> bool {
        if assessment.passed && !assessment.has_issue_at_least(Severity::Critical) {
            return false;
        }
        if assessment.overall_score < MIN_SALVAGEABLE_SCORE {
            return false;
        }
        true
    }

    /// Issues a rewrite must address: critical and high only, critical
    /// first.
    pub fn rewrite_issues(&self, assessment: &QualityAssessment) -> Vec<QualityIssue> {
        let mut issues: Vec<QualityIssue> = assessment
            .issues
            .iter()
            .filter(|issue| issue.severity >= Severity::High)
            .cloned()
            .collect();
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        issues
    }

    /// Signed score delta between two assessments; negative means the
    /// rewrite made things worse.
    pub fn calculate_improvement(
        &self,
        previous: &QualityAssessment,
        current: &QualityAssessment,
    ) -> i32 {
        i32::from(current.overall_score) - i32::from(previous.overall_score)
    }
}

/// Interpret raw assessor output into a structured verdict.
///
/// Never panics and never fails: extraction or parse problems yield the
/// conservative fallback (all scores zero, one synthetic critical issue).
pub fn interpret_assessment(raw: &str, threshold: u8, assessed_by: &str) -> QualityAssessment {
    let value = match extract_json_object(raw) {
        Ok(value) => value,
        Err(_) => {
            warn!(assessed_by, "assessment response unparseable, flagging for manual review");
            return fallback_assessment(assessed_by);
        }
    };

    let breakdown = ScoreBreakdown {
        factual_accuracy: clamp_score(value.get("factual_accuracy")),
        seo_compliance: clamp_score(value.get("seo_compliance")),
        readability: clamp_score(value.get("readability")),
        uniqueness: clamp_score(value.get("uniqueness")),
        engagement: clamp_score(value.get("engagement")),
    };
    let overall_score = breakdown.weighted_overall();

    let mut issues = upstream_issues(&value);
    merge_synthetic_issues(&mut issues, &breakdown);

    let suggestions = value
        .get("suggestions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    QualityAssessment {
        overall_score,
        breakdown,
        passed: overall_score >= threshold,
        issues,
        suggestions,
        assessed_at: Utc::now(),
        assessed_by: assessed_by.to_owned(),
    }
}

/// Conservative verdict used when the assessor response cannot be parsed.
fn fallback_assessment(assessed_by: &str) -> QualityAssessment {
    QualityAssessment {
        overall_score: 0,
        breakdown: ScoreBreakdown::default(),
        passed: false,
        issues: vec![QualityIssue {
            issue_type: IssueType::Factual,
            severity: Severity::Critical,
            location: None,
            description: "Assessment response could not be parsed; content requires manual review"
                .to_owned(),
            suggestion: None,
        }],
        suggestions: vec!["Manual review required due to assessment error".to_owned()],
        assessed_at: Utc::now(),
        assessed_by: assessed_by.to_owned(),
    }
}

/// Clamp a JSON field to 0..=100, rounding. Missing or non-numeric fields
/// normalize to 0.
fn clamp_score(value: Option<&Value>) -> u8 {
    value
        .and_then(Value::as_f64)
        .map(|score| score.clamp(0.0, 100.0).round() as u8)
        .unwrap_or(0)
}

/// Normalize the upstream-reported issue list.
fn upstream_issues(value: &Value) -> Vec<QualityIssue> {
    let Some(items) = value.get("issues").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let description = item.get("description").and_then(Value::as_str)?;
            Some(QualityIssue {
                issue_type: IssueType::normalize(
                    item.get("type").and_then(Value::as_str).unwrap_or(""),
                ),
                severity: Severity::normalize(
                    item.get("severity").and_then(Value::as_str).unwrap_or(""),
                ),
                location: item
                    .get("location")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned),
                description: description.to_owned(),
                suggestion: item
                    .get("suggestion")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned),
            })
        })
        .collect()
}

/// Generate per-category issues for low sub-scores and merge them in,
/// never duplicating a `(type, severity)` pair already present.
fn merge_synthetic_issues(issues: &mut Vec<QualityIssue>, breakdown: &ScoreBreakdown) {
    use std::collections::HashSet;

    let mut seen: HashSet<(IssueType, Severity)> = issues
        .iter()
        .map(|issue| (issue.issue_type, issue.severity))
        .collect();

    for (category, score) in ScoreBreakdown::categories().iter().zip(breakdown.scores()) {
        let severity = if score < CRITICAL_BELOW {
            Severity::Critical
        } else if score < HIGH_BELOW {
            Severity::High
        } else if score < MEDIUM_BELOW {
            Severity::Medium
        } else {
            continue;
        };
        if seen.insert((*category, severity)) {
            issues.push(QualityIssue {
                issue_type: *category,
                severity,
                location: None,
                description: format!(
                    "{} scored {score}, below the {} bar",
                    category.as_str(),
                    severity.as_str()
                ),
                suggestion: None,
            });
        }
    }
}

/// Read the thresholds, recovering from a poisoned lock.
fn read(lock: &RwLock<Thresholds>) -> Thresholds {
    *lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write(lock: &RwLock<Thresholds>) -> std::sync::RwLockWriteGuard<'_, Thresholds> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, TextGenerator, UpstreamRequest, UpstreamResponse};
    use crate::cost::{CostTracker, PricingTable};
    use crate::limiter::{RateBudget, RateLimiter};

    struct NullGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for NullGenerator {
        async fn invoke(
            &self,
            _request: UpstreamRequest,
        ) -> Result<UpstreamResponse, GenerationError> {
            Ok(UpstreamResponse {
                text: String::new(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    fn test_gate() -> QualityGate {
        let client = GenerationClient::new(
            Arc::new(NullGenerator),
            Arc::new(RateLimiter::new(RateBudget::default())),
            Arc::new(CostTracker::new(PricingTable::builtin())),
            ClientConfig::default(),
        );
        QualityGate::new(Arc::new(client))
    }

    fn assessment_with(overall: u8, passed: bool, issues: Vec<QualityIssue>) -> QualityAssessment {
        QualityAssessment {
            overall_score: overall,
            breakdown: ScoreBreakdown::default(),
            passed,
            issues,
            suggestions: Vec::new(),
            assessed_at: Utc::now(),
            assessed_by: "test".to_owned(),
        }
    }

    fn issue(issue_type: IssueType, severity: Severity) -> QualityIssue {
        QualityIssue {
            issue_type,
            severity,
            location: None,
            description: "test issue".to_owned(),
            suggestion: None,
        }
    }

    #[test]
    fn test_parse_fallback_is_conservative() {
        let assessment = interpret_assessment("total garbage, no json", 75, "claude-sonnet");
        assert_eq!(assessment.overall_score, 0);
        assert!(!assessment.passed);
        assert_eq!(assessment.issues.len(), 1);
        assert_eq!(assessment.issues[0].severity, Severity::Critical);
        assert_eq!(
            assessment.suggestions,
            vec!["Manual review required due to assessment error".to_owned()]
        );
    }

    #[test]
    fn test_truncated_response_is_conservative() {
        let assessment = interpret_assessment(r#"{"factual_accuracy": 80, "seo"#, 75, "m");
        assert_eq!(assessment.overall_score, 0);
        assert!(!assessment.passed);
    }

    #[test]
    fn test_clean_response_scores_weighted() {
        let raw = r#"{"factual_accuracy": 80, "seo_compliance": 80, "readability": 80,
                      "uniqueness": 80, "engagement": 80, "issues": [], "suggestions": []}"#;
        let assessment = interpret_assessment(raw, 75, "m");
        assert_eq!(assessment.overall_score, 80);
        assert!(assessment.passed);
        // 80 is below the medium synthesis bar in every category.
        assert!(assessment.issues.is_empty());
    }

    #[test]
    fn test_scores_clamped_and_missing_zeroed() {
        let raw = r#"{"factual_accuracy": 250, "seo_compliance": -10,
                      "readability": "not a number", "uniqueness": 99.6}"#;
        let assessment = interpret_assessment(raw, 75, "m");
        assert_eq!(assessment.breakdown.factual_accuracy, 100);
        assert_eq!(assessment.breakdown.seo_compliance, 0);
        assert_eq!(assessment.breakdown.readability, 0);
        assert_eq!(assessment.breakdown.uniqueness, 100);
        assert_eq!(assessment.breakdown.engagement, 0);
    }

    #[test]
    fn test_synthetic_issue_severity_tiers() {
        let raw = r#"{"factual_accuracy": 30, "seo_compliance": 50, "readability": 70,
                      "uniqueness": 80, "engagement": 90}"#;
        let assessment = interpret_assessment(raw, 75, "m");

        let find = |t: IssueType| assessment.issues.iter().find(|i| i.issue_type == t);
        assert_eq!(find(IssueType::Factual).map(|i| i.severity), Some(Severity::Critical));
        assert_eq!(find(IssueType::Seo).map(|i| i.severity), Some(Severity::High));
        assert_eq!(find(IssueType::Readability).map(|i| i.severity), Some(Severity::Medium));
        assert!(find(IssueType::Uniqueness).is_none());
        assert!(find(IssueType::Engagement).is_none());
    }

    #[test]
    fn test_synthetic_issues_do_not_duplicate_upstream() {
        let raw = r#"{"factual_accuracy": 30, "seo_compliance": 90, "readability": 90,
                      "uniqueness": 90, "engagement": 90,
                      "issues": [{"type": "factual", "severity": "critical",
                                  "description": "wrong currency cited"}]}"#;
        let assessment = interpret_assessment(raw, 75, "m");
        let factual_critical: Vec<_> = assessment
            .issues
            .iter()
            .filter(|i| i.issue_type == IssueType::Factual && i.severity == Severity::Critical)
            .collect();
        assert_eq!(factual_critical.len(), 1);
        assert_eq!(factual_critical[0].description, "wrong currency cited");
    }

    #[test]
    fn test_unknown_issue_labels_normalize() {
        let raw = r#"{"factual_accuracy": 90, "seo_compliance": 90, "readability": 90,
                      "uniqueness": 90, "engagement": 90,
                      "issues": [{"type": "mystery", "severity": "catastrophic",
                                  "description": "odd"}]}"#;
        let assessment = interpret_assessment(raw, 75, "m");
        assert_eq!(assessment.issues[0].issue_type, IssueType::Factual);
        assert_eq!(assessment.issues[0].severity, Severity::Medium);
    }

    #[test]
    fn test_auto_publish_gate() {
        let gate = test_gate();
        let clean = assessment_with(95, true, vec![issue(IssueType::Seo, Severity::Low)]);
        assert!(gate.should_auto_publish(&clean));

        let mut with_high = clean.clone();
        with_high.issues.push(issue(IssueType::Factual, Severity::High));
        assert!(!gate.should_auto_publish(&with_high));
    }

    #[test]
    fn test_auto_publish_requires_auto_threshold() {
        let gate = test_gate();
        // Passed the gate bar but below the auto-publish bar.
        let assessment = assessment_with(80, true, Vec::new());
        assert!(!gate.should_auto_publish(&assessment));
    }

    #[test]
    fn test_should_rewrite_policy() {
        let gate = test_gate();

        let passed_clean = assessment_with(85, true, Vec::new());
        assert!(!gate.should_rewrite(&passed_clean));

        let passed_with_critical =
            assessment_with(85, true, vec![issue(IssueType::Factual, Severity::Critical)]);
        assert!(gate.should_rewrite(&passed_with_critical));

        let salvageable = assessment_with(55, false, Vec::new());
        assert!(gate.should_rewrite(&salvageable));

        let hopeless = assessment_with(15, false, Vec::new());
        assert!(!gate.should_rewrite(&hopeless));
    }

    #[test]
    fn test_rewrite_issues_critical_first() {
        let gate = test_gate();
        let assessment = assessment_with(
            50,
            false,
            vec![
                issue(IssueType::Seo, Severity::High),
                issue(IssueType::Readability, Severity::Low),
                issue(IssueType::Factual, Severity::Critical),
                issue(IssueType::Engagement, Severity::Medium),
            ],
        );
        let issues = gate.rewrite_issues(&assessment);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[1].severity, Severity::High);
    }

    #[test]
    fn test_calculate_improvement_signed() {
        let gate = test_gate();
        let before = assessment_with(60, false, Vec::new());
        let after = assessment_with(85, true, Vec::new());
        assert_eq!(gate.calculate_improvement(&before, &after), 25);
        assert_eq!(gate.calculate_improvement(&after, &before), -25);
    }

    #[test]
    fn test_set_thresholds_clamps_and_orders() {
        let gate = test_gate();
        gate.set_thresholds(80, 60);
        // Auto-publish is raised to the pass bar.
        assert_eq!(gate.thresholds(), (80, 80));

        gate.set_thresholds(110, 120);
        assert_eq!(gate.thresholds(), (100, 100));
    }
}
