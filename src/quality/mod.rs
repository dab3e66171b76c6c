//! Quality gating for generated content.
//!
//! Three independently tested layers:
//! - **parse**: tolerant extraction of a JSON object from free-form model
//!   output
//! - **assessment**: the structured verdict model and score weighting
//! - **gate**: interpretation of raw assessor output plus pass / rewrite /
//!   auto-publish policy

mod assessment;
mod gate;
mod parse;

pub use assessment::{
    IssueType, QualityAssessment, QualityIssue, ScoreBreakdown, Severity, SCORE_WEIGHTS,
};
pub use gate::{interpret_assessment, AssessmentOutcome, QualityGate};
pub use parse::{extract_json_object, ParseFailed};
