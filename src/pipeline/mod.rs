//! The content pipeline: brief in, quality-checked content out.
//!
//! One run is strictly sequential: draft, assess, then a bounded rewrite
//! loop. Concurrency exists only across runs, mediated by the shared rate
//! limiter inside the client. Expected shortfalls — the rewrite budget runs
//! dry, the daily cost ceiling is hit after a draft exists — terminate as
//! values carrying the best content produced; only genuinely unexpected
//! failures propagate as errors.

mod events;

pub use events::{EventBus, EventSubscription, PipelineEvent};

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{prompts, GenerationClient};
use crate::content::{self, ContentBrief, ContentStatus, GeneratedContent};
use crate::cost::DailyCostSummary;
use crate::error::GenerationError;
use crate::quality::{QualityAssessment, QualityGate};

/// Tunable pipeline behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pass bar for generated content. `None` disables quality gating
    /// entirely: drafts are returned as-is.
    pub quality_threshold: Option<u8>,
    /// Maximum rewrite iterations per run.
    pub max_rewrites: u32,
    /// Bar above which content needs no human review.
    pub auto_publish_threshold: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: Some(QualityGate::DEFAULT_THRESHOLD),
            max_rewrites: 3,
            auto_publish_threshold: QualityGate::DEFAULT_AUTO_PUBLISH_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    /// Set the pass bar.
    pub fn with_quality_threshold(mut self, threshold: Option<u8>) -> Self {
        self.quality_threshold = threshold.map(|t| t.min(100));
        self
    }

    /// Set the rewrite budget.
    pub fn with_max_rewrites(mut self, max_rewrites: u32) -> Self {
        self.max_rewrites = max_rewrites;
        self
    }

    /// Set the auto-publish bar.
    pub fn with_auto_publish_threshold(mut self, threshold: u8) -> Self {
        self.auto_publish_threshold = threshold.min(100);
        self
    }
}

/// Partial config change applied at runtime; `None` fields are left
/// untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfigUpdate {
    /// New pass bar, if changing.
    pub quality_threshold: Option<u8>,
    /// New rewrite budget, if changing.
    pub max_rewrites: Option<u32>,
    /// New auto-publish bar, if changing.
    pub auto_publish_threshold: Option<u8>,
}

/// Terminal result of one run.
///
/// `success: false` still carries the best version produced, plus an
/// explanation and the attached assessment explaining what fell short.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The best content version produced.
    pub content: GeneratedContent,
    /// Whether the quality bar was met (or gating was disabled).
    pub success: bool,
    /// Why the run fell short, when it did.
    pub failure_reason: Option<String>,
}

/// Orchestrates client and quality gate into the end-to-end control loop.
#[derive(Debug)]
pub struct ContentPipeline {
    client: Arc<GenerationClient>,
    gate: QualityGate,
    config: RwLock<PipelineConfig>,
    events: EventBus,
}

impl ContentPipeline {
    /// Create a pipeline over a shared client.
    ///
    /// The quality gate's thresholds are initialized from `config` and kept
    /// in sync by [`update_config`](Self::update_config).
    pub fn new(client: Arc<GenerationClient>, config: PipelineConfig) -> Self {
        let gate = QualityGate::new(Arc::clone(&client));
        if let Some(threshold) = config.quality_threshold {
            gate.set_thresholds(threshold, config.auto_publish_threshold);
        }
        Self {
            client,
            gate,
            config: RwLock::new(config),
            events: EventBus::new(),
        }
    }

    /// Register a lifecycle event handler.
    pub fn on_event(
        &self,
        handler: impl Fn(&PipelineEvent) + Send + Sync + 'static,
    ) -> EventSubscription {
        self.events.subscribe(handler)
    }

    /// Current configuration snapshot.
    pub fn get_config(&self) -> PipelineConfig {
        *read(&self.config)
    }

    /// Apply a partial configuration change and re-sync the gate.
    pub fn update_config(&self, update: PipelineConfigUpdate) {
        let mut config = write(&self.config);
        if let Some(threshold) = update.quality_threshold {
            config.quality_threshold = Some(threshold.min(100));
        }
        if let Some(max_rewrites) = update.max_rewrites {
            config.max_rewrites = max_rewrites;
        }
        if let Some(auto) = update.auto_publish_threshold {
            config.auto_publish_threshold = auto.min(100);
        }
        if let Some(threshold) = config.quality_threshold {
            self.gate.set_thresholds(threshold, config.auto_publish_threshold);
        }
    }

    /// The quality gate, for policy queries on returned assessments.
    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Today's cost summary under the client's configured daily limit.
    pub fn cost_summary(&self) -> DailyCostSummary {
        self.client
            .tracker()
            .daily_summary(self.client.config().daily_cost_limit)
    }

    /// Run the full loop for one brief.
    ///
    /// Unexpected failures are emitted once as an [`PipelineEvent::Error`]
    /// and then propagated; expected shortfalls come back as
    /// `Ok(PipelineOutcome { success: false, .. })`.
    pub async fn generate(
        &self,
        brief: &ContentBrief,
    ) -> Result<PipelineOutcome, GenerationError> {
        match self.run(brief).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                // Budget exhaustion before any content exists is an expected
                // terminal condition, reported distinctly; everything else is
                // an unexpected failure worth an error event.
                if !matches!(error, GenerationError::BudgetExceeded { .. }) {
                    self.events.emit(&PipelineEvent::Error {
                        message: error.to_string(),
                    });
                }
                Err(error)
            }
        }
    }

    async fn run(&self, brief: &ContentBrief) -> Result<PipelineOutcome, GenerationError> {
        brief.validate()?;
        let config = self.get_config();

        // The content id is allocated before the draft call so the draft's
        // cost record is attributed to the same id as every later call.
        let content_id = content::next_id("content");

        self.events.emit(&PipelineEvent::DraftStart {
            brief_id: brief.id.clone(),
        });
        let draft_started = Instant::now();
        let draft = self
            .client
            .generate(
                prompts::writer_system(brief),
                prompts::draft_prompt(brief),
                Some(&content_id),
            )
            .await?;

        let mut generated = GeneratedContent::draft(brief, &draft.content, config.max_rewrites);
        generated.id = content_id;
        generated.record_usage(
            draft.usage.total(),
            draft.cost,
            draft_started.elapsed().as_millis() as u64,
        );
        self.events.emit(&PipelineEvent::DraftComplete {
            content_id: generated.id.clone(),
            word_count: generated.word_count(),
        });

        // Quality gating is optional: without a threshold the draft ships
        // as-is.
        let Some(threshold) = config.quality_threshold else {
            debug!(content_id = %generated.id, "no quality threshold configured, returning draft");
            return Ok(PipelineOutcome {
                content: generated,
                success: true,
                failure_reason: None,
            });
        };

        let mut assessment = match self.assess_version(&mut generated, brief).await? {
            Some(assessment) => assessment,
            None => {
                return Ok(budget_exhausted_outcome(generated));
            }
        };

        if assessment.overall_score >= threshold {
            generated.status = ContentStatus::Approved;
            info!(
                content_id = %generated.id,
                score = assessment.overall_score,
                "draft passed quality gate"
            );
            return Ok(PipelineOutcome {
                content: generated,
                success: true,
                failure_reason: None,
            });
        }

        // Bounded rewrite loop. Each iteration rewrites the CURRENT version
        // against the CURRENT assessment, so fixes compound instead of
        // restarting from the draft.
        for attempt in 1..=config.max_rewrites {
            if !self.gate.should_rewrite(&assessment) {
                warn!(
                    content_id = %generated.id,
                    score = assessment.overall_score,
                    "content not salvageable by rewriting, stopping early"
                );
                generated.status = ContentStatus::NeedsReview;
                return Ok(PipelineOutcome {
                    content: generated,
                    success: false,
                    failure_reason: Some(format!(
                        "score {} is too low to salvage by rewriting",
                        assessment.overall_score
                    )),
                });
            }

            self.events.emit(&PipelineEvent::RewriteStart {
                content_id: generated.id.clone(),
                attempt,
            });

            let mut issues = self.gate.rewrite_issues(&assessment);
            if issues.is_empty() {
                issues = assessment.issues.clone();
            }
            let prompt = prompts::rewrite_prompt(
                &generated.body,
                &issues,
                &assessment.suggestions,
                brief,
            );

            let rewrite_started = Instant::now();
            let rewrite = match self
                .client
                .rewrite(prompts::writer_system(brief), prompt, Some(&generated.id))
                .await
            {
                Ok(rewrite) => rewrite,
                Err(GenerationError::BudgetExceeded { .. }) => {
                    return Ok(budget_exhausted_outcome(generated));
                }
                Err(error) => return Err(error),
            };

            generated.apply_rewrite(&rewrite.content);
            generated.record_usage(
                rewrite.usage.total(),
                rewrite.cost,
                rewrite_started.elapsed().as_millis() as u64,
            );

            let reassessment = match self.assess_version(&mut generated, brief).await? {
                Some(reassessment) => reassessment,
                None => {
                    return Ok(budget_exhausted_outcome(generated));
                }
            };
            let improvement = self.gate.calculate_improvement(&assessment, &reassessment);
            self.events.emit(&PipelineEvent::RewriteComplete {
                content_id: generated.id.clone(),
                attempt,
                score: reassessment.overall_score,
                improvement,
            });
            debug!(
                content_id = %generated.id,
                attempt,
                score = reassessment.overall_score,
                improvement,
                "rewrite assessed"
            );
            assessment = reassessment;

            if assessment.overall_score >= threshold {
                generated.status = ContentStatus::Approved;
                info!(
                    content_id = %generated.id,
                    attempt,
                    score = assessment.overall_score,
                    "rewrite passed quality gate"
                );
                return Ok(PipelineOutcome {
                    content: generated,
                    success: true,
                    failure_reason: None,
                });
            }
        }

        // Rewrite budget spent without passing: a well-defined terminal
        // state, not an error. The caller gets the best (last) version and
        // the assessment explaining what still falls short.
        generated.status = ContentStatus::NeedsReview;
        let reason = format!(
            "quality threshold {threshold} not reached after {} rewrites (best score {})",
            generated.rewrite_count, assessment.overall_score
        );
        warn!(content_id = %generated.id, %reason, "rewrite budget exhausted");
        Ok(PipelineOutcome {
            content: generated,
            success: false,
            failure_reason: Some(reason),
        })
    }

    /// Assess the current version and attach the verdict.
    ///
    /// Returns `Ok(None)` when the daily budget ran out: with a draft in
    /// hand that is an expected terminal condition for the run, not an
    /// error.
    async fn assess_version(
        &self,
        generated: &mut GeneratedContent,
        brief: &ContentBrief,
    ) -> Result<Option<QualityAssessment>, GenerationError> {
        self.events.emit(&PipelineEvent::QualityStart {
            content_id: generated.id.clone(),
        });

        let assess_started = Instant::now();
        let outcome = match self
            .gate
            .assess(&generated.body, brief, Some(&generated.id))
            .await
        {
            Ok(outcome) => outcome,
            Err(GenerationError::BudgetExceeded { .. }) => return Ok(None),
            Err(error) => return Err(error),
        };

        generated.record_usage(
            outcome.tokens_used.total(),
            outcome.cost,
            assess_started.elapsed().as_millis() as u64,
        );
        generated.attach_assessment(outcome.assessment.clone());
        self.events.emit(&PipelineEvent::QualityComplete {
            content_id: generated.id.clone(),
            score: outcome.assessment.overall_score,
            passed: outcome.assessment.passed,
        });
        Ok(Some(outcome.assessment))
    }
}

/// Terminal outcome for a run that hit the daily budget after producing
/// content.
fn budget_exhausted_outcome(mut generated: GeneratedContent) -> PipelineOutcome {
    generated.status = ContentStatus::NeedsReview;
    PipelineOutcome {
        content: generated,
        success: false,
        failure_reason: Some("daily cost budget exhausted before the run could finish".to_owned()),
    }
}

fn read(config: &RwLock<PipelineConfig>) -> std::sync::RwLockReadGuard<'_, PipelineConfig> {
    config.read().unwrap_or_else(|e| e.into_inner())
}

fn write(config: &RwLock<PipelineConfig>) -> std::sync::RwLockWriteGuard<'_, PipelineConfig> {
    config.write().unwrap_or_else(|e| e.into_inner())
}
