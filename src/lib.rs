//! copyforge: a content generation pipeline with quality gating, rate
//! limiting, and daily cost budgets.
//!
//! The pipeline turns a structured [`ContentBrief`] into quality-checked
//! marketing/SEO text: draft, assess, then a bounded rewrite loop that
//! stops the moment the content clears the configured bar. Every upstream
//! call is admitted through a shared [`RateLimiter`] and recorded in a
//! shared [`CostTracker`], and the daily cost ceiling is enforced before a
//! call ever occupies capacity.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use copyforge::{ContentBrief, ContentType, Settings};
//!
//! let settings = Settings::load(None)?;
//! let pipeline = settings.build_pipeline(Arc::new(my_generator));
//!
//! let brief = ContentBrief::new(ContentType::BlogPost, "site-1", "lisbon day trips");
//! let outcome = pipeline.generate(&brief).await?;
//! if outcome.success {
//!     publish(outcome.content);
//! }
//! ```

pub mod client;
pub mod config;
pub mod content;
pub mod cost;
pub mod error;
pub mod limiter;
pub mod pipeline;
pub mod quality;

pub use client::{
    ChatMessage, ClientConfig, CompletionOutcome, GenerationClient, Role, SendOptions,
    TextGenerator, TokenCount, UpstreamRequest, UpstreamResponse,
};
pub use config::Settings;
pub use content::{
    slugify, ContentBrief, ContentStatus, ContentType, GeneratedContent, LengthRange, Tone,
};
pub use cost::{
    CostRecord, CostTracker, DailyCostSummary, ModelPricing, Operation, PricingTable,
};
pub use error::GenerationError;
pub use limiter::{RateBudget, RateLimitPermit, RateLimiter};
pub use pipeline::{
    ContentPipeline, EventSubscription, PipelineConfig, PipelineConfigUpdate, PipelineEvent,
    PipelineOutcome,
};
pub use quality::{
    AssessmentOutcome, IssueType, QualityAssessment, QualityGate, QualityIssue, ScoreBreakdown,
    Severity, SCORE_WEIGHTS,
};
