//! Configuration layer: typed defaults, optional TOML file, environment
//! overrides.
//!
//! Settings are plain data; [`Settings::build_pipeline`] is the composition
//! root that wires a limiter, tracker, client, and pipeline from one
//! settings value. Components are constructed and injected explicitly —
//! there is no lazily-built process-global instance. A process that wants
//! one shared budget and rate limit builds one pipeline and shares it.

use std::path::Path;
use std::sync::Arc;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::client::{ClientConfig, GenerationClient, TextGenerator};
use crate::cost::{CostTracker, PricingTable};
use crate::error::GenerationError;
use crate::limiter::{RateBudget, RateLimiter};
use crate::pipeline::{ContentPipeline, PipelineConfig};

/// Upstream admission limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateSettings {
    /// Sustained upstream calls per minute.
    pub requests_per_minute: u32,
    /// Maximum upstream calls in flight.
    pub max_concurrent: u32,
}

impl Default for RateSettings {
    fn default() -> Self {
        let budget = RateBudget::default();
        Self {
            requests_per_minute: budget.requests_per_minute,
            max_concurrent: budget.max_concurrent,
        }
    }
}

/// Spend limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    /// Daily cost ceiling in USD.
    pub daily_cost_limit: f64,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            daily_cost_limit: 50.0,
        }
    }
}

/// Model tier assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model for drafts.
    pub draft: String,
    /// Model for assessments.
    pub assess: String,
    /// Model for rewrites.
    pub rewrite: String,
    /// Output token ceiling per call.
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            draft: client.draft_model,
            assess: client.assess_model,
            rewrite: client.rewrite_model,
            max_tokens: client.max_tokens,
        }
    }
}

/// Quality gating behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    /// Whether the gate runs at all.
    pub enabled: bool,
    /// Pass bar.
    pub threshold: u8,
    /// Auto-publish bar.
    pub auto_publish_threshold: u8,
    /// Rewrite budget per run.
    pub max_rewrites: u32,
}

impl Default for QualitySettings {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            enabled: true,
            threshold: pipeline.quality_threshold.unwrap_or(75),
            auto_publish_threshold: pipeline.auto_publish_threshold,
            max_rewrites: pipeline.max_rewrites,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rate: RateSettings,
    pub budget: BudgetSettings,
    pub models: ModelSettings,
    pub quality: QualitySettings,
}

impl Settings {
    /// Load settings: defaults, overridden by an optional TOML file,
    /// overridden by `COPYFORGE_*` environment variables (section and key
    /// joined by `__`, e.g. `COPYFORGE_RATE__MAX_CONCURRENT=8`).
    pub fn load(path: Option<&Path>) -> Result<Self, GenerationError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }
        builder = builder.add_source(
            Environment::with_prefix("COPYFORGE")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| GenerationError::Config(e.to_string()))
    }

    /// Rate budget for the limiter.
    pub fn rate_budget(&self) -> RateBudget {
        RateBudget::new(self.rate.requests_per_minute, self.rate.max_concurrent)
    }

    /// Client configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_daily_cost_limit(self.budget.daily_cost_limit)
            .with_draft_model(self.models.draft.clone())
            .with_assess_model(self.models.assess.clone())
            .with_rewrite_model(self.models.rewrite.clone())
            .with_max_tokens(self.models.max_tokens)
    }

    /// Pipeline configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_quality_threshold(self.quality.enabled.then_some(self.quality.threshold))
            .with_max_rewrites(self.quality.max_rewrites)
            .with_auto_publish_threshold(self.quality.auto_publish_threshold)
    }

    /// Wire a ready pipeline from these settings and an upstream
    /// implementation.
    pub fn build_pipeline(&self, generator: Arc<dyn TextGenerator>) -> ContentPipeline {
        let limiter = Arc::new(RateLimiter::new(self.rate_budget()));
        let tracker = Arc::new(CostTracker::new(PricingTable::builtin()));
        let client = GenerationClient::new(generator, limiter, tracker, self.client_config());
        ContentPipeline::new(Arc::new(client), self.pipeline_config())
    }
}
