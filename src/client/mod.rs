//! Generation client: the budget- and rate-aware wrapper around the
//! upstream text-generation service.
//!
//! Every upstream call in the process funnels through one client instance:
//! budget pre-check first (cheap, no slot held), then rate-limited
//! admission, then the call, then cost recording. The rate-limit permit is
//! an RAII guard, so the concurrency slot is released on every exit path,
//! including upstream failure.

mod upstream;

pub(crate) mod prompts;

pub use upstream::{ChatMessage, Role, TextGenerator, UpstreamRequest, UpstreamResponse};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cost::{CostTracker, Operation};
use crate::error::GenerationError;
use crate::limiter::RateLimiter;

/// Token usage for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCount {
    /// Input/prompt tokens.
    pub input_tokens: u64,
    /// Output/completion tokens.
    pub output_tokens: u64,
}

impl TokenCount {
    /// Create a token count.
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
        }
    }

    /// Total tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Client configuration: daily ceiling plus per-operation model defaults.
///
/// Drafting and rewriting default to the cheapest tier; assessment uses the
/// mid tier at a low temperature for scoring consistency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Daily cost ceiling in USD.
    pub daily_cost_limit: f64,
    /// Model for draft generation.
    pub draft_model: String,
    /// Model for quality assessment.
    pub assess_model: String,
    /// Model for rewrites.
    pub rewrite_model: String,
    /// Temperature for drafts and rewrites.
    pub creative_temperature: f64,
    /// Temperature for assessments.
    pub assess_temperature: f64,
    /// Output token ceiling per call.
    pub max_tokens: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            daily_cost_limit: 50.0,
            draft_model: "claude-haiku".to_owned(),
            assess_model: "claude-sonnet".to_owned(),
            rewrite_model: "claude-haiku".to_owned(),
            creative_temperature: 0.7,
            assess_temperature: 0.3,
            max_tokens: 4096,
        }
    }
}

impl ClientConfig {
    /// Set the daily cost ceiling.
    pub fn with_daily_cost_limit(mut self, limit: f64) -> Self {
        self.daily_cost_limit = limit.max(0.0);
        self
    }

    /// Set the draft model.
    pub fn with_draft_model(mut self, model: impl Into<String>) -> Self {
        self.draft_model = model.into();
        self
    }

    /// Set the assessment model.
    pub fn with_assess_model(mut self, model: impl Into<String>) -> Self {
        self.assess_model = model.into();
        self
    }

    /// Set the rewrite model.
    pub fn with_rewrite_model(mut self, model: impl Into<String>) -> Self {
        self.rewrite_model = model.into();
        self
    }

    /// Set the per-call output token ceiling.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Everything needed for one upstream call through the client.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Model identifier.
    pub model: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Output token ceiling.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Which pipeline operation this call serves.
    pub operation: Operation,
    /// Content item the call is made for, when known.
    pub content_id: Option<String>,
}

/// Result of one completed call.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// Generated text.
    pub content: String,
    /// Tokens billed.
    pub usage: TokenCount,
    /// Recorded cost in USD.
    pub cost: f64,
    /// Model that served the call.
    pub model: String,
}

/// Budget-enforcing, rate-limited client for the upstream service.
///
/// Explicitly constructed and injected wherever a shared daily budget and
/// rate limit are required; there is no hidden process-global instance.
pub struct GenerationClient {
    generator: Arc<dyn TextGenerator>,
    limiter: Arc<RateLimiter>,
    tracker: Arc<CostTracker>,
    config: ClientConfig,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("config", &self.config)
            .finish()
    }
}

impl GenerationClient {
    /// Create a client over the given collaborators.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        limiter: Arc<RateLimiter>,
        tracker: Arc<CostTracker>,
        config: ClientConfig,
    ) -> Self {
        Self {
            generator,
            limiter,
            tracker,
            config,
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared cost tracker.
    pub fn tracker(&self) -> &Arc<CostTracker> {
        &self.tracker
    }

    /// The shared rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fail fast when the daily ceiling is already reached.
    ///
    /// Evaluated before any limiter interaction so a rejected call never
    /// occupies a concurrency slot.
    pub fn check_budget(&self) -> Result<(), GenerationError> {
        let spent = self.tracker.daily_cost();
        if spent >= self.config.daily_cost_limit {
            warn!(
                spent_usd = spent,
                limit_usd = self.config.daily_cost_limit,
                "daily cost budget exceeded, rejecting call"
            );
            return Err(GenerationError::BudgetExceeded {
                spent,
                limit: self.config.daily_cost_limit,
            });
        }
        Ok(())
    }

    /// Perform one upstream call: budget check, rate-limited admission,
    /// invocation, cost recording.
    pub async fn send_message(
        &self,
        options: SendOptions,
    ) -> Result<CompletionOutcome, GenerationError> {
        self.check_budget()?;

        // Held for the duration of the upstream call; dropped on every exit
        // path below, which releases the concurrency slot.
        let _permit = self.limiter.acquire().await;

        debug!(
            model = %options.model,
            operation = %options.operation,
            "dispatching upstream call"
        );

        let request = UpstreamRequest {
            model: options.model.clone(),
            system: options.system,
            messages: options.messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };
        let response = self.generator.invoke(request).await?;

        let record = self.tracker.record_cost(
            &options.model,
            response.input_tokens,
            response.output_tokens,
            options.operation,
            options.content_id.as_deref(),
        );

        Ok(CompletionOutcome {
            content: response.text,
            usage: TokenCount::new(response.input_tokens, response.output_tokens),
            cost: record.cost,
            model: options.model,
        })
    }

    /// Generate a draft: cheapest tier, creative temperature.
    pub async fn generate(
        &self,
        system: impl Into<String>,
        prompt: impl Into<String>,
        content_id: Option<&str>,
    ) -> Result<CompletionOutcome, GenerationError> {
        self.send_message(SendOptions {
            model: self.config.draft_model.clone(),
            system: Some(system.into()),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.config.max_tokens,
            temperature: self.config.creative_temperature,
            operation: Operation::Generate,
            content_id: content_id.map(str::to_owned),
        })
        .await
    }

    /// Assess content: mid tier, low temperature for scoring consistency.
    pub async fn assess(
        &self,
        system: impl Into<String>,
        prompt: impl Into<String>,
        content_id: Option<&str>,
    ) -> Result<CompletionOutcome, GenerationError> {
        self.send_message(SendOptions {
            model: self.config.assess_model.clone(),
            system: Some(system.into()),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.config.max_tokens,
            temperature: self.config.assess_temperature,
            operation: Operation::Assess,
            content_id: content_id.map(str::to_owned),
        })
        .await
    }

    /// Rewrite content: cheapest tier, creative temperature.
    pub async fn rewrite(
        &self,
        system: impl Into<String>,
        prompt: impl Into<String>,
        content_id: Option<&str>,
    ) -> Result<CompletionOutcome, GenerationError> {
        self.send_message(SendOptions {
            model: self.config.rewrite_model.clone(),
            system: Some(system.into()),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.config.max_tokens,
            temperature: self.config.creative_temperature,
            operation: Operation::Rewrite,
            content_id: content_id.map(str::to_owned),
        })
        .await
    }

    /// Price a hypothetical call without recording anything.
    pub fn estimate_cost(&self, model: &str, est_input: u64, est_output: u64) -> f64 {
        self.tracker.estimate_cost(model, est_input, est_output)
    }

    /// Whether an estimated spend still fits under today's ceiling.
    pub fn can_afford(&self, estimated_cost: f64) -> bool {
        self.tracker.daily_cost() + estimated_cost <= self.config.daily_cost_limit
    }
}
