//! Model pricing configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Price of one model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per million input tokens.
    pub input_per_million: f64,
    /// USD per million output tokens.
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Create a pricing row.
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost in USD for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Pricing for every model the pipeline may call, plus a default row used
/// when a model identifier is not recognized.
///
/// Configuration, not behavior: the table is injected at construction and
/// never consulted remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    rows: HashMap<String, ModelPricing>,
    default_row: ModelPricing,
}

impl PricingTable {
    /// Create an empty table with the given default row.
    pub fn new(default_row: ModelPricing) -> Self {
        Self {
            rows: HashMap::new(),
            default_row,
        }
    }

    /// Add or replace a pricing row.
    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.rows.insert(model.into(), pricing);
        self
    }

    /// Pricing for `model`, falling back to the default row when the model
    /// is unrecognized. Never fails.
    pub fn resolve(&self, model: &str) -> ModelPricing {
        self.rows.get(model).copied().unwrap_or(self.default_row)
    }

    /// Whether an explicit row exists for `model`.
    pub fn has_model(&self, model: &str) -> bool {
        self.rows.contains_key(model)
    }

    /// Built-in table covering the three model tiers the client defaults
    /// reference. The default row is the mid tier, so unknown models are
    /// costed conservatively rather than dropped.
    pub fn builtin() -> Self {
        let sonnet = ModelPricing::new(3.0, 15.0);
        Self::new(sonnet)
            .with_model("claude-haiku", ModelPricing::new(0.25, 1.25))
            .with_model("claude-sonnet", sonnet)
            .with_model("claude-opus", ModelPricing::new(15.0, 75.0))
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}
