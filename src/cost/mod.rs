//! Cost accounting for upstream generation calls.
//!
//! The pricing table converts token counts into dollars; the tracker owns
//! the append-only record log and per-day totals used for budget
//! enforcement.
//!
//! # Overview
//!
//! - **PricingTable**: model-keyed pricing with a designated default row
//! - **CostTracker**: records usage, answers "what has today cost so far?"
//! - **DailyCostSummary**: derived per-day breakdown by model and operation

mod pricing;
mod tracker;

pub use pricing::{ModelPricing, PricingTable};
pub use tracker::{CostRecord, CostTracker, DailyCostSummary, Operation};
