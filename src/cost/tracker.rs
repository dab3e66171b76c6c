//! Cost recording and day-bucketed aggregation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::pricing::PricingTable;

/// Which pipeline operation triggered an upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Initial draft generation.
    Generate,
    /// Quality assessment of a draft or rewrite.
    Assess,
    /// Issue-driven rewrite of an existing version.
    Rewrite,
}

impl Operation {
    /// Stable label used in summaries and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Generate => "generate",
            Operation::Assess => "assess",
            Operation::Rewrite => "rewrite",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed upstream call. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// Unique record identifier.
    pub id: String,
    /// Content item this call was made for, when known.
    pub content_id: Option<String>,
    /// Model identifier used.
    pub model: String,
    /// Input tokens billed.
    pub input_tokens: u64,
    /// Output tokens billed.
    pub output_tokens: u64,
    /// Cost in USD, derived from the pricing table. Never negative.
    pub cost: f64,
    /// Operation that triggered the call.
    pub operation: Operation,
    /// When the call completed.
    pub recorded_at: DateTime<Utc>,
}

/// Derived per-day cost breakdown. Computed on demand, not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCostSummary {
    /// UTC calendar day the summary covers.
    pub date: NaiveDate,
    /// Total cost for the day in USD.
    pub total_cost: f64,
    /// Cost by model identifier.
    pub by_model: BTreeMap<String, f64>,
    /// Cost by operation label.
    pub by_operation: BTreeMap<String, f64>,
    /// Distinct content ids seen that day.
    pub content_count: usize,
    /// Configured daily ceiling in USD.
    pub limit: f64,
    /// Budget left today, floored at zero.
    pub remaining: f64,
}

/// Callback invoked synchronously for every recorded cost.
pub type CostObserver = Box<dyn Fn(&CostRecord) + Send + Sync>;

/// Record list and day buckets, guarded together by one mutex so they can
/// never desynchronize.
#[derive(Debug, Default)]
struct TrackerState {
    records: Vec<CostRecord>,
    day_totals: HashMap<NaiveDate, f64>,
}

/// Converts token usage into cost and aggregates it per UTC day.
///
/// One tracker instance is shared by every pipeline run in the process.
/// Retention is bounded by [`clear_old_records`](Self::clear_old_records),
/// which keeps the full-scan summary affordable.
pub struct CostTracker {
    pricing: PricingTable,
    state: Mutex<TrackerState>,
    observer: Option<CostObserver>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for CostTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostTracker")
            .field("pricing", &self.pricing)
            .field("records", &self.record_count())
            .finish()
    }
}

impl CostTracker {
    /// Create a tracker over the given pricing table.
    pub fn new(pricing: PricingTable) -> Self {
        Self {
            pricing,
            state: Mutex::new(TrackerState::default()),
            observer: None,
            sequence: AtomicU64::new(0),
        }
    }

    /// Register a callback invoked synchronously before each
    /// [`record_cost`](Self::record_cost) returns.
    pub fn with_observer(mut self, observer: impl Fn(&CostRecord) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// The pricing table in use.
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Price a hypothetical call without recording anything.
    pub fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.pricing.resolve(model).cost(input_tokens, output_tokens)
    }

    /// Record one completed upstream call.
    ///
    /// Unrecognized models fall back to the table's default row rather than
    /// failing; a call that happened must always be accounted for.
    pub fn record_cost(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        operation: Operation,
        content_id: Option<&str>,
    ) -> CostRecord {
        let cost = self.pricing.resolve(model).cost(input_tokens, output_tokens);
        let now = Utc::now();
        let record = CostRecord {
            id: self.next_id(),
            content_id: content_id.map(str::to_owned),
            model: model.to_owned(),
            input_tokens,
            output_tokens,
            cost,
            operation,
            recorded_at: now,
        };

        {
            let mut state = lock(&self.state);
            *state.day_totals.entry(now.date_naive()).or_insert(0.0) += cost;
            state.records.push(record.clone());
        }

        info!(
            model = %record.model,
            operation = %record.operation,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost_usd = record.cost,
            "cost recorded"
        );

        if let Some(observer) = &self.observer {
            observer(&record);
        }

        record
    }

    /// Running total for the current UTC day. O(1).
    pub fn daily_cost(&self) -> f64 {
        let today = Utc::now().date_naive();
        lock(&self.state).day_totals.get(&today).copied().unwrap_or(0.0)
    }

    /// Per-day breakdown for the current UTC day, recomputed by full scan.
    pub fn daily_summary(&self, limit: f64) -> DailyCostSummary {
        let today = Utc::now().date_naive();
        let state = lock(&self.state);

        let mut total = 0.0;
        let mut by_model: BTreeMap<String, f64> = BTreeMap::new();
        let mut by_operation: BTreeMap<String, f64> = BTreeMap::new();
        let mut content_ids: HashSet<&str> = HashSet::new();

        for record in state
            .records
            .iter()
            .filter(|r| r.recorded_at.date_naive() == today)
        {
            total += record.cost;
            *by_model.entry(record.model.clone()).or_insert(0.0) += record.cost;
            *by_operation
                .entry(record.operation.as_str().to_owned())
                .or_insert(0.0) += record.cost;
            if let Some(id) = &record.content_id {
                content_ids.insert(id);
            }
        }

        DailyCostSummary {
            date: today,
            total_cost: total,
            by_model,
            by_operation,
            content_count: content_ids.len(),
            limit,
            remaining: (limit - total).max(0.0),
        }
    }

    /// Drop records and day buckets older than `days_to_keep` days.
    ///
    /// Returns the number of records removed. Retained days keep their
    /// running totals untouched: records and buckets are trimmed under the
    /// same lock, by the same cutoff.
    pub fn clear_old_records(&self, days_to_keep: u32) -> usize {
        let cutoff = Utc::now().date_naive() - chrono::Days::new(u64::from(days_to_keep));
        let mut state = lock(&self.state);
        let before = state.records.len();
        state.records.retain(|r| r.recorded_at.date_naive() >= cutoff);
        state.day_totals.retain(|date, _| *date >= cutoff);
        let removed = before - state.records.len();
        if removed > 0 {
            info!(removed, days_to_keep, "trimmed old cost records");
        }
        removed
    }

    /// Number of records currently retained.
    pub fn record_count(&self) -> usize {
        lock(&self.state).records.len()
    }

    fn next_id(&self) -> String {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("cost-{timestamp_ms}-{seq}")
    }
}

/// Lock the state, recovering from a poisoned mutex. Accounting state is
/// always left consistent by the critical sections above, so a panic in an
/// unrelated holder does not invalidate it.
fn lock(state: &Mutex<TrackerState>) -> std::sync::MutexGuard<'_, TrackerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::super::pricing::ModelPricing;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn test_table() -> PricingTable {
        PricingTable::new(ModelPricing::new(3.0, 15.0))
            .with_model("unit-model", ModelPricing::new(1.0, 5.0))
    }

    #[test]
    fn test_cost_determinism() {
        let tracker = CostTracker::new(test_table());
        let record = tracker.record_cost("unit-model", 1_000_000, 1_000_000, Operation::Generate, None);
        assert!((record.cost - 6.0).abs() < 1e-9);

        tracker.record_cost("unit-model", 1_000_000, 1_000_000, Operation::Generate, None);
        assert!((tracker.daily_cost() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_uses_default_row() {
        let tracker = CostTracker::new(test_table());
        let record = tracker.record_cost("never-heard-of-it", 1_000_000, 0, Operation::Assess, None);
        assert!((record.cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_summary_invariant() {
        let tracker = CostTracker::new(test_table());
        tracker.record_cost("unit-model", 500_000, 100_000, Operation::Generate, Some("c-1"));
        tracker.record_cost("unit-model", 200_000, 50_000, Operation::Assess, Some("c-1"));
        tracker.record_cost("other-model", 100_000, 10_000, Operation::Rewrite, Some("c-2"));

        let summary = tracker.daily_summary(10.0);
        let model_sum: f64 = summary.by_model.values().sum();
        let operation_sum: f64 = summary.by_operation.values().sum();

        assert!((summary.total_cost - model_sum).abs() < 1e-9);
        assert!((summary.total_cost - operation_sum).abs() < 1e-9);
        assert!((summary.total_cost - tracker.daily_cost()).abs() < 1e-9);
        assert_eq!(summary.content_count, 2);
    }

    #[test]
    fn test_daily_summary_remaining_floors_at_zero() {
        let tracker = CostTracker::new(test_table());
        tracker.record_cost("unit-model", 1_000_000, 1_000_000, Operation::Generate, None);

        let summary = tracker.daily_summary(1.0);
        assert!((summary.remaining - 0.0).abs() < 1e-9);

        let roomy = tracker.daily_summary(10.0);
        assert!((roomy.remaining - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_observer_called_before_return() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let tracker = CostTracker::new(test_table()).with_observer(move |record| {
            assert!(record.cost > 0.0);
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        tracker.record_cost("unit-model", 1000, 1000, Operation::Generate, None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_old_records_keeps_today() {
        let tracker = CostTracker::new(test_table());
        tracker.record_cost("unit-model", 1000, 1000, Operation::Generate, None);

        let removed = tracker.clear_old_records(7);
        assert_eq!(removed, 0);
        assert_eq!(tracker.record_count(), 1);
        assert!(tracker.daily_cost() > 0.0);
    }

    #[test]
    fn test_clear_old_records_drops_past_days() {
        let tracker = CostTracker::new(test_table());
        tracker.record_cost("unit-model", 1000, 1000, Operation::Generate, None);

        // Backdate the record and its bucket past the retention horizon.
        {
            let mut state = lock(&tracker.state);
            let old_date = Utc::now() - chrono::Days::new(30);
            let total = state.records[0].cost;
            state.records[0].recorded_at = old_date;
            state.day_totals.clear();
            state.day_totals.insert(old_date.date_naive(), total);
        }

        let removed = tracker.clear_old_records(7);
        assert_eq!(removed, 1);
        assert_eq!(tracker.record_count(), 0);
        assert!((tracker.daily_cost() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_record_ids_are_unique() {
        let tracker = CostTracker::new(test_table());
        let a = tracker.record_cost("unit-model", 1, 1, Operation::Generate, None);
        let b = tracker.record_cost("unit-model", 1, 1, Operation::Generate, None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_estimate_does_not_record() {
        let tracker = CostTracker::new(test_table());
        let estimate = tracker.estimate_cost("unit-model", 1_000_000, 1_000_000);
        assert!((estimate - 6.0).abs() < 1e-9);
        assert_eq!(tracker.record_count(), 0);
        assert!((tracker.daily_cost() - 0.0).abs() < 1e-12);
    }
}
