//! Rate limiting for upstream generation calls.
//!
//! Admission is bounded on two axes: a token bucket caps the long-run call
//! rate at `requests_per_minute` (bursts up to the full bucket are allowed),
//! and a fair semaphore caps in-flight calls at `max_concurrent`. Callers
//! waiting on the concurrency bound are served in FIFO order; callers waiting
//! on the token bound sleep until the next token accrues and then re-check.
//! Token waiters are intentionally not strictly FIFO: whichever waiter
//! becomes token-eligible first proceeds first, the usual trade-off of
//! token-bucket admission.
//!
//! `acquire` hands back an RAII [`RateLimitPermit`]; dropping the permit —
//! on success, on error, or on cancellation of the wrapped call — releases
//! the concurrency slot. There is no paired `release` to forget.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Duration, Instant};

use crate::error::GenerationError;

/// Rate configuration for the upstream service.
///
/// Immutable once the limiter is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
    /// Sustained calls per minute; also the burst capacity of the bucket.
    pub requests_per_minute: u32,
    /// Maximum calls in flight at any instant.
    pub max_concurrent: u32,
}

impl Default for RateBudget {
    fn default() -> Self {
        Self {
            requests_per_minute: 50,
            max_concurrent: 5,
        }
    }
}

impl RateBudget {
    /// Create a rate budget, clamping both bounds to at least 1.
    pub fn new(requests_per_minute: u32, max_concurrent: u32) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Tokens accrued per millisecond of elapsed time.
    fn refill_per_ms(&self) -> f64 {
        self.requests_per_minute as f64 / 60_000.0
    }
}

/// Token bucket state. Refilled lazily from elapsed monotonic time on each
/// acquire, not by a background timer.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_ms: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(budget: &RateBudget) -> Self {
        let capacity = budget.requests_per_minute as f64;
        Self {
            // Starts full: an idle limiter admits an initial burst.
            tokens: capacity,
            capacity,
            refill_per_ms: budget.refill_per_ms(),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed_ms = now.duration_since(self.last_refill).as_secs_f64() * 1000.0;
        self.tokens = (self.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token if available, otherwise report how long until the next
    /// token accrues.
    fn try_take(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - self.tokens;
            let wait_ms = (deficit / self.refill_per_ms).ceil().max(1.0);
            Some(Duration::from_millis(wait_ms as u64))
        }
    }
}

/// Bounds the rate and concurrency of upstream calls.
///
/// One limiter instance is shared by every pipeline run in the process;
/// construct it once and hand out clones of the `Arc` that owns it.
#[derive(Debug)]
pub struct RateLimiter {
    budget: RateBudget,
    concurrency: Arc<Semaphore>,
    bucket: tokio::sync::Mutex<TokenBucket>,
    active: AtomicUsize,
}

impl RateLimiter {
    /// Create a limiter for the given budget.
    pub fn new(budget: RateBudget) -> Self {
        Self {
            concurrency: Arc::new(Semaphore::new(budget.max_concurrent as usize)),
            bucket: tokio::sync::Mutex::new(TokenBucket::new(&budget)),
            active: AtomicUsize::new(0),
            budget,
        }
    }

    /// The budget this limiter was constructed with.
    pub fn budget(&self) -> RateBudget {
        self.budget
    }

    /// Number of permits currently admitted and not yet released.
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Tokens currently available in the bucket, after a lazy refill.
    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now());
        bucket.tokens
    }

    /// Wait until both a concurrency slot and a rate token are available,
    /// then admit the caller.
    ///
    /// Blocks indefinitely; use [`acquire_timeout`](Self::acquire_timeout)
    /// when the caller has a deadline. The returned permit releases the
    /// concurrency slot when dropped.
    pub async fn acquire(self: &Arc<Self>) -> RateLimitPermit {
        // Concurrency first: the semaphore queue is fair, so waiters here
        // are admitted in arrival order. The slot is held while waiting for
        // a token, which keeps the in-flight bound exact.
        let permit = self
            .concurrency
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore is never closed");

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.try_take(Instant::now())
            };
            match wait {
                None => break,
                Some(delay) => {
                    tracing::debug!(
                        delay_ms = delay.as_millis() as u64,
                        "rate token exhausted, waiting for refill"
                    );
                    sleep(delay).await;
                    // Another waiter may have raced us to the refilled
                    // token, so both conditions are re-checked on wake.
                }
            }
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        RateLimitPermit {
            _permit: permit,
            active: ActiveGuard {
                counter: Arc::clone(self),
            },
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `deadline`.
    ///
    /// On timeout the pending acquisition is abandoned cleanly: any
    /// concurrency slot obtained along the way is released by the dropped
    /// future, so an abandoned wait never leaks capacity.
    pub async fn acquire_timeout(
        self: &Arc<Self>,
        deadline: Duration,
    ) -> Result<RateLimitPermit, GenerationError> {
        tokio::time::timeout(deadline, self.acquire())
            .await
            .map_err(|_| GenerationError::AcquireTimeout {
                waited_ms: deadline.as_millis() as u64,
            })
    }
}

/// Decrements the active count when the permit is dropped.
#[derive(Debug)]
struct ActiveGuard {
    counter: Arc<RateLimiter>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counter.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Admission token for one upstream call.
///
/// Holds a concurrency slot for as long as it lives. Dropping it releases
/// the slot and wakes the next FIFO waiter, if any.
#[derive(Debug)]
pub struct RateLimitPermit {
    // Field order matters: the active count must drop to its new value
    // before the semaphore permit is returned and the next waiter admitted.
    active: ActiveGuard,
    _permit: OwnedSemaphorePermit,
}

impl RateLimitPermit {
    /// Explicitly release the slot. Equivalent to dropping the permit.
    pub fn release(self) {
        drop(self);
    }

    /// The limiter this permit was drawn from.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.active.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_bucket_size() {
        let limiter = Arc::new(RateLimiter::new(RateBudget::new(10, 10)));

        let start = Instant::now();
        for _ in 0..10 {
            let permit = limiter.acquire().await;
            drop(permit);
        }
        // A full bucket admits the initial burst without waiting.
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_n_plus_one_waits_for_refill() {
        // 60 requests/minute = one token per second.
        let limiter = Arc::new(RateLimiter::new(RateBudget::new(60, 60)));

        for _ in 0..60 {
            limiter.acquire().await.release();
        }

        let start = Instant::now();
        let permit = limiter.acquire().await;
        let waited = start.elapsed();
        drop(permit);

        assert!(
            waited >= Duration::from_millis(990) && waited <= Duration::from_millis(1100),
            "expected ~1s wait for the 61st acquire, waited {waited:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound_is_never_exceeded() {
        let limiter = Arc::new(RateLimiter::new(RateBudget::new(10_000, 2)));
        let peak = Arc::new(AtomicU32::new(0));
        let current = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            let peak = Arc::clone(&peak);
            let current = Arc::clone(&current);
            handles.push(tokio::spawn(async move {
                let permit = limiter.acquire().await;
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(limiter.active_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_drop_releases_slot_on_failure_path() {
        let limiter = Arc::new(RateLimiter::new(RateBudget::new(10_000, 1)));

        // Simulate wrapped calls that fail: the permit is dropped when the
        // error propagates, without an explicit release call.
        for _ in 0..3 {
            let permit = limiter.acquire().await;
            let result: Result<(), GenerationError> =
                Err(GenerationError::upstream("boom"));
            drop(permit);
            assert!(result.is_err());
        }

        // The slot must still be available promptly.
        let start = Instant::now();
        let permit = limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(5));
        drop(permit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout_expires_without_leaking() {
        let limiter = Arc::new(RateLimiter::new(RateBudget::new(10_000, 1)));
        let held = limiter.acquire().await;

        let result = limiter.acquire_timeout(Duration::from_millis(20)).await;
        assert!(matches!(
            result,
            Err(GenerationError::AcquireTimeout { waited_ms: 20 })
        ));

        // The abandoned wait released its queue position; the slot frees as
        // soon as the holder lets go.
        drop(held);
        let permit = limiter.acquire_timeout(Duration::from_millis(20)).await;
        assert!(permit.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_requests_tracks_admissions() {
        let limiter = Arc::new(RateLimiter::new(RateBudget::new(10_000, 4)));
        assert_eq!(limiter.active_requests(), 0);

        let a = limiter.acquire().await;
        let b = limiter.acquire().await;
        assert_eq!(limiter.active_requests(), 2);

        drop(a);
        assert_eq!(limiter.active_requests(), 1);
        drop(b);
        assert_eq!(limiter.active_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_tokens_refills_over_time() {
        let limiter = Arc::new(RateLimiter::new(RateBudget::new(60, 60)));

        for _ in 0..60 {
            limiter.acquire().await.release();
        }
        assert!(limiter.available_tokens().await < 1.0);

        sleep(Duration::from_secs(30)).await;
        let tokens = limiter.available_tokens().await;
        assert!(
            (29.0..=31.0).contains(&tokens),
            "expected ~30 tokens after 30s, got {tokens}"
        );
    }

    #[test]
    fn test_rate_budget_clamps_to_one() {
        let budget = RateBudget::new(0, 0);
        assert_eq!(budget.requests_per_minute, 1);
        assert_eq!(budget.max_concurrent, 1);
    }

    #[test]
    fn test_rate_budget_default() {
        let budget = RateBudget::default();
        assert_eq!(budget.requests_per_minute, 50);
        assert_eq!(budget.max_concurrent, 5);
    }
}
