//! Lifecycle events emitted during a pipeline run.
//!
//! Handlers are held in an observer registry and invoked synchronously, in
//! registration order, at each stage transition. Subscribing returns an
//! explicit unsubscribe token, so handler lifetime is independent of
//! pipeline lifetime. A panicking handler is isolated and logged; it never
//! aborts the run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One stage transition in a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Draft generation is starting.
    DraftStart {
        /// Brief being drafted.
        brief_id: String,
    },
    /// Draft generation finished.
    DraftComplete {
        /// Content produced.
        content_id: String,
        /// Words in the draft body.
        word_count: usize,
    },
    /// Quality assessment is starting.
    QualityStart {
        /// Content under assessment.
        content_id: String,
    },
    /// Quality assessment finished.
    QualityComplete {
        /// Content assessed.
        content_id: String,
        /// Weighted overall score.
        score: u8,
        /// Whether the gate's pass bar was met.
        passed: bool,
    },
    /// A rewrite iteration is starting.
    RewriteStart {
        /// Content being rewritten.
        content_id: String,
        /// 1-based rewrite attempt number.
        attempt: u32,
    },
    /// A rewrite iteration finished and was re-assessed.
    RewriteComplete {
        /// Content rewritten.
        content_id: String,
        /// 1-based rewrite attempt number.
        attempt: u32,
        /// Score after the rewrite.
        score: u8,
        /// Score delta against the previous assessment.
        improvement: i32,
    },
    /// The run failed unexpectedly.
    Error {
        /// Failure description.
        message: String,
    },
}

type Handler = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

struct HandlerEntry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    handlers: Mutex<Vec<HandlerEntry>>,
    next_id: AtomicU64,
}

/// Fan-out point for pipeline events.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every subsequent event.
    pub fn subscribe(
        &self,
        handler: impl Fn(&PipelineEvent) + Send + Sync + 'static,
    ) -> EventSubscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.registry.handlers).push(HandlerEntry {
            id,
            handler: Arc::new(handler),
        });
        EventSubscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event synchronously to every registered handler, in
    /// registration order.
    pub fn emit(&self, event: &PipelineEvent) {
        // Snapshot outside the delivery loop so a handler that subscribes
        // or unsubscribes does not deadlock against the registry.
        let handlers: Vec<Handler> = lock(&self.registry.handlers)
            .iter()
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(?event, "pipeline event handler panicked; continuing");
            }
        }
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        lock(&self.registry.handlers).len()
    }
}

/// Capability to remove a registered handler.
///
/// Dropping the token does NOT unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe) explicitly.
#[derive(Debug)]
pub struct EventSubscription {
    id: u64,
    registry: Weak<Registry>,
}

impl EventSubscription {
    /// Remove the handler this token was issued for.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry.handlers).retain(|entry| entry.id != self.id);
        }
    }
}

fn lock(handlers: &Mutex<Vec<HandlerEntry>>) -> std::sync::MutexGuard<'_, Vec<HandlerEntry>> {
    handlers.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn draft_start() -> PipelineEvent {
        PipelineEvent::DraftStart {
            brief_id: "brief-1".to_owned(),
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let _subscription = bus.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&draft_start());
        bus.emit(&draft_start());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let subscription = bus.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&draft_start());
        subscription.unsubscribe();
        bus.emit(&draft_start());

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_handlers_receive_events_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            let _ = bus.subscribe(move |_| order.lock().unwrap().push(label));
        }

        bus.emit(&draft_start());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let _panicky = bus.subscribe(|_| panic!("handler bug"));
        let seen_clone = Arc::clone(&seen);
        let _counting = bus.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&draft_start());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = PipelineEvent::QualityComplete {
            content_id: "content-1".to_owned(),
            score: 82,
            passed: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "quality_complete");
        assert_eq!(json["score"], 82);
    }

    #[test]
    fn test_dropped_bus_makes_unsubscribe_a_noop() {
        let bus = EventBus::new();
        let subscription = bus.subscribe(|_| {});
        drop(bus);
        // Registry is gone; unsubscribing must not panic.
        subscription.unsubscribe();
    }
}
