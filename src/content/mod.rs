//! Content value objects: briefs in, generated content out.

mod brief;
mod generated;

pub use brief::{ContentBrief, ContentType, LengthRange, Tone};
pub use generated::{slugify, ContentStatus, GeneratedContent};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique id with the given prefix.
pub(crate) fn next_id(prefix: &str) -> String {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{timestamp_ms}-{seq}")
}
