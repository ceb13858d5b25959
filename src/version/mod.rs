//! Issues write versions on the leader.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::Version;

/// A single process-wide source of write versions.
///
/// Chosen at startup via `USE_VERSIONING` and fixed for the process lifetime.
pub trait VersionSource: Send + Sync {
    fn next(&self) -> Version;
}

/// Strictly increasing `1, 2, 3, …` produced by atomic increment.
///
/// Under this policy every version emitted by one process is pairwise
/// distinct and totally ordered, which is what lets a follower converge to
/// the leader's final state regardless of delivery order.
#[derive(Default)]
pub struct CounterVersionSource {
    next: AtomicU64,
}

impl CounterVersionSource {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl VersionSource for CounterVersionSource {
    fn next(&self) -> Version {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Current wall-clock time in milliseconds since the epoch.
///
/// Deliberately *not* guaranteed strictly increasing: two calls within the
/// same millisecond return equal versions, and under clock regressions a
/// later call can return a smaller version than an earlier one. This is the
/// anti-example used to demonstrate reordering hazards when replication
/// delay lets commands arrive out of send order.
#[derive(Default)]
pub struct TimestampVersionSource;

impl TimestampVersionSource {
    pub fn new() -> Self {
        Self
    }
}

impl VersionSource for TimestampVersionSource {
    fn next(&self) -> Version {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Version
    }
}
