//! Eviction scheduling for keyed stores.
//!
//! A scan is O(size), so it is amortized: it only runs once the store is
//! more than half full, and never more than once per `min_interval`. A store
//! above its ceiling scans regardless of the interval and is trimmed back to
//! its low-water mark, oldest access first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::clock::saturating_nanos;

/// When and what to evict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Configured ceiling for the store.
    pub max_entries: usize,
    /// Idle time after which an entry is stale.
    pub ttl: Duration,
    /// Minimum spacing between two scans.
    pub min_interval: Duration,
}

impl EvictionPolicy {
    /// A scan is only worth it once the store passes half its ceiling.
    pub fn wants_scan(&self, size: usize) -> bool {
        size > self.max_entries / 2
    }

    /// Above the ceiling: the interval no longer applies.
    pub fn over_capacity(&self, size: usize) -> bool {
        size > self.max_entries
    }

    /// Size a trim brings an over-full store back down to. The slack keeps
    /// a store at its ceiling from trimming on every insert.
    pub fn low_water(&self) -> usize {
        self.max_entries - self.max_entries / 10
    }
}

/// Remembers when the last scan started so concurrent callers never both scan.
#[derive(Debug, Default)]
pub(crate) struct EvictionSchedule {
    // Stamp of the last claimed scan plus one; zero means never.
    last_started: AtomicU64,
}

impl EvictionSchedule {
    /// Claim the right to scan at `now`. Returns false when another scan
    /// started less than `min_interval` ago (unless `urgent`) or a
    /// concurrent caller won.
    pub(crate) fn try_claim(&self, now: u64, min_interval: Duration, urgent: bool) -> bool {
        let last = self.last_started.load(Ordering::Acquire);
        if !urgent && last != 0 && now.saturating_sub(last - 1) < saturating_nanos(min_interval)
        {
            return false;
        }
        self.last_started
            .compare_exchange(last, now.saturating_add(1), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
