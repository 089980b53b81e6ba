//! Keyed aging store shared by both protective policies.
//!
//! Each entry is an `Arc<Slot<T>>`: the entity sits behind its own mutex so
//! read-modify-write sequences on one key serialize, while the last-access
//! stamp is an atomic outside that mutex. Eviction only reads the stamp, so
//! it never waits on an entity lock.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::{saturating_nanos, SharedClock};
use crate::registry::eviction::{EvictionPolicy, EvictionSchedule};

/// One keyed entity plus its access bookkeeping.
#[derive(Debug)]
pub struct Slot<T> {
    entity: Mutex<T>,
    /// Nanoseconds since the owning store's epoch.
    last_access: AtomicU64,
}

impl<T> Slot<T> {
    fn new(entity: T, now: u64) -> Self {
        Self {
            entity: Mutex::new(entity),
            last_access: AtomicU64::new(now),
        }
    }

    /// Lock the entity. A poisoned lock is recovered: entity state is plain
    /// numbers and stays consistent between statements.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.entity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self, now: u64) {
        self.last_access.fetch_max(now, Ordering::AcqRel);
    }

    fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Acquire)
    }
}

/// A concurrent map from string keys to aging entities.
pub struct KeyedStore<T> {
    entries: DashMap<String, Arc<Slot<T>>>,
    clock: SharedClock,
    epoch: Instant,
    schedule: EvictionSchedule,
}

impl<T> KeyedStore<T> {
    pub fn new(clock: SharedClock) -> Self {
        let epoch = clock.now();
        Self {
            entries: DashMap::new(),
            clock,
            epoch,
            schedule: EvictionSchedule::default(),
        }
    }

    fn stamp(&self) -> u64 {
        saturating_nanos(self.clock.now().saturating_duration_since(self.epoch))
    }

    /// Return the entity for `key`, constructing it with `factory` if absent.
    ///
    /// Concurrent callers for the same unseen key observe a single entity.
    /// The access stamp is written while the shard guard is held, so a
    /// concurrent eviction either sees the fresh stamp or removed the entry
    /// before this lookup.
    pub fn get_or_create<F>(&self, key: &str, factory: F) -> Arc<Slot<T>>
    where
        F: FnOnce() -> T,
    {
        let now = self.stamp();
        if let Some(slot) = self.entries.get(key) {
            slot.touch(now);
            return Arc::clone(slot.value());
        }

        let slot = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Slot::new(factory(), now)));
        slot.touch(now);
        Arc::clone(slot.value())
    }

    /// Look up an entity without marking it as accessed.
    pub fn get(&self, key: &str) -> Option<Arc<Slot<T>>> {
        self.entries.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// Mark `slot` as accessed now.
    pub fn observe_access(&self, slot: &Slot<T>) {
        slot.touch(self.stamp());
    }

    /// True when `slot` has been idle for longer than `ttl`.
    pub fn is_stale(&self, slot: &Slot<T>, ttl: Duration) -> bool {
        self.stamp().saturating_sub(slot.last_access()) > saturating_nanos(ttl)
    }

    /// Remove every entry idle for longer than `ttl`. Returns how many went.
    pub fn evict_stale(&self, ttl: Duration) -> usize {
        let now = self.stamp();
        let ttl = saturating_nanos(ttl);
        let mut removed = 0;
        self.entries.retain(|_, slot| {
            let keep = now.saturating_sub(slot.last_access()) <= ttl;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Remove the least recently accessed entries until at most `target`
    /// remain. An entry touched after the candidates were picked is kept.
    pub fn evict_oldest(&self, target: usize) -> usize {
        let mut candidates: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().last_access(), entry.key().clone()))
            .collect();
        let excess = candidates.len().saturating_sub(target);
        if excess == 0 {
            return 0;
        }
        candidates.select_nth_unstable(excess - 1);

        let mut removed = 0;
        for (stamp, key) in &candidates[..excess] {
            if self
                .entries
                .remove_if(key, |_, slot| slot.last_access() <= *stamp)
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }

    /// Run an eviction pass if `policy` says one is due: stale entries
    /// first, then the oldest ones while the store is above its ceiling.
    pub fn maybe_evict(&self, policy: &EvictionPolicy) -> Option<usize> {
        let size = self.len();
        if !policy.wants_scan(size) {
            return None;
        }
        let urgent = policy.over_capacity(size);
        if !self
            .schedule
            .try_claim(self.stamp(), policy.min_interval, urgent)
        {
            return None;
        }

        let mut removed = self.evict_stale(policy.ttl);
        if policy.over_capacity(self.len()) {
            removed += self.evict_oldest(policy.low_water());
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all keys and slots, for inspection.
    pub fn entries(&self) -> Vec<(String, Arc<Slot<T>>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}

impl<T> std::fmt::Debug for KeyedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedStore")
            .field("len", &self.entries.len())
            .finish()
    }
}
