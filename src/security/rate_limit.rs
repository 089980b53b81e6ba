//! Per-client token bucket rate limiting.
//!
//! Each client key owns one bucket in a [`KeyedStore`]. Buckets refill
//! lazily on every consume, so an idle client costs nothing until it
//! returns or is evicted.

use arc_swap::ArcSwap;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::SharedClock;
use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::registry::{EvictionPolicy, KeyedStore};

/// Length of the hashed address key, in hex characters.
const ADDRESS_KEY_LEN: usize = 16;

/// A token bucket.
///
/// Invariant: `0 <= tokens <= capacity`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Accrue tokens for the time since the last refill. A `now` older than
    /// the last refill adds nothing and leaves the refill mark in place.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = self.last_refill.max(now);
    }

    /// Refill, then take `cost` tokens if available.
    pub fn try_consume(&mut self, cost: f64, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Adopt new limits; tokens are clamped to the new capacity.
    pub fn retune(&mut self, capacity: u32, refill_rate: f64) {
        self.capacity = f64::from(capacity.max(1));
        self.refill_rate = refill_rate;
        self.tokens = self.tokens.min(self.capacity);
    }

    /// Whole tokens left, as reported to clients.
    pub fn remaining(&self) -> u32 {
        self.tokens.floor() as u32
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Outcome of one consume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub admitted: bool,
    /// Configured requests per window.
    pub limit: u32,
    /// Whole tokens left after the decision.
    pub remaining: u32,
    /// Suggested delay before retrying a rejected request.
    pub retry_after: Duration,
    /// Window length, used for the reset hint.
    pub window: Duration,
}

/// Effective limiter settings.
#[derive(Debug, Clone, PartialEq)]
struct LimiterSettings {
    enabled: bool,
    trust_proxy: bool,
    requests_per_window: u32,
    window: Duration,
    eviction: EvictionPolicy,
}

impl LimiterSettings {
    fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            trust_proxy: config.trust_proxy,
            requests_per_window: config.requests_per_window.max(1),
            window: config.window().max(Duration::from_secs(1)),
            eviction: config.eviction(),
        }
    }

    fn refill_rate(&self) -> f64 {
        f64::from(self.requests_per_window) / self.window.as_secs_f64()
    }
}

/// Token bucket limiter keyed by client.
pub struct RateLimiter {
    buckets: KeyedStore<TokenBucket>,
    settings: ArcSwap<LimiterSettings>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            buckets: KeyedStore::new(clock.clone()),
            settings: ArcSwap::from_pointee(LimiterSettings::from_config(config)),
            clock,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.load().enabled
    }

    /// Whether client addresses may come from forwarding headers.
    pub fn trusts_proxy(&self) -> bool {
        self.settings.load().trust_proxy
    }

    /// Configured requests per window.
    pub fn limit(&self) -> u32 {
        self.settings.load().requests_per_window
    }

    pub fn window(&self) -> Duration {
        self.settings.load().window
    }

    /// Spend `cost` tokens from `key`'s bucket, creating a full one if the
    /// key is new.
    pub fn consume(&self, key: &str, cost: u32) -> RateLimitDecision {
        let settings = self.settings.load();
        let capacity = settings.requests_per_window;
        let rate = settings.refill_rate();

        let slot = self
            .buckets
            .get_or_create(key, || TokenBucket::new(capacity, rate, self.clock.now()));

        // Time is read under the bucket lock so refills on one key see
        // non-decreasing stamps.
        let (admitted, remaining) = {
            let mut bucket = slot.lock();
            bucket.retune(capacity, rate);
            let admitted = bucket.try_consume(f64::from(cost), self.clock.now());
            (admitted, bucket.remaining())
        };

        if !admitted {
            metrics::record_rate_limited();
        }
        self.maybe_evict(&settings.eviction);
        metrics::record_registry_size("rate_limit", self.buckets.len());

        RateLimitDecision {
            admitted,
            limit: capacity,
            remaining,
            retry_after: settings.window,
            window: settings.window,
        }
    }

    fn maybe_evict(&self, policy: &EvictionPolicy) {
        if let Some(removed) = self.buckets.maybe_evict(policy) {
            let remaining = self.buckets.len();
            tracing::debug!(removed, remaining, "Evicted idle rate limit buckets");
            metrics::record_evictions("rate_limit", removed, remaining);
        }
    }

    /// Unconditional eviction pass. Returns the number of buckets removed.
    pub fn evict_stale(&self) -> usize {
        let ttl = self.settings.load().eviction.ttl;
        let removed = self.buckets.evict_stale(ttl);
        metrics::record_evictions("rate_limit", removed, self.buckets.len());
        removed
    }

    /// Swap in new limits. Existing buckets adopt them on their next request.
    pub fn reconfigure(&self, config: &RateLimitConfig) {
        let next = LimiterSettings::from_config(config);
        if **self.settings.load() != next {
            tracing::info!(
                enabled = next.enabled,
                requests_per_window = next.requests_per_window,
                window_secs = next.window.as_secs(),
                "Rate limiter reconfigured"
            );
            self.settings.store(Arc::new(next));
        }
    }

    /// Number of tracked client buckets.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Tokens currently in `key`'s bucket, without refilling or touching it.
    pub fn peek(&self, key: &str) -> Option<f64> {
        self.buckets.get(key).map(|slot| slot.lock().tokens())
    }
}

/// Derive the limiter key for a request.
///
/// Authenticated callers are keyed by identity, anonymous ones by a hash of
/// their address; the `user:` prefix keeps the two key spaces disjoint.
pub fn client_key(identity: Option<&str>, remote: Option<IpAddr>) -> String {
    match identity {
        Some(id) => format!("user:{id}"),
        None => {
            let address = remote.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
            let digest = Sha256::digest(address.as_bytes());
            let mut key = hex::encode(digest);
            key.truncate(ADDRESS_KEY_LEN);
            key
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::thread;

    fn limiter(requests_per_window: u32) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimitConfig {
            requests_per_window,
            window_seconds: 60,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(&config, clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_new_key_starts_full() {
        let (_, limiter) = limiter(5);
        let decision = limiter.consume("a", 1);
        assert!(decision.admitted);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_third_request_rejected_with_window_retry() {
        let (_, limiter) = limiter(2);
        assert!(limiter.consume("a", 1).admitted);
        let second = limiter.consume("a", 1);
        assert!(second.admitted);
        assert_eq!(second.remaining, 0);

        let third = limiter.consume("a", 1);
        assert!(!third.admitted);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.retry_after, Duration::from_secs(60));
    }

    #[test]
    fn test_keys_are_isolated() {
        let (_, limiter) = limiter(1);
        assert!(limiter.consume("a", 1).admitted);
        assert!(!limiter.consume("a", 1).admitted);
        assert!(limiter.consume("b", 1).admitted);
    }

    #[test]
    fn test_refill_is_continuous_and_fractional() {
        // 60 per minute = one token per second.
        let (clock, limiter) = limiter(60);
        for _ in 0..60 {
            assert!(limiter.consume("a", 1).admitted);
        }
        assert!(!limiter.consume("a", 1).admitted);

        clock.advance(Duration::from_millis(500));
        let half = limiter.consume("a", 1);
        assert!(!half.admitted);
        assert_eq!(half.remaining, 0);
        assert!((limiter.peek("a").unwrap() - 0.5).abs() < 1e-9);

        clock.advance(Duration::from_millis(500));
        assert!(limiter.consume("a", 1).admitted);
    }

    #[test]
    fn test_idle_refill_is_bounded_by_elapsed_time_and_capacity() {
        let (clock, limiter) = limiter(10);
        for _ in 0..10 {
            limiter.consume("a", 1);
        }
        let before = limiter.peek("a").unwrap();

        // 10 per minute: 12 seconds yields at most two tokens.
        clock.advance(Duration::from_secs(12));
        limiter.consume("a", 0);
        let after = limiter.peek("a").unwrap();
        assert!(after - before <= 12.0 * (10.0 / 60.0) + 1e-9);

        clock.advance(Duration::from_secs(3600));
        limiter.consume("a", 0);
        assert_eq!(limiter.peek("a").unwrap(), 10.0);
    }

    #[test]
    fn test_tokens_stay_within_bounds() {
        let (clock, limiter) = limiter(3);
        for step in 0..200u64 {
            limiter.consume("a", (step % 3) as u32);
            clock.advance(Duration::from_millis(step * 37 % 5000));
            let tokens = limiter.peek("a").unwrap();
            assert!((0.0..=3.0).contains(&tokens), "tokens out of range: {tokens}");
        }
    }

    #[test]
    fn test_reconfigure_clamps_existing_buckets() {
        let (_, limiter) = limiter(10);
        limiter.consume("a", 1);
        assert_eq!(limiter.peek("a"), Some(9.0));

        limiter.reconfigure(&RateLimitConfig {
            requests_per_window: 2,
            ..RateLimitConfig::default()
        });
        let decision = limiter.consume("a", 1);
        assert!(decision.admitted);
        assert_eq!(decision.limit, 2);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_idle_buckets_are_evicted_once_half_full() {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimitConfig {
            max_entries: 4,
            ttl_seconds: 600,
            eviction_interval_secs: 60,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(&config, clock.clone());

        limiter.consume("old-1", 1);
        limiter.consume("old-2", 1);
        clock.advance(Duration::from_secs(601));
        limiter.consume("new", 1);

        assert_eq!(limiter.tracked_clients(), 1);
        assert!(limiter.peek("old-1").is_none());
        assert!(limiter.peek("new").is_some());
    }

    #[test]
    fn test_out_of_order_stamps_do_not_double_refill() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        // One token per second.
        let mut bucket = TokenBucket::new(10, 1.0, t0);
        assert!(bucket.try_consume(10.0, t0));

        let mut admitted = 0;
        let t5 = t0 + Duration::from_secs(5);
        let t3 = t0 + Duration::from_secs(3);
        if bucket.try_consume(1.0, t5) {
            admitted += 1;
        }
        if bucket.try_consume(1.0, t3) {
            admitted += 1;
        }
        while bucket.try_consume(1.0, t5) {
            admitted += 1;
        }
        assert_eq!(admitted, 5);
        assert!(bucket.tokens() >= 0.0);
    }

    #[test]
    fn test_ceiling_bounds_distinct_clients() {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimitConfig {
            max_entries: 4,
            eviction_interval_secs: 0,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(&config, clock.clone());

        for i in 0..1000 {
            assert!(limiter.consume(&format!("client-{i}"), 1).admitted);
            clock.advance(Duration::from_millis(10));
        }
        assert!(limiter.tracked_clients() <= 4);
        assert!(limiter.peek("client-999").is_some());
    }

    #[test]
    fn test_concurrent_consumers_share_one_budget() {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimitConfig {
            requests_per_window: 50,
            window_seconds: 60,
            ..RateLimitConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(&config, clock.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || {
                    let mut admitted = 0;
                    for _ in 0..25 {
                        if limiter.consume("shared", 1).admitted {
                            admitted += 1;
                        }
                        let tokens = limiter.peek("shared").unwrap();
                        assert!((0.0..=50.0).contains(&tokens), "tokens out of range: {tokens}");
                    }
                    admitted
                })
            })
            .collect();
        let admitted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // The clock never moved, so nothing refilled.
        assert_eq!(admitted, 50);
        assert_eq!(limiter.peek("shared"), Some(0.0));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_client_key_for_identity() {
        assert_eq!(client_key(Some("42"), None), "user:42");
        assert_eq!(
            client_key(Some("42"), Some("10.0.0.1".parse().unwrap())),
            "user:42"
        );
    }

    #[test]
    fn test_client_key_hashes_address() {
        let ip: IpAddr = "192.168.1.1".parse().unwrap();
        let key = client_key(None, Some(ip));
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!key.contains("192"));

        let expected = hex::encode(Sha256::digest(b"192.168.1.1"));
        assert_eq!(key, expected[..16]);
        assert_ne!(key, client_key(None, Some("192.168.1.2".parse().unwrap())));
    }

    #[test]
    fn test_client_key_without_address() {
        let expected = hex::encode(Sha256::digest(b"unknown"));
        assert_eq!(client_key(None, None), expected[..16]);
    }
}
