//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): 429 rejections
//! - `gateway_circuit_rejected_total` (counter): 503 rejections
//! - `gateway_circuit_transitions_total` (counter): transitions by target state
//! - `gateway_registry_entries` (gauge): tracked keys per registry
//! - `gateway_registry_evictions_total` (counter): evicted keys per registry
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels never include client keys or raw paths (bounded cardinality)
//! - Histogram buckets tuned for typical web latencies

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()?;

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    ::metrics::counter!(
        "gateway_requests_total",
        "method" => method.clone(),
        "status" => status.clone()
    )
    .increment(1);
    ::metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    ::metrics::counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_circuit_rejected() {
    ::metrics::counter!("gateway_circuit_rejected_total").increment(1);
}

pub fn record_circuit_transition(to: &'static str) {
    ::metrics::counter!("gateway_circuit_transitions_total", "to" => to).increment(1);
}

pub fn record_evictions(registry: &'static str, removed: usize, remaining: usize) {
    ::metrics::counter!("gateway_registry_evictions_total", "registry" => registry)
        .increment(removed as u64);
    record_registry_size(registry, remaining);
}

/// Current number of tracked keys in `registry`.
pub fn record_registry_size(registry: &'static str, entries: usize) {
    ::metrics::gauge!("gateway_registry_entries", "registry" => registry).set(entries as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{CircuitBreakerConfig, RateLimitConfig};
    use crate::resilience::{CircuitBreakers, Outcome};
    use crate::security::RateLimiter;
    use ::metrics::{
        Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct LastSet(Mutex<Option<f64>>);

    impl GaugeFn for LastSet {
        fn increment(&self, _value: f64) {}
        fn decrement(&self, _value: f64) {}
        fn set(&self, value: f64) {
            *self.0.lock().unwrap() = Some(value);
        }
    }

    /// Captures gauge sets; counters and histograms are dropped.
    #[derive(Default)]
    struct GaugeCapture {
        gauges: Mutex<Vec<(String, Arc<LastSet>)>>,
    }

    impl GaugeCapture {
        fn registry_entries(&self, registry: &str) -> Option<f64> {
            let wanted = format!("gateway_registry_entries{{registry={registry}}}");
            self.gauges
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|(name, _)| *name == wanted)
                .find_map(|(_, gauge)| *gauge.0.lock().unwrap())
        }
    }

    impl Recorder for GaugeCapture {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
            Counter::noop()
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            let labels: Vec<String> = key
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect();
            let name = format!("{}{{{}}}", key.name(), labels.join(","));
            let gauge = Arc::new(LastSet::default());
            self.gauges.lock().unwrap().push((name, gauge.clone()));
            Gauge::from_arc(gauge)
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_registry_gauge_tracks_inserts_without_eviction() {
        let capture = GaugeCapture::default();
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(&RateLimitConfig::default(), clock.clone());
        let breakers = CircuitBreakers::new(&CircuitBreakerConfig::default(), clock);

        ::metrics::with_local_recorder(&capture, || {
            for key in ["a", "b", "c"] {
                limiter.consume(key, 1);
            }
            breakers.check_admission("GET:/x");
            breakers.record_outcome("GET:/x", Outcome::Success);
        });

        // Default ceilings are far away, so no eviction pass ran.
        assert_eq!(capture.registry_entries("rate_limit"), Some(3.0));
        assert_eq!(capture.registry_entries("circuit_breaker"), Some(1.0));
    }

    #[test]
    fn test_eviction_updates_gauge() {
        let capture = GaugeCapture::default();
        ::metrics::with_local_recorder(&capture, || {
            record_evictions("rate_limit", 4, 2);
        });
        assert_eq!(capture.registry_entries("rate_limit"), Some(2.0));
    }
}
