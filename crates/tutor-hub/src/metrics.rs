use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock, PoisonError};

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

struct TutorMetrics {
    requests: IntCounterVec,
    turns: IntCounter,
    upstream_failures: IntCounter,
    persistence_failures: IntCounter,
    active_sessions: IntGauge,
}

static METRICS: OnceLock<TutorMetrics> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Register every metric once. Later calls are no-ops.
pub fn init_metrics() -> anyhow::Result<()> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if METRICS.get().is_some() {
        return Ok(());
    }

    let metrics = TutorMetrics {
        requests: IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"],
        )?,
        turns: IntCounter::new("turns_total", "Completed conversation turns")?,
        upstream_failures: IntCounter::new("upstream_failures_total", "Failed LLM provider calls")?,
        persistence_failures: IntCounter::new(
            "persistence_failures_total",
            "Absorbed conversation file or index write failures",
        )?,
        active_sessions: IntGauge::new("active_sessions", "Sessions held in the active map")?,
    };

    REGISTRY.register(Box::new(metrics.requests.clone()))?;
    REGISTRY.register(Box::new(metrics.turns.clone()))?;
    REGISTRY.register(Box::new(metrics.upstream_failures.clone()))?;
    REGISTRY.register(Box::new(metrics.persistence_failures.clone()))?;
    REGISTRY.register(Box::new(metrics.active_sessions.clone()))?;

    let _ = METRICS.set(metrics);
    Ok(())
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics.requests.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_turns() {
    if let Some(metrics) = METRICS.get() {
        metrics.turns.inc();
    }
}

pub fn inc_upstream_failures() {
    if let Some(metrics) = METRICS.get() {
        metrics.upstream_failures.inc();
    }
}

pub fn inc_persistence_failures() {
    if let Some(metrics) = METRICS.get() {
        metrics.persistence_failures.inc();
    }
}

/// Absorbed persistence failures so far; zero before `init_metrics`.
pub fn persistence_failure_count() -> u64 {
    METRICS.get().map_or(0, |metrics| metrics.persistence_failures.get())
}

pub fn set_active_sessions(count: usize) {
    if let Some(metrics) = METRICS.get() {
        metrics.active_sessions.set(count as i64);
    }
}

/// Prometheus text exposition of the registry.
pub fn render() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent_and_counters_render() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        inc_request("conversation", "200");
        inc_turns();
        set_active_sessions(3);

        let text = render().unwrap();
        assert!(text.contains("requests_total"));
        assert!(text.contains("turns_total"));
        assert!(text.contains("active_sessions"));
    }
}
