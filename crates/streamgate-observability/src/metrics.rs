use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Publish Metrics
    // ============================================================================

    /// Total number of messages accepted by the publish pipeline.
    /// Topics come from request paths, so they are never used as labels.
    pub static ref PUBLISH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamgate_publish_total", "Total messages published"),
        &["semantic"]
    ).expect("metric can be created");

    /// Publish failures by kind
    pub static ref PUBLISH_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamgate_publish_errors_total", "Total publish failures"),
        &["error_type"]
    ).expect("metric can be created");

    /// Time from request start to result, labelled by delivery semantic
    pub static ref PUBLISH_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("streamgate_publish_latency_seconds", "Publish latency in seconds")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["semantic"]
    ).expect("metric can be created");

    // ============================================================================
    // Handle Cache Metrics
    // ============================================================================

    /// Producer handles constructed by the factory
    pub static ref HANDLES_CREATED_TOTAL: IntCounter = IntCounter::new(
        "streamgate_handles_created_total", "Total producer handles created"
    ).expect("metric can be created");

    /// Failed handle constructions
    pub static ref HANDLE_CREATE_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "streamgate_handle_create_errors_total", "Total failed producer handle constructions"
    ).expect("metric can be created");

    /// Handles removed from the cache, by removal cause
    pub static ref HANDLES_EVICTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamgate_handles_evicted_total", "Total producer handles evicted"),
        &["cause"]
    ).expect("metric can be created");

    /// Errors raised while closing evicted handles
    pub static ref HANDLE_CLOSE_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "streamgate_handle_close_errors_total", "Total errors closing producer handles"
    ).expect("metric can be created");

    /// Handles currently held by the cache
    pub static ref CACHED_HANDLES: IntGauge = IntGauge::new(
        "streamgate_cached_handles", "Producer handles currently cached"
    ).expect("metric can be created");
}

/// Register all metrics with the global registry. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(PUBLISH_TOTAL.clone()))
            .expect("publish_total can be registered");
        REGISTRY
            .register(Box::new(PUBLISH_ERRORS_TOTAL.clone()))
            .expect("publish_errors_total can be registered");
        REGISTRY
            .register(Box::new(PUBLISH_LATENCY.clone()))
            .expect("publish_latency can be registered");

        REGISTRY
            .register(Box::new(HANDLES_CREATED_TOTAL.clone()))
            .expect("handles_created_total can be registered");
        REGISTRY
            .register(Box::new(HANDLE_CREATE_ERRORS_TOTAL.clone()))
            .expect("handle_create_errors_total can be registered");
        REGISTRY
            .register(Box::new(HANDLES_EVICTED_TOTAL.clone()))
            .expect("handles_evicted_total can be registered");
        REGISTRY
            .register(Box::new(HANDLE_CLOSE_ERRORS_TOTAL.clone()))
            .expect("handle_close_errors_total can be registered");
        REGISTRY
            .register(Box::new(CACHED_HANDLES.clone()))
            .expect("cached_handles can be registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_metrics_are_gathered() {
        init();
        PUBLISH_TOTAL.with_label_values(&["at_least_once"]).inc();
        HANDLES_EVICTED_TOTAL.with_label_values(&["expired"]).inc();

        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names.contains(&"streamgate_publish_total".to_string()));
        assert!(names.contains(&"streamgate_handles_evicted_total".to_string()));
    }

    #[test]
    fn test_publish_metrics_have_bounded_labels() {
        init();
        PUBLISH_TOTAL.with_label_values(&["at_most_once"]).inc();
        PUBLISH_ERRORS_TOTAL.with_label_values(&["validation"]).inc();

        let publish_families: Vec<_> = REGISTRY
            .gather()
            .into_iter()
            .filter(|family| family.get_name().starts_with("streamgate_publish"))
            .collect();
        assert!(!publish_families.is_empty());

        for family in &publish_families {
            for metric in family.get_metric() {
                for label in metric.get_label() {
                    assert_ne!(label.get_name(), "topic");
                }
            }
        }
    }
}
