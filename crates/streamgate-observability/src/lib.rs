//! Streamgate Observability
//!
//! Prometheus metrics for the publish path and the producer handle cache.
//!
//! # Usage
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use streamgate_observability::{exporter, metrics};
//!
//! metrics::init();
//! let app: Router = Router::new().route("/metrics", get(exporter::metrics_handler));
//! ```

pub mod exporter;
pub mod metrics;

pub use metrics::{init as init_metrics, REGISTRY};

/// Initialize all observability components
pub fn init() {
    metrics::init();
}
