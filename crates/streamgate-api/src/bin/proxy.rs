//! Streamgate Proxy Binary
//!
//! # Environment Variables
//!
//! - `API_PORT`: HTTP port (default: 8080)
//! - `STREAMGATE_IDLE_EXPIRY_SECS`: close producers idle this long (default: 600)
//! - `STREAMGATE_MAX_CACHE_ENTRIES`: maximum cached producers (default: 3000)
//! - `STREAMGATE_SHARD_COUNT`: physical topics per logical topic, 0 = off (default: 0)
//! - `STREAMGATE_SEMANTIC`: `at_most_once` or `at_least_once` (default: at_least_once)
//! - `STREAMGATE_MAINTENANCE_INTERVAL_MS`: eviction pass interval (default: 1000)
//! - `SHUTDOWN_TIMEOUT_SECS`: time allowed for closing producers on exit (default: 30)
//! - `RUST_LOG`: Log level (default: info)
//!
//! # Example
//!
//! ```bash
//! export STREAMGATE_SHARD_COUNT=3
//! export STREAMGATE_SEMANTIC=at_most_once
//! cargo run --bin streamgate-proxy
//!
//! curl -X POST localhost:8080/v1/pulsar/tenants/public/namespaces/default/topics/orders/produce \
//!     -H 'content-type: application/json' -d '{"msg": "hello"}'
//! ```

use std::sync::Arc;
use streamgate_api::shutdown::{serve_with_shutdown, GracefulShutdown};
use streamgate_api::{create_router, AppState};
use streamgate_core::{HandleCache, HandleFactory, MemoryBroker, ProxyConfig, Publisher, ShardSelector};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🚀 Streamgate proxy starting...");

    let config = ProxyConfig::from_env()?;
    info!("Configuration:");
    info!("  Port: {}", config.port);
    info!("  Idle expiry: {}s", config.idle_expiry_secs);
    info!("  Max cached producers: {}", config.max_cache_entries);
    info!("  Shard count: {}", config.shard_count);
    info!("  Delivery semantic: {}", config.semantic);

    streamgate_observability::init();

    let factory: Arc<dyn HandleFactory> = Arc::new(MemoryBroker::new());
    info!("✓ Using in-memory broker");

    let cache = HandleCache::new(factory, config.cache_config());
    let maintenance = cache.start_maintenance(config.maintenance_interval());

    let publisher = Arc::new(Publisher::new(
        cache.clone(),
        ShardSelector::new(config.shard_count),
        config.semantic,
    ));

    let router = create_router(AppState { publisher });
    let shutdown = GracefulShutdown::default();
    serve_with_shutdown(router, config.port).await?;

    maintenance.abort();
    if tokio::time::timeout(shutdown.timeout, cache.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout = ?shutdown.timeout,
            "Timed out closing producer handles"
        );
    }

    Ok(())
}
