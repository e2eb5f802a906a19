//! Graceful Shutdown for the Streamgate API Server
//!
//! ## Features
//!
//! - SIGINT (Ctrl+C) handling
//! - SIGTERM handling (Unix only)
//! - In-flight request completion
//! - Bounded time for releasing producer handles after the server stops
//!
//! ## Environment Variables
//!
//! - `SHUTDOWN_TIMEOUT_SECS`: Maximum time to spend closing producers (default: 30)

use std::time::Duration;

/// How long the proxy may spend closing producers after the server stops.
#[derive(Debug, Clone)]
pub struct GracefulShutdown {
    pub timeout: Duration,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        let timeout_secs = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Shutdown signal type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Received SIGINT (Ctrl+C)
    SigInt,
    /// Received SIGTERM
    SigTerm,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            Self::SigTerm => write!(f, "SIGTERM"),
        }
    }
}

/// Completes when SIGINT or SIGTERM is received.
///
/// If a handler cannot be installed that signal is never reported.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        ShutdownSignal::SigInt
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        ShutdownSignal::SigTerm
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownSignal>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}

/// Serve `router` on `port` until SIGINT/SIGTERM, letting in-flight requests
/// finish.
pub async fn serve_with_shutdown(
    router: axum::Router,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 Streamgate proxy listening on {}", addr);
    tracing::info!("   Health: http://localhost:{}/health", port);
    tracing::info!("   Metrics: http://localhost:{}/metrics", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let signal = shutdown_signal().await;
            tracing::info!("📴 Received {}, initiating graceful shutdown...", signal);
        })
        .await?;

    tracing::info!("👋 Server shut down gracefully");

    Ok(())
}
