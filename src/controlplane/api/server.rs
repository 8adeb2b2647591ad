//! API Server
//!
//! Serves the REST router until a shutdown signal arrives.

use crate::error::{Error, Result};
use axum::extract::DefaultBodyLimit;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::metrics::ApiMetrics;
use super::rest::RestRouter;
use crate::controlplane::Orchestrator;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
    /// Max request body size
    pub max_body_size: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server
pub struct ApiServer {
    config: ApiServerConfig,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<ApiMetrics>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, orchestrator: Arc<Orchestrator>) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            orchestrator,
            metrics: Arc::new(ApiMetrics::new()?),
            shutdown_tx,
        })
    }

    /// Run the API server until shutdown
    pub async fn run(&self) -> Result<()> {
        info!("Starting CDMI API server");
        info!("  REST API: {}", self.config.rest_addr);

        let rest_handle = self.spawn_rest_server();

        tokio::select! {
            result = rest_handle => {
                match result {
                    Ok(Err(e)) => {
                        error!("REST server error: {:?}", e);
                        return Err(e);
                    }
                    Err(e) => error!("REST server task failed: {:?}", e),
                    Ok(Ok(())) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                self.shutdown();
            }
        }

        Ok(())
    }

    /// Spawn the REST server
    fn spawn_rest_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let config = self.config.clone();
        let router = RestRouter::new(self.orchestrator.clone(), self.metrics.clone());
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move { run_rest_server(config, router, shutdown_rx).await })
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Run the REST API server
async fn run_rest_server(
    config: ApiServerConfig,
    router: RestRouter,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = router
        .build()
        .layer(DefaultBodyLimit::max(config.max_body_size));

    info!("REST API listening on {}", config.rest_addr);

    let listener = tokio::net::TcpListener::bind(config.rest_addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("REST server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

    Ok(())
}
