//! CDMI Server
//!
//! Opens the configured object store, bootstraps the CDMI tree, attaches
//! the storage backend and serves the REST API.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cdmi_server::{
    ApiServer, BackendRegistry, Orchestrator, Result, ServerConfig, StoreKind,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// CDMI Server - object store with capability tree and QoS transitions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "CDMI_CONFIG")]
    config: Option<PathBuf>,

    /// REST API bind address
    #[arg(long, env = "CDMI_API_ADDR")]
    api_addr: Option<SocketAddr>,

    /// Base directory of the filesystem store
    #[arg(long, env = "CDMI_BASE_DIRECTORY")]
    base_directory: Option<PathBuf>,

    /// Object store flavour (filesystem, keyvalue)
    #[arg(long, env = "CDMI_STORE")]
    store: Option<StoreKind>,

    /// Storage backend type
    #[arg(long, env = "CDMI_BACKEND_TYPE")]
    backend_type: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Defaults, then the config file, then CLI and environment
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(addr) = self.api_addr {
            config.api.addr = addr;
        }
        if let Some(base) = &self.base_directory {
            config.store.base_directory = base.clone();
        }
        if let Some(kind) = self.store {
            config.store.kind = kind;
        }
        if let Some(backend_type) = &self.backend_type {
            config.backend.backend_type = backend_type.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = args.server_config().context("invalid configuration")?;

    info!("Starting CDMI server");
    info!("  Version: {}", cdmi_server::VERSION);
    info!("  Store: {}", config.store.kind);
    info!("  Backend: {}", config.backend.backend_type);
    info!("  REST API: {}", config.api.addr);

    let hierarchy = config
        .open_hierarchy()
        .await
        .context("failed to open object store")?;
    info!(
        parent_policy = ?hierarchy.parent_policy(),
        "Object store opened"
    );

    let orchestrator = Orchestrator::new(
        config.orchestrator_config(),
        hierarchy,
        BackendRegistry::default(),
    );
    orchestrator
        .bootstrap()
        .await
        .context("failed to bootstrap CDMI tree")?;

    let api_server = ApiServer::new(config.api_config(), orchestrator.clone())?;

    info!("Starting API server");
    api_server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,tower=warn,tower_http=info",
            level.as_str().to_lowercase()
        ))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
