//! Binary entry point: loads configuration, brings up logging, wires
//! the Project Registry, per-project Flow/Rule Stores and
//! Interceptors, the Ingress Server, and the optional rule-match
//! sidecar into one running hub.

mod config;
mod mock_api;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hub_core::{Mode, Router};
use hub_flowstore::FlowStore;
use hub_ingress::{IngressConfig, IngressServer};
use hub_interceptor::ProjectInterceptor;
use indexmap::IndexMap;

use config::HubConfig;

#[derive(Parser)]
#[command(name = "hubd")]
#[command(about = "Developer-tool interception hub: routes captured flows between agents and projects")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'v', long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the ingress server and (optionally) the rule-match sidecar.
    Serve {
        /// Path to a TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the ingress port from the config file.
        #[arg(long)]
        port: Option<u16>,

        /// Register a single catch-all project at startup, in
        /// `id=name` form, for quick manual testing.
        #[arg(long)]
        project: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = config::LoggingSection::default();
    logging.level = cli.log_level.clone();
    config::init_logging(&logging);

    match cli.command {
        Commands::Serve { config: config_path, port, project } => {
            serve(config_path, port, project).await
        }
    }
}

async fn serve(config_path: Option<PathBuf>, port: Option<u16>, project: Option<String>) -> anyhow::Result<()> {
    let mut hub_config = HubConfig::load(config_path.as_deref())?;
    if let Some(port) = port {
        hub_config.ingress.port = port;
    }
    config::init_logging(&hub_config.logging);

    let router = Arc::new(Router::new());
    let mut rule_stores = IndexMap::new();

    if let Some(spec) = project {
        let (project_id, name) = spec.split_once('=').unwrap_or((spec.as_str(), spec.as_str()));
        let flow_store = Arc::new(FlowStore::new(hub_config.flow_store.to_runtime()));
        let rule_store = Arc::new(hub_core::mock::RuleStore::new(hub_config.mock.cache_capacity));
        rule_stores.insert(project_id.to_string(), Arc::clone(&rule_store));

        let interceptor = Arc::new(
            ProjectInterceptor::new(project_id, flow_store, rule_store).with_debug_timeout(
                std::time::Duration::from_secs(hub_config.interceptor.debug_timeout_secs),
            ),
        );
        router.register(project_id, name, Mode::Record, interceptor, None);
        tracing::info!(project_id, name, "registered startup project");
    }

    let ingress_config = IngressConfig {
        port: hub_config.ingress.port,
        worker_count: hub_config.ingress.worker_count,
        channel_capacity: hub_config.ingress.channel_capacity,
        ..IngressConfig::default()
    };
    let server = Arc::new(IngressServer::new(ingress_config, Arc::clone(&router)));
    server.start().await?;

    let sidecar_handle = if hub_config.sidecar.enabled {
        let state = mock_api::SidecarState::new(rule_stores);
        let app = mock_api::router(state);
        let bind = hub_config.sidecar.bind.clone();
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        tracing::info!(%bind, "rule-match sidecar listening");
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "rule-match sidecar exited");
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    server.stop().await;
    if let Some(handle) = sidecar_handle {
        handle.abort();
    }
    Ok(())
}
