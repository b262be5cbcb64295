//! widgetmesh node
//!
//! Brings up the state layer for one worker process, reports its topology
//! and holds it until a shutdown signal arrives.

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};

use widgetmesh_core::config::StateConfig;
use widgetmesh_state::StateContext;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Node error: {e:#}");
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment.
fn load_configuration() -> anyhow::Result<StateConfig> {
    let env = std::env::var("WIDGETMESH_ENV").unwrap_or_else(|_| "development".to_string());
    StateConfig::load(&env).with_context(|| format!("loading configuration for env '{env}'"))
}

/// Initialize tracing/logging
fn init_logging(config: &StateConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: StateConfig) -> anyhow::Result<()> {
    tracing::info!("Starting widgetmesh node v{}", env!("CARGO_PKG_VERSION"));

    let ctx = StateContext::new(config)
        .await
        .context("initializing state backend")?;

    let healthy = ctx.health_check().await.context("state health check")?;
    if !healthy {
        anyhow::bail!("state backend reported unhealthy at startup");
    }

    tracing::info!(
        backend = %ctx.config().backend,
        deploy_mode = ctx.is_deploy_mode(),
        worker_id = %ctx.worker_id(),
        "Node ready"
    );

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, releasing worker state...");

    let released = ctx.shutdown().await.context("releasing worker connections")?;
    tracing::info!(released, "Node stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
