mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use sideload_core::config::SideloadConfig;
use sideload_server::{AppState, ServerConfig, router, start_retention_sweeper, worker::sweep_once};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sideload_server=debug,sideload_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or_default() {
        Commands::Run => run_server(cli.bind).await,
        Commands::Sweep => run_sweep().await,
    };

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn load_config() -> anyhow::Result<SideloadConfig> {
    let config = SideloadConfig::from_env().context("Failed to load configuration")?;
    config
        .prepare()
        .await
        .context("Failed to prepare working directories")?;
    Ok(config)
}

async fn run_server(bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    let server_config = ServerConfig::from_env(bind).map_err(anyhow::Error::msg)?;
    let config = load_config().await?;

    let sweeper = start_retention_sweeper(config.work_dirs.swept(), config.retention);
    let state = AppState::new(config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(server_config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.bind))?;
    tracing::info!("Sideload server listening on http://{}", server_config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down retention sweeper...");
    if let Err(e) = sweeper.shutdown().await {
        tracing::error!("Retention sweeper did not stop cleanly: {}", e);
    }
    Ok(())
}

async fn run_sweep() -> anyhow::Result<()> {
    let config = load_config().await?;
    let report = sweep_once(&config.work_dirs.swept(), config.retention.max_age).await;
    println!(
        "Swept {} files: {} removed, {} failed",
        report.scanned, report.removed, report.failed
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown signal received");
}
