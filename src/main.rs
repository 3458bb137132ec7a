use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::auth::TokenService;
use storefront::config::Config;
use storefront::engine::MockGateway;
use storefront::storage::S3ImageStore;
use storefront::AppState;

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(author, version, about = "Storefront and admin API for a small online shop", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "STOREFRONT_CONFIG", default_value = "storefront.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        environment = %config.server.environment,
        "Starting Storefront v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize database
    let db = storefront::db::init(&config.database).await?;

    // Ensure an initial admin exists
    storefront::db::ensure_admin_user(&db, &config.auth.admin_email, &config.auth.admin_password)
        .await?;

    let tokens = TokenService::new(
        &config.auth.jwt_secret,
        chrono::Duration::minutes(config.auth.token_ttl_minutes),
        db.clone(),
    )
    .context("Failed to initialize token service")?;

    let images = S3ImageStore::connect(&config.storage)
        .await
        .context("Failed to initialize object storage")?;

    let gateway = MockGateway::new(Duration::from_millis(config.payment.simulated_latency_ms));

    let metrics_handle = storefront::api::metrics::init_metrics()?;

    let state = Arc::new(
        AppState::new(
            config.clone(),
            db,
            tokens,
            Arc::new(images),
            Arc::new(gateway),
        )
        .with_metrics(metrics_handle),
    );

    let app = storefront::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
