use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cadence_channels::{MastodonPublisher, PublisherRegistry, XPublisher};
use cadence_content::{ConfigCatalog, SqliteContentStore};
use cadence_core::{config::DEFAULT_X_BASE_URL, CadenceConfig};
use cadence_scheduler::{
    ExecutionCoordinator, RetryPolicy, ScheduleStore, SchedulerEngine, SchedulerHandle,
};
use clap::Parser;
use rusqlite::Connection;
use tracing::info;

mod app;
mod http;

#[derive(Parser, Debug)]
#[command(name = "cadence-gateway", version, about = "Scheduled social publishing service")]
struct Cli {
    /// Config file path (default: ~/.cadence/cadence.toml).
    #[arg(long, env = "CADENCE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cadence_gateway=info,cadence_scheduler=info,cadence=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = CadenceConfig::load(cli.config.as_deref()).context("loading config")?;

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // single SQLite file for all subsystems
    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path)?;
    info!(path = %db_path, "opening SQLite database");

    // each subsystem gets its own connection; constructors run their migrations
    let content = Arc::new(SqliteContentStore::new(Connection::open(&db_path)?)?);
    let engine_store = Arc::new(ScheduleStore::new(Connection::open(&db_path)?)?);
    let handle_store = Arc::new(ScheduleStore::new(Connection::open(&db_path)?)?);
    info!("database migrations complete");

    let publishers = build_registry(&config)?;
    info!(channels = ?publishers.channel_types(), "publishers registered");

    let sched = &config.scheduler;
    let mut coordinator = ExecutionCoordinator::new(
        engine_store,
        content.clone(),
        content.clone(),
        Arc::new(ConfigCatalog::new(config.channels.clone())),
        publishers,
        RetryPolicy::from_config(&config.retry),
    )
    .with_publish_timeout(Duration::from_secs(sched.publish_timeout_secs))
    .with_lease_timeout(Duration::from_secs(sched.lease_timeout_secs));
    if let Some(ref worker_id) = sched.worker_id {
        coordinator = coordinator.with_worker_id(worker_id.clone());
    }
    let coordinator = Arc::new(coordinator);
    let worker_id = coordinator.worker_id().to_string();
    let engine = SchedulerEngine::new(coordinator, sched);

    let state = Arc::new(app::AppState {
        config: config.clone(),
        scheduler: SchedulerHandle::new(handle_store),
        content,
        worker_id,
    });
    let router = app::build_router(state);

    // spawn scheduler engine loop in background
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Cadence gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // signal scheduler to stop and let the current tick finish
    let _ = shutdown_tx.send(true);
    engine_task.await?;
    Ok(())
}

/// Register one publisher per supported channel.
fn build_registry(config: &CadenceConfig) -> anyhow::Result<PublisherRegistry> {
    let x_base = config
        .channels
        .x
        .as_ref()
        .map(|x| x.base_url.clone())
        .unwrap_or_else(|| DEFAULT_X_BASE_URL.to_string());

    let mut registry = PublisherRegistry::new();
    registry.register(Arc::new(XPublisher::new(x_base)?));
    registry.register(Arc::new(MastodonPublisher::new()?));
    Ok(registry)
}

fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    Ok(())
}
