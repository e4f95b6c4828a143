//! mirrorwatch - Docker registry mirror availability service
//!
//! Probes configured registry mirror proxies, records per-mirror statistics,
//! and regenerates the Docker daemon config from the fastest available subset.

mod batch;
mod config;
mod daemon;
mod db;
mod probe;
mod ranking;
mod scheduler;
mod stats;
mod web;

use config::ServerConfig;
use db::Store;
use scheduler::Scheduler;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("mirrorwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting mirrorwatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);
    tracing::info!("Watching {} mirrors", cfg.mirrors.len());

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Create scheduler and start the periodic probe loop
    let scheduler = Arc::new(Scheduler::new(cfg.clone(), store.clone())?);
    scheduler.start();

    // Start web server
    let server = Server::new(cfg, store, scheduler);
    server.start().await?;

    Ok(())
}
