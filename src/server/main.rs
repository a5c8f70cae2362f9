// src/server/main.rs
// Entry point del server spesa
use log::{error, info};
use spesa::server::{auth, config::ServerConfig, connection::Server, database::Database};
use spesa::utils::{logger, performance};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    logger::init(Some(&config.log_level));

    let database = Arc::new(Database::connect(&config.database_url).await?);

    info!("🗄️ Running database migrations...");
    database.migrate().await.map_err(|e| {
        error!("Database migration failed: {}", e);
        e
    })?;
    info!("✅ Database migrations completed successfully");

    if let Err(e) = auth::cleanup_expired_sessions(database.clone()).await {
        error!("Failed to clean up expired sessions: {}", e);
    }

    // Stats logger in background
    let stats_db = database.clone();
    let stats_path = config.performance_log_path.clone();
    let stats_interval = Duration::from_secs(config.stats_interval_secs);
    tokio::spawn(async move {
        info!("📊 Starting stats logger - every {}s", stats_interval.as_secs());
        performance::start_performance_logger(stats_db, stats_path, stats_interval).await;
    });

    let server = Server::new(database, config.clone());
    server.run(&config.bind_addr()).await
}
