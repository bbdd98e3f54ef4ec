use anyhow::{Context, Result};
use estate_sync::catalog::SrealityClient;
use estate_sync::store::{ListingRepository, MemoryRepository, PostgresRepository};
use estate_sync::{AppConfig, Reconciler, SyncCoordinator};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🏠 Estate Sync - Sreality listing reconciler");
    info!("============================================");

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let run_once = std::env::args().skip(1).any(|arg| arg == "--once");

    let repo: Arc<dyn ListingRepository> = match &config.database_url {
        Some(url) => Arc::new(
            PostgresRepository::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?,
        ),
        None => {
            warn!("DATABASE_URL not set, listings are kept in memory only");
            Arc::new(MemoryRepository::new())
        }
    };

    let client = SrealityClient::with_config(config.api.clone())?;
    let reconciler = Reconciler::new(Arc::new(client), repo.clone(), config.sync.batch_size);
    let coordinator = SyncCoordinator::new(reconciler);

    if run_once || !config.sync.enabled {
        info!("Running a single sync cycle");
        let outcome = coordinator.run_now().await?;

        println!("Fetched:     {}", outcome.total_items);
        println!("New:         {}", outcome.new_items);
        println!("Updated:     {}", outcome.updated_items);
        println!("Deactivated: {}", outcome.deleted_items);
        println!("Skipped:     {}", outcome.skipped_items);

        let stats = repo.stats().await?;
        println!(
            "Store now holds {} listings ({} active, {} inactive)",
            stats.total, stats.active, stats.inactive
        );
        return Ok(());
    }

    let mut scheduler = coordinator
        .schedule_recurring(&config.sync.schedule)
        .await?;

    info!("Waiting for scheduled runs, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down scheduler");
    scheduler
        .shutdown()
        .await
        .context("Failed to stop scheduler")?;

    Ok(())
}
