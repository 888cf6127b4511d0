//! db-datastore - Main entry point.
//!
//! Loads a JSON datastore file, creates the enabled pools, prints their
//! identifiers and optionally runs one read-only query against a pool.

use clap::Parser;
use db_datastore::config::{Config, DatastoreConfig};
use db_datastore::db::PoolRegistry;
use db_datastore::logging::init_tracing;
use db_datastore::models::Statement;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config.log_level, config.json_logs);

    info!(
        config = %config.config.display(),
        "Starting db-datastore v{}",
        env!("CARGO_PKG_VERSION")
    );

    let datastore = DatastoreConfig::from_path(&config.config)?;
    let registry = PoolRegistry::new();
    let summary = registry.initialize(&datastore.pools).await;

    for (id, e) in &summary.failed {
        error!(pool_id = %id, error = %e, suggestion = ?e.suggestion(), "Pool unavailable");
    }

    for id in registry.list_ids().await {
        println!("{id}");
    }

    let result = match &config.pool {
        Some(pool_id) => run_probe(&registry, pool_id, &config.query).await,
        None => Ok(()),
    };

    registry.destroy_all().await;

    if let Err(e) = result {
        error!(error = %e, "Probe query failed");
        return Err(e);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn run_probe(
    registry: &PoolRegistry,
    pool_id: &str,
    sql: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut executor = registry.acquire_executor(pool_id).await?;
    let rows = executor.query_map_list(&Statement::from(sql)).await;
    executor.close_quietly().await;

    let rows = rows?;
    info!(pool_id = %pool_id, rows = rows.len(), "Probe query finished");
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
