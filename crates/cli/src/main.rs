use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use l2_sync_config::SyncConfig;
use l2_sync_core::observability;
use l2_sync_core::Synchronizer;
use l2_sync_db::InMemoryDatabase;
use l2_sync_node_client::HttpNodeClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SyncConfig::parse();
    l2_sync_common::set_shell(l2_sync_common::Shell::new(config.verbosity()));
    observability::init();

    l2_sync_common::sh_println!("starting synchronizer against {}", config.node.url);
    tracing::info!(node_url = %config.node.url, limit = config.limit, "starting synchronizer");

    let node = Arc::new(HttpNodeClient::new(config.node.url.clone()));
    // No concrete persistent storage engine is specified for this deployment; `db_path` is
    // accepted for forward compatibility but the reference in-memory store is used here.
    let db = Arc::new(InMemoryDatabase::new());

    let synchronizer = Synchronizer::new(node, db, Duration::from_millis(config.retry_interval_ms));
    synchronizer
        .start(config.limit)
        .await
        .context("failed to start synchronizer")?;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    l2_sync_common::sh_println!("shutting down");
    tracing::info!("shutting down synchronizer");
    synchronizer.stop().await;

    Ok(())
}
