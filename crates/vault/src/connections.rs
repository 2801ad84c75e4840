//! Connection commands: per-item discovery, listing, and the full sweep.

use anyhow::{bail, Result};
use vault_core::relate;
use vault_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Refresh and list the connections of one item.
pub async fn run_related(config: &Config, id: &str, rediscover: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    if store.item_metadata(id).await?.is_none() {
        bail!("Item not found: {}", id);
    }

    if rediscover {
        relate::discover_for_item(&store, id, config.connections.threshold).await?;
    }

    let connections = store.connections_for(id).await?;
    if connections.is_empty() {
        println!("No connections.");
        pool.close().await;
        return Ok(());
    }

    for c in &connections {
        let other_id = c.other(id);
        let title = store
            .item_metadata(other_id)
            .await?
            .and_then(|m| m.title)
            .unwrap_or_else(|| "(untitled)".to_string());
        println!("[{:.3}] {}  {}", c.score, title, other_id);
    }

    pool.close().await;
    Ok(())
}

/// Recompute the connection set for the whole vault.
pub async fn run_sweep(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let count = relate::sweep(&store, config.connections.threshold).await?;
    println!("sweep complete: {} connection(s)", count);

    pool.close().await;
    Ok(())
}
