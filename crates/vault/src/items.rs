//! Item listing, detail display, and session view recording.

use anyhow::{bail, Result};
use vault_core::store::{ItemFilter, Store};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn run_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let items = store.recent_items(&ItemFilter::default(), i64::MAX).await?;
    if items.is_empty() {
        println!("Vault is empty.");
        pool.close().await;
        return Ok(());
    }

    for item in &items {
        let title = item.title.as_deref().unwrap_or("(untitled)");
        let tags = if item.tags.is_empty() {
            "-".to_string()
        } else {
            item.tags.join(", ")
        };
        println!("{}  {:>5}  {}  [{}]", item.id, item.kind.as_str(), title, tags);
    }
    println!("{} item(s)", items.len());

    pool.close().await;
    Ok(())
}

pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let meta = match store.item_metadata(id).await? {
        Some(m) => m,
        None => bail!("Item not found: {}", id),
    };

    println!("id:       {}", meta.id);
    println!("kind:     {}", meta.kind.as_str());
    println!("title:    {}", meta.title.as_deref().unwrap_or("(untitled)"));
    println!("tags:     {}", if meta.tags.is_empty() { "-".into() } else { meta.tags.join(", ") });
    println!("summary:  {}", meta.summary.as_deref().unwrap_or("-"));
    println!("created:  {}", format_ts_iso(meta.created_at));
    println!("enriched: {}", meta.enriched);
    println!();

    let text = store.item_text(id).await?;
    println!("{}", text);

    let connections = store.connections_for(id).await?;
    if !connections.is_empty() {
        println!();
        println!("related:");
        for c in &connections {
            let other_id = c.other(id);
            let other_title = store
                .item_metadata(other_id)
                .await?
                .and_then(|m| m.title)
                .unwrap_or_else(|| "(untitled)".to_string());
            println!("  [{:.3}] {}  {}", c.score, other_title, other_id);
        }
    }

    pool.close().await;
    Ok(())
}

/// Record a view event for an item, then show a one-line confirmation.
/// The session booster reads the last few of these.
pub async fn run_view(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let meta = match store.item_metadata(id).await? {
        Some(m) => m,
        None => bail!("Item not found: {}", id),
    };

    store
        .record_view(id, chrono::Utc::now().timestamp())
        .await?;
    println!(
        "viewed {}  {}",
        meta.id,
        meta.title.as_deref().unwrap_or("(untitled)")
    );

    pool.close().await;
    Ok(())
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
