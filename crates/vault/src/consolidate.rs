//! The `consolidate` command: cluster small notes and merge them.
//!
//! The core clustering loop lives in `vault_core::consolidate`; this
//! module supplies the generative merger and the sink that feeds merged
//! notes back through the full ingestion pipeline.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use vault_core::consolidate::{self, MergedNote, MergeSink};
use vault_core::models::ContentKind;

use crate::config::Config;
use crate::db;
use crate::ingest::ingest_text;
use crate::llm::GenerativeClient;
use crate::sqlite_store::SqliteStore;

/// Feeds merged notes back through ingestion, so they get fragmented,
/// embedded, enriched, and connected like anything else.
struct PipelineSink<'a> {
    config: &'a Config,
    pool: &'a SqlitePool,
}

#[async_trait]
impl MergeSink for PipelineSink<'_> {
    async fn ingest_merged(&self, note: &MergedNote) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(note.body.as_bytes());
        let content_hash = format!("{:x}", hasher.finalize());

        let source_path = format!("consolidated/{}", slugify(&note.title));
        let outcome = ingest_text(
            self.config,
            self.pool,
            &source_path,
            ContentKind::Text,
            &note.body,
            &content_hash,
            None,
        )
        .await?;
        // A byte-identical merge result is already in the vault; treating
        // it as the target keeps consolidation idempotent.
        Ok(outcome.item_id().to_string())
    }
}

fn slugify(title: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "note".to_string()
    } else {
        slug
    }
}

pub async fn run_consolidation(config: &Config) -> Result<()> {
    if !config.llm.enabled {
        bail!("Consolidation requires the generative service. Set [llm] in config.");
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let merger = GenerativeClient::new(&config.llm)?;
    let sink = PipelineSink {
        config,
        pool: &pool,
    };

    let report = consolidate::run(&store, &merger, &sink, &config.consolidation.params()).await?;

    if report.merged.is_empty() && report.failed_clusters == 0 {
        println!("Nothing to consolidate.");
    } else {
        for record in &report.merged {
            println!(
                "merged {} note(s) into \"{}\" ({})",
                record.source_items.len(),
                record.title,
                record.new_item
            );
        }
        if report.failed_clusters > 0 {
            println!("{} cluster(s) failed and were left untouched", report.failed_clusters);
        }
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Grocery list #2"), "Grocery_list__2");
        assert_eq!(slugify(""), "note");
    }
}
