//! Ingestion pipeline: read → dedup → fragment → embed → store → enrich →
//! connect.
//!
//! Duplicates (by content hash) are a distinct non-fatal outcome, not an
//! error. Enrichment and connection discovery run inline after storage
//! but are individually non-fatal: a down generative service leaves the
//! item searchable by content, just untitled.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use vault_core::embedding::vec_to_blob;
use vault_core::models::ContentKind;
use vault_core::relate;

use crate::chunk::fragment_text;
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::llm::GenerativeClient;
use crate::sqlite_store::SqliteStore;

/// Result of an ingestion attempt.
#[derive(Debug)]
pub enum IngestOutcome {
    Ingested { item_id: String },
    Duplicate { existing_id: String },
}

impl IngestOutcome {
    pub fn item_id(&self) -> &str {
        match self {
            IngestOutcome::Ingested { item_id } => item_id,
            IngestOutcome::Duplicate { existing_id } => existing_id,
        }
    }
}

/// Ingest a UTF-8 text file from disk.
pub async fn ingest_file(config: &Config, pool: &SqlitePool, path: &Path) -> Result<IngestOutcome> {
    let start = std::time::Instant::now();

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let text = String::from_utf8(bytes.clone())
        .map_err(|_| anyhow::anyhow!("File is not valid UTF-8: {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    let file_mtime = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64);

    let outcome = ingest_text(
        config,
        pool,
        &path.display().to_string(),
        ContentKind::Text,
        &text,
        &content_hash,
        file_mtime,
    )
    .await?;

    if let IngestOutcome::Ingested { item_id } = &outcome {
        info!(
            item = %item_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ingested {}",
            path.display()
        );
    }
    Ok(outcome)
}

/// Ingest already-extracted text. This is the path consolidation re-enters.
pub async fn ingest_text(
    config: &Config,
    pool: &SqlitePool,
    source_path: &str,
    kind: ContentKind,
    text: &str,
    content_hash: &str,
    file_mtime: Option<i64>,
) -> Result<IngestOutcome> {
    if text.trim().is_empty() {
        bail!("No text content to ingest");
    }

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM items WHERE content_hash = ?")
            .bind(content_hash)
            .fetch_optional(pool)
            .await?;
    if let Some(existing_id) = existing {
        return Ok(IngestOutcome::Duplicate { existing_id });
    }

    let item_id = Uuid::new_v4().to_string();
    let fragments = fragment_text(&item_id, text, config.chunking.max_fragment_chars);
    if fragments.is_empty() {
        bail!("No text content to ingest");
    }

    let embedder = EmbeddingClient::new(&config.embedding)?;
    if !embedder.is_enabled() {
        bail!("Ingestion requires an embedding provider. Set [embedding] in config.");
    }
    let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();
    let vectors = embedder.embed_texts(&texts).await?;
    if vectors.len() != fragments.len() {
        bail!(
            "Embedding count mismatch: {} fragments, {} vectors",
            fragments.len(),
            vectors.len()
        );
    }

    let created_at = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO items (id, source_path, kind, content_hash, file_mtime, created_at, enriched)
        VALUES (?, ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(&item_id)
    .bind(source_path)
    .bind(kind.as_str())
    .bind(content_hash)
    .bind(file_mtime)
    .bind(created_at)
    .execute(&mut *tx)
    .await?;

    for fragment in &fragments {
        sqlx::query("INSERT INTO fragments (id, item_id, seq, text) VALUES (?, ?, ?, ?)")
            .bind(&fragment.id)
            .bind(&item_id)
            .bind(fragment.seq)
            .bind(&fragment.text)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO fragments_fts (fragment_id, item_id, text) VALUES (?, ?, ?)")
            .bind(&fragment.id)
            .bind(&item_id)
            .bind(&fragment.text)
            .execute(&mut *tx)
            .await?;
    }

    for (fragment, vector) in fragments.iter().zip(vectors.iter()) {
        sqlx::query(
            "INSERT INTO fragment_vectors (fragment_id, item_id, embedding) VALUES (?, ?, ?)",
        )
        .bind(&fragment.id)
        .bind(&item_id)
        .bind(vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    // Enrichment fills title/tags/summary and the metadata embedding;
    // failure leaves the item searchable by content alone.
    if config.llm.enabled {
        if let Err(e) = enrich_item(config, pool, &item_id, text).await {
            warn!(item = %item_id, error = %e, "enrichment failed, item stays unenriched");
        }
    }

    let store = SqliteStore::new(pool.clone());
    if let Err(e) = relate::discover_for_item(&store, &item_id, config.connections.threshold).await
    {
        warn!(item = %item_id, error = %e, "connection discovery failed");
    }

    Ok(IngestOutcome::Ingested { item_id })
}

/// Generate title/tags/summary, then build the metadata embedding.
pub async fn enrich_item(
    config: &Config,
    pool: &SqlitePool,
    item_id: &str,
    text: &str,
) -> Result<()> {
    let llm = GenerativeClient::new(&config.llm)?;
    let enrichment = llm.enrich(text).await?;

    sqlx::query("UPDATE items SET title = ?, tags = ?, summary = ?, enriched = 1 WHERE id = ?")
        .bind(&enrichment.title)
        .bind(enrichment.tags.join(", "))
        .bind(&enrichment.summary)
        .bind(item_id)
        .execute(pool)
        .await?;

    let metadata_text = format!(
        "{}\n{}\n{}",
        enrichment.title,
        enrichment.tags.join(", "),
        enrichment.summary
    );
    let embedder = EmbeddingClient::new(&config.embedding)?;
    let vector = embedder.embed_query(&metadata_text).await?;

    sqlx::query(
        r#"
        INSERT INTO item_vectors (item_id, embedding) VALUES (?, ?)
        ON CONFLICT(item_id) DO UPDATE SET embedding = excluded.embedding
        "#,
    )
    .bind(item_id)
    .bind(vec_to_blob(&vector))
    .execute(pool)
    .await?;

    info!(item = %item_id, title = %enrichment.title, "item enriched");
    Ok(())
}
