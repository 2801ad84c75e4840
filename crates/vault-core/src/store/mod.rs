//! Storage abstraction for Fragment Vault.
//!
//! The [`Store`] trait defines the index primitives and metadata reads the
//! ranking engine, relationship discovery, and consolidation need, enabling
//! pluggable backends (SQLite, in-memory). Writes on the ingestion side go
//! through the application's own pipeline; the trait only carries the
//! operations the core consumes, plus the cascade delete consolidation
//! drives.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must provide snapshot-consistent reads: a concurrent scorer must never
//! observe an item mid-deletion.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Connection, ContentKind, SessionEntry};

/// Named vector space to search over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSpace {
    /// Fragment-level content embeddings.
    Content,
    /// Item-level metadata embeddings (title + tags + summary).
    Metadata,
}

/// A candidate returned from vector search.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub item_id: String,
    /// Set for content-space hits; `None` for metadata-space hits.
    pub fragment_id: Option<String>,
    /// Cosine similarity against the query vector.
    pub similarity: f64,
    /// Text excerpt for display.
    pub snippet: String,
}

/// A candidate returned from lexical search.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub item_id: String,
    pub fragment_id: String,
    /// Non-negative relevance rank (backends negate BM25 before returning).
    pub raw_rank: f64,
    pub snippet: String,
}

/// Candidate restriction pushed down into the store.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub kind: Option<ContentKind>,
    /// Unix-seconds lower bound on item creation time.
    pub created_after: Option<i64>,
    /// Every tag listed must match (substring, case-insensitive).
    pub tags: Vec<String>,
}

impl ItemFilter {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.created_after.is_none() && self.tags.is_empty()
    }
}

/// Lightweight item metadata for result assembly and scoring policy.
#[derive(Debug, Clone)]
pub struct ItemMetadata {
    pub id: String,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub kind: ContentKind,
    pub created_at: i64,
    pub enriched: bool,
    /// Total character length of the item's fragments.
    pub total_text_len: i64,
}

/// Abstract storage backend for the retrieval engine and batch subsystems.
#[async_trait]
pub trait Store: Send + Sync {
    /// Vector similarity search over the named space, most similar first.
    async fn vector_search(
        &self,
        space: VectorSpace,
        query_vec: &[f32],
        k: i64,
        filter: &ItemFilter,
    ) -> Result<Vec<VectorHit>>;

    /// Lexical relevance search over fragments, best rank first.
    async fn lexical_search(
        &self,
        terms: &[String],
        k: i64,
        filter: &ItemFilter,
    ) -> Result<Vec<LexicalHit>>;

    /// Retrieve metadata for a single item.
    async fn item_metadata(&self, id: &str) -> Result<Option<ItemMetadata>>;

    /// The item's metadata embedding, if enrichment has produced one.
    async fn metadata_vector(&self, id: &str) -> Result<Option<Vec<f32>>>;

    /// All content embeddings for an item, in fragment order.
    async fn fragment_vectors(&self, id: &str) -> Result<Vec<Vec<f32>>>;

    /// All item ids currently stored.
    async fn item_ids(&self) -> Result<Vec<String>>;

    /// Filtered items ordered by creation time descending.
    async fn recent_items(&self, filter: &ItemFilter, limit: i64) -> Result<Vec<ItemMetadata>>;

    /// The most recent session view entries, newest first.
    async fn recent_views(&self, limit: i64) -> Result<Vec<SessionEntry>>;

    /// Record or refresh a connection between two items.
    async fn upsert_connection(&self, a: &str, b: &str, score: f64) -> Result<()>;

    /// All connections touching an item, best score first.
    async fn connections_for(&self, id: &str) -> Result<Vec<Connection>>;

    /// Remove every connection touching an item.
    async fn clear_connections(&self, id: &str) -> Result<()>;

    /// Ids of text items whose total fragment length is in (0, max_len).
    async fn small_text_items(&self, max_len: i64) -> Result<Vec<String>>;

    /// The full text of an item (fragments joined in order).
    async fn item_text(&self, id: &str) -> Result<String>;

    /// Delete an item, cascading fragments, embeddings, connections, and
    /// session-history entries.
    async fn delete_item(&self, id: &str) -> Result<()>;
}
