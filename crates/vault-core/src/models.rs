//! Core data models used throughout Fragment Vault.
//!
//! These types represent the items, fragments, connections, and session
//! history that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Broad classification of an item's source content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
        }
    }

    /// Parse the storage representation. Unknown values map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ContentKind::Text),
            "image" => Some(ContentKind::Image),
            _ => None,
        }
    }
}

/// One ingested unit of content with its enrichment metadata.
///
/// Created by ingestion; `title`, `tags`, `summary`, and `enriched` are
/// filled in by the enrichment pass. Search never mutates an item.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: String,
    pub source_path: String,
    pub kind: ContentKind,
    pub content_hash: String,
    /// Source file modification time (Unix seconds), when known.
    pub file_mtime: Option<i64>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    /// Creation time as Unix seconds.
    pub created_at: i64,
    pub enriched: bool,
}

/// An ordered chunk of an item's extracted text.
///
/// Immutable once created; owned by its item and deleted with it.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub id: String,
    pub item_id: String,
    pub seq: i64,
    pub text: String,
}

/// A recorded high-similarity relationship between two items.
///
/// The pair is unordered: `item_a` always sorts before `item_b`, so
/// (a, b) and (b, a) are the same fact.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub item_a: String,
    pub item_b: String,
    /// Cosine similarity of the items' mean embeddings, in [0, 1].
    pub score: f64,
}

impl Connection {
    /// Build a connection with the canonical pair ordering.
    pub fn new(a: &str, b: &str, score: f64) -> Self {
        let (item_a, item_b) = if a <= b { (a, b) } else { (b, a) };
        Connection {
            item_a: item_a.to_string(),
            item_b: item_b.to_string(),
            score,
        }
    }

    /// The other endpoint, given one of the pair.
    pub fn other(&self, id: &str) -> &str {
        if self.item_a == id {
            &self.item_b
        } else {
            &self.item_a
        }
    }
}

/// One entry of the append-only view log.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub item_id: String,
    /// View time as Unix seconds.
    pub viewed_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        assert_eq!(ContentKind::parse("text"), Some(ContentKind::Text));
        assert_eq!(ContentKind::parse("image"), Some(ContentKind::Image));
        assert_eq!(ContentKind::parse("audio"), None);
        assert_eq!(ContentKind::Text.as_str(), "text");
    }

    #[test]
    fn test_connection_canonical_order() {
        let c1 = Connection::new("b", "a", 0.8);
        let c2 = Connection::new("a", "b", 0.8);
        assert_eq!(c1.item_a, "a");
        assert_eq!(c1.item_b, "b");
        assert_eq!(c1.item_a, c2.item_a);
        assert_eq!(c1.item_b, c2.item_b);
        assert_eq!(c1.other("a"), "b");
        assert_eq!(c1.other("b"), "a");
    }
}
