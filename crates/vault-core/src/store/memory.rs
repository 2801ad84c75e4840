//! In-memory [`Store`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine similarity over all stored vectors;
//! lexical search is a term-occurrence count, which is enough to exercise
//! the normalization and fusion paths.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Connection, ContentKind, Fragment, Item, SessionEntry};

use super::{ItemFilter, ItemMetadata, LexicalHit, Store, VectorHit, VectorSpace};

struct StoredVector {
    fragment_id: String,
    item_id: String,
    vector: Vec<f32>,
}

/// In-memory store backing the core engine's tests.
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<String, Item>>,
    fragments: RwLock<Vec<Fragment>>,
    vectors: RwLock<Vec<StoredVector>>,
    metadata_vectors: RwLock<HashMap<String, Vec<f32>>>,
    connections: RwLock<HashMap<(String, String), f64>>,
    views: RwLock<Vec<SessionEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item record.
    pub fn insert_item(&self, item: Item) {
        self.items.write().unwrap().insert(item.id.clone(), item);
    }

    /// Append a fragment with its content embedding.
    pub fn insert_fragment(&self, fragment: Fragment, vector: Vec<f32>) {
        self.vectors.write().unwrap().push(StoredVector {
            fragment_id: fragment.id.clone(),
            item_id: fragment.item_id.clone(),
            vector,
        });
        self.fragments.write().unwrap().push(fragment);
    }

    /// Attach or replace an item's metadata embedding.
    pub fn set_metadata_vector(&self, item_id: &str, vector: Vec<f32>) {
        self.metadata_vectors
            .write()
            .unwrap()
            .insert(item_id.to_string(), vector);
    }

    /// Append a session view event.
    pub fn record_view(&self, item_id: &str, viewed_at: i64) {
        self.views.write().unwrap().push(SessionEntry {
            item_id: item_id.to_string(),
            viewed_at,
        });
    }

    pub fn item_count(&self) -> usize {
        self.items.read().unwrap().len()
    }

    fn matches(item: &Item, filter: &ItemFilter) -> bool {
        if let Some(kind) = filter.kind {
            if item.kind != kind {
                return false;
            }
        }
        if let Some(after) = filter.created_after {
            if item.created_at < after {
                return false;
            }
        }
        for tag in &filter.tags {
            let tag_lower = tag.to_lowercase();
            if !item
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(&tag_lower))
            {
                return false;
            }
        }
        true
    }

    fn metadata_of(&self, item: &Item) -> ItemMetadata {
        let total_text_len: i64 = self
            .fragments
            .read()
            .unwrap()
            .iter()
            .filter(|f| f.item_id == item.id)
            .map(|f| f.text.chars().count() as i64)
            .sum();
        ItemMetadata {
            id: item.id.clone(),
            title: item.title.clone(),
            tags: item.tags.clone(),
            summary: item.summary.clone(),
            kind: item.kind,
            created_at: item.created_at,
            enriched: item.enriched,
            total_text_len,
        }
    }

    fn snippet_for_item(item: &Item) -> String {
        item.summary
            .clone()
            .or_else(|| item.title.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn vector_search(
        &self,
        space: VectorSpace,
        query_vec: &[f32],
        k: i64,
        filter: &ItemFilter,
    ) -> Result<Vec<VectorHit>> {
        let items = self.items.read().unwrap();
        let mut hits: Vec<VectorHit> = match space {
            VectorSpace::Content => {
                let vectors = self.vectors.read().unwrap();
                let fragments = self.fragments.read().unwrap();
                vectors
                    .iter()
                    .filter(|sv| {
                        items
                            .get(&sv.item_id)
                            .map(|i| Self::matches(i, filter))
                            .unwrap_or(false)
                    })
                    .map(|sv| {
                        let snippet = fragments
                            .iter()
                            .find(|f| f.id == sv.fragment_id)
                            .map(|f| f.text.chars().take(240).collect::<String>())
                            .unwrap_or_default();
                        VectorHit {
                            item_id: sv.item_id.clone(),
                            fragment_id: Some(sv.fragment_id.clone()),
                            similarity: cosine_similarity(query_vec, &sv.vector) as f64,
                            snippet,
                        }
                    })
                    .collect()
            }
            VectorSpace::Metadata => {
                let meta = self.metadata_vectors.read().unwrap();
                meta.iter()
                    .filter_map(|(item_id, vector)| {
                        let item = items.get(item_id)?;
                        if !Self::matches(item, filter) {
                            return None;
                        }
                        Some(VectorHit {
                            item_id: item_id.clone(),
                            fragment_id: None,
                            similarity: cosine_similarity(query_vec, vector) as f64,
                            snippet: Self::snippet_for_item(item),
                        })
                    })
                    .collect()
            }
        };

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k as usize);
        Ok(hits)
    }

    async fn lexical_search(
        &self,
        terms: &[String],
        k: i64,
        filter: &ItemFilter,
    ) -> Result<Vec<LexicalHit>> {
        let lowered: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        if lowered.is_empty() {
            return Ok(Vec::new());
        }
        let items = self.items.read().unwrap();
        let fragments = self.fragments.read().unwrap();
        let mut hits: Vec<LexicalHit> = fragments
            .iter()
            .filter(|f| {
                items
                    .get(&f.item_id)
                    .map(|i| Self::matches(i, filter))
                    .unwrap_or(false)
            })
            .filter_map(|f| {
                let text = f.text.to_lowercase();
                // Occurrence count stands in for a BM25 rank.
                let occurrences: usize = lowered.iter().map(|t| text.matches(t.as_str()).count()).sum();
                if occurrences == 0 {
                    return None;
                }
                Some(LexicalHit {
                    item_id: f.item_id.clone(),
                    fragment_id: f.id.clone(),
                    raw_rank: occurrences as f64,
                    snippet: f.text.chars().take(240).collect(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.raw_rank
                .partial_cmp(&a.raw_rank)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k as usize);
        Ok(hits)
    }

    async fn item_metadata(&self, id: &str) -> Result<Option<ItemMetadata>> {
        let items = self.items.read().unwrap();
        Ok(items.get(id).map(|i| self.metadata_of(i)))
    }

    async fn metadata_vector(&self, id: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.metadata_vectors.read().unwrap().get(id).cloned())
    }

    async fn fragment_vectors(&self, id: &str) -> Result<Vec<Vec<f32>>> {
        Ok(self
            .vectors
            .read()
            .unwrap()
            .iter()
            .filter(|sv| sv.item_id == id)
            .map(|sv| sv.vector.clone())
            .collect())
    }

    async fn item_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.items.read().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn recent_items(&self, filter: &ItemFilter, limit: i64) -> Result<Vec<ItemMetadata>> {
        let items = self.items.read().unwrap();
        let mut matched: Vec<ItemMetadata> = items
            .values()
            .filter(|i| Self::matches(i, filter))
            .map(|i| self.metadata_of(i))
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        matched.truncate(limit as usize);
        Ok(matched)
    }

    async fn recent_views(&self, limit: i64) -> Result<Vec<SessionEntry>> {
        let views = self.views.read().unwrap();
        Ok(views.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn upsert_connection(&self, a: &str, b: &str, score: f64) -> Result<()> {
        let c = Connection::new(a, b, score);
        self.connections
            .write()
            .unwrap()
            .insert((c.item_a, c.item_b), score);
        Ok(())
    }

    async fn connections_for(&self, id: &str) -> Result<Vec<Connection>> {
        let connections = self.connections.read().unwrap();
        let mut out: Vec<Connection> = connections
            .iter()
            .filter(|((a, b), _)| a == id || b == id)
            .map(|((a, b), score)| Connection {
                item_a: a.clone(),
                item_b: b.clone(),
                score: *score,
            })
            .collect();
        out.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(out)
    }

    async fn clear_connections(&self, id: &str) -> Result<()> {
        self.connections
            .write()
            .unwrap()
            .retain(|(a, b), _| a != id && b != id);
        Ok(())
    }

    async fn small_text_items(&self, max_len: i64) -> Result<Vec<String>> {
        let items = self.items.read().unwrap();
        let fragments = self.fragments.read().unwrap();
        let mut lens: HashMap<&str, i64> = HashMap::new();
        for f in fragments.iter() {
            *lens.entry(f.item_id.as_str()).or_insert(0) += f.text.chars().count() as i64;
        }
        let mut ids: Vec<String> = items
            .values()
            .filter(|i| i.kind == ContentKind::Text)
            .filter(|i| {
                let len = lens.get(i.id.as_str()).copied().unwrap_or(0);
                len > 0 && len < max_len
            })
            .map(|i| i.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn item_text(&self, id: &str) -> Result<String> {
        let fragments = self.fragments.read().unwrap();
        let mut own: Vec<&Fragment> = fragments.iter().filter(|f| f.item_id == id).collect();
        own.sort_by_key(|f| f.seq);
        Ok(own
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn delete_item(&self, id: &str) -> Result<()> {
        self.items.write().unwrap().remove(id);
        self.fragments.write().unwrap().retain(|f| f.item_id != id);
        self.vectors.write().unwrap().retain(|sv| sv.item_id != id);
        self.metadata_vectors.write().unwrap().remove(id);
        self.connections
            .write()
            .unwrap()
            .retain(|(a, b), _| a != id && b != id);
        self.views.write().unwrap().retain(|v| v.item_id != id);
        Ok(())
    }
}
