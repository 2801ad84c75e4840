//! Relationship discovery: pairwise similarity over item mean embeddings.
//!
//! Each item is represented by the component-wise mean of its fragment
//! embeddings. Two items are connected when the cosine similarity of
//! their means strictly exceeds the threshold. Discovery runs
//! incrementally after ingestion (one item against all others) or as a
//! full sweep; either way, an item's connection set is cleared before
//! refresh so stale edges never survive a vector change.

use anyhow::Result;
use tracing::{debug, info};

use crate::embedding::{cosine_similarity, mean_vector};
use crate::store::Store;

/// Similarity must strictly exceed this for a connection to exist.
pub const CONNECTION_THRESHOLD: f64 = 0.75;

/// Mean embedding of an item, or `None` if it has no stored vectors.
pub async fn mean_embedding<S: Store>(store: &S, item_id: &str) -> Result<Option<Vec<f32>>> {
    let vectors = store.fragment_vectors(item_id).await?;
    Ok(mean_vector(&vectors))
}

/// Compare one item against every other item, refreshing its connections.
///
/// This is the common post-ingest case. Returns the number of connections
/// recorded. An item without embeddings simply has no connections.
pub async fn discover_for_item<S: Store>(
    store: &S,
    item_id: &str,
    threshold: f64,
) -> Result<usize> {
    let mean_new = match mean_embedding(store, item_id).await? {
        Some(m) => m,
        None => {
            debug!(item = %item_id, "no embeddings, skipping connection discovery");
            return Ok(0);
        }
    };

    store.clear_connections(item_id).await?;

    let mut count = 0usize;
    for other_id in store.item_ids().await? {
        if other_id == item_id {
            continue;
        }
        let mean_other = match mean_embedding(store, &other_id).await? {
            Some(m) => m,
            None => continue,
        };
        let sim = cosine_similarity(&mean_new, &mean_other) as f64;
        if sim > threshold {
            store.upsert_connection(item_id, &other_id, sim).await?;
            count += 1;
        }
    }

    if count > 0 {
        info!(item = %item_id, connections = count, "connections recorded");
    }
    Ok(count)
}

/// Recompute connections for the whole vault.
///
/// O(n²) over items; mean embeddings are computed once per item. Every
/// item's connection set is rebuilt from the current vectors. Returns the
/// number of connections recorded.
pub async fn sweep<S: Store>(store: &S, threshold: f64) -> Result<usize> {
    let ids = store.item_ids().await?;

    let mut means: Vec<(String, Vec<f32>)> = Vec::with_capacity(ids.len());
    for id in &ids {
        store.clear_connections(id).await?;
        if let Some(mean) = mean_embedding(store, id).await? {
            means.push((id.clone(), mean));
        }
    }

    let mut count = 0usize;
    for i in 0..means.len() {
        for j in (i + 1)..means.len() {
            let sim = cosine_similarity(&means[i].1, &means[j].1) as f64;
            if sim > threshold {
                store
                    .upsert_connection(&means[i].0, &means[j].0, sim)
                    .await?;
                count += 1;
            }
        }
    }

    info!(items = means.len(), connections = count, "connection sweep complete");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentKind, Fragment, Item};
    use crate::store::memory::InMemoryStore;

    fn seed_item(store: &InMemoryStore, id: &str, vectors: &[Vec<f32>]) {
        store.insert_item(Item {
            id: id.to_string(),
            source_path: String::new(),
            kind: ContentKind::Text,
            content_hash: String::new(),
            file_mtime: None,
            title: None,
            tags: Vec::new(),
            summary: None,
            created_at: 0,
            enriched: false,
        });
        for (i, v) in vectors.iter().enumerate() {
            store.insert_fragment(
                Fragment {
                    id: format!("{id}-f{i}"),
                    item_id: id.to_string(),
                    seq: i as i64,
                    text: "text".to_string(),
                },
                v.clone(),
            );
        }
    }

    #[tokio::test]
    async fn test_connection_above_threshold_only() {
        let store = InMemoryStore::new();
        seed_item(&store, "a", &[vec![1.0, 0.0]]);
        seed_item(&store, "b", &[vec![0.9, 0.1]]); // sim ≈ 0.994
        seed_item(&store, "c", &[vec![0.0, 1.0]]); // sim 0 to a

        let n = discover_for_item(&store, "a", CONNECTION_THRESHOLD)
            .await
            .unwrap();
        assert_eq!(n, 1);
        let conns = store.connections_for("a").await.unwrap();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].other("a"), "b");
        assert!(conns[0].score > CONNECTION_THRESHOLD);
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let store = InMemoryStore::new();
        // cos(a, b) = 0.75 exactly: a = (1, 0), b = (0.75, sqrt(1 - 0.75²)).
        seed_item(&store, "a", &[vec![1.0, 0.0]]);
        let y = (1.0f32 - 0.75 * 0.75).sqrt();
        seed_item(&store, "b", &[vec![0.75, y]]);

        let n = discover_for_item(&store, "a", 0.75).await.unwrap();
        assert_eq!(n, 0, "similarity exactly at the threshold must not connect");
    }

    #[tokio::test]
    async fn test_connections_are_symmetric() {
        let store = InMemoryStore::new();
        seed_item(&store, "a", &[vec![1.0, 0.0]]);
        seed_item(&store, "b", &[vec![0.95, 0.05]]);

        discover_for_item(&store, "a", CONNECTION_THRESHOLD)
            .await
            .unwrap();
        let from_a = store.connections_for("a").await.unwrap();
        let from_b = store.connections_for("b").await.unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_a[0].score, from_b[0].score);
        assert_eq!(from_a[0].item_a, from_b[0].item_a);
        assert_eq!(from_a[0].item_b, from_b[0].item_b);
    }

    #[tokio::test]
    async fn test_mean_embedding_over_fragments() {
        let store = InMemoryStore::new();
        seed_item(&store, "a", &[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let mean = mean_embedding(&store, "a").await.unwrap().unwrap();
        assert!((mean[0] - 0.5).abs() < 1e-6);
        assert!((mean[1] - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_refresh_clears_stale_connections() {
        let store = InMemoryStore::new();
        seed_item(&store, "a", &[vec![1.0, 0.0]]);
        seed_item(&store, "b", &[vec![0.95, 0.05]]);
        discover_for_item(&store, "a", CONNECTION_THRESHOLD)
            .await
            .unwrap();
        assert_eq!(store.connections_for("a").await.unwrap().len(), 1);

        // Re-ingestion replaced a's vectors with something unrelated.
        store.delete_item("a").await.unwrap();
        seed_item(&store, "a", &[vec![0.0, 1.0]]);
        discover_for_item(&store, "a", CONNECTION_THRESHOLD)
            .await
            .unwrap();
        assert!(store.connections_for("a").await.unwrap().is_empty());
        assert!(store.connections_for("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_item_removes_its_connections() {
        let store = InMemoryStore::new();
        seed_item(&store, "a", &[vec![1.0, 0.0]]);
        seed_item(&store, "b", &[vec![0.95, 0.05]]);
        discover_for_item(&store, "a", CONNECTION_THRESHOLD)
            .await
            .unwrap();

        store.delete_item("b").await.unwrap();
        assert!(store.connections_for("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_connects_all_pairs() {
        let store = InMemoryStore::new();
        seed_item(&store, "a", &[vec![1.0, 0.0]]);
        seed_item(&store, "b", &[vec![0.98, 0.02]]);
        seed_item(&store, "c", &[vec![0.97, 0.03]]);
        seed_item(&store, "d", &[vec![0.0, 1.0]]);

        let n = sweep(&store, CONNECTION_THRESHOLD).await.unwrap();
        // a-b, a-c, b-c connect; d connects to nothing.
        assert_eq!(n, 3);
        assert!(store.connections_for("d").await.unwrap().is_empty());
        assert_eq!(store.connections_for("a").await.unwrap().len(), 2);
    }
}
