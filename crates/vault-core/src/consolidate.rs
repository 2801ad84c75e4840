//! Fragment consolidation: cluster small related items and merge them.
//!
//! Items whose total text falls under a smallness threshold are compared
//! pairwise by mean embedding and grouped transitively with a union-find
//! over arena indices — items are addressed by index and id, never by
//! live references, so deletions mid-batch cannot dangle. Clusters of two
//! or more go to an external [`NoteMerger`]; a successful merge is handed
//! to the [`MergeSink`] (re-entering the full ingestion path) and the
//! source items are deleted. A failed cluster is left whole and does not
//! affect the others, and the loop is interruptible between clusters.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::embedding::cosine_similarity;
use crate::error::ServiceError;
use crate::relate::mean_embedding;
use crate::store::Store;

/// Consolidation policy knobs.
#[derive(Debug, Clone)]
pub struct ConsolidationParams {
    /// Items with total text length in (0, max_note_len) are candidates.
    pub max_note_len: i64,
    /// Mutual similarity at or above this joins two items transitively.
    pub cluster_threshold: f64,
}

impl Default for ConsolidationParams {
    fn default() -> Self {
        Self {
            max_note_len: 300,
            cluster_threshold: 0.70,
        }
    }
}

/// A merged note produced by the external text-merging service.
#[derive(Debug, Clone)]
pub struct MergedNote {
    pub title: String,
    pub body: String,
}

/// Trait for the external text-merging collaborator.
#[async_trait]
pub trait NoteMerger: Send + Sync {
    /// Merge several note texts into one consolidated title + body.
    async fn merge(&self, notes: &[String]) -> Result<MergedNote, ServiceError>;
}

/// Receives successful merges, re-entering the ingestion path.
#[async_trait]
pub trait MergeSink: Send + Sync {
    /// Store the merged note as a fresh item; returns the new item id.
    async fn ingest_merged(&self, note: &MergedNote) -> Result<String>;
}

/// One successfully consolidated cluster.
#[derive(Debug, Clone)]
pub struct MergeRecord {
    pub new_item: String,
    pub title: String,
    pub source_items: Vec<String>,
}

/// Outcome of a consolidation run.
#[derive(Debug, Default)]
pub struct ConsolidationReport {
    pub merged: Vec<MergeRecord>,
    /// Clusters whose merge or re-ingestion failed; their items are
    /// untouched.
    pub failed_clusters: usize,
}

/// Disjoint-set forest over arena indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression.
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Group items transitively: any above-threshold pair joins its members.
///
/// Pure over the candidate vectors, so clustering is testable without a
/// store. Returns clusters of size ≥ 2 as arena-index groups, each sorted.
pub fn cluster_indices(vectors: &[Vec<f32>], threshold: f64) -> Vec<Vec<usize>> {
    let n = vectors.len();
    let mut uf = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let sim = cosine_similarity(&vectors[i], &vectors[j]) as f64;
            if sim >= threshold {
                uf.union(i, j);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        let root = uf.find(i);
        groups[root].push(i);
    }
    groups.retain(|g| g.len() >= 2);
    groups
}

/// Run one consolidation pass.
///
/// Failures are isolated per cluster: a merge or re-ingestion error marks
/// that cluster failed and the loop continues with the next one.
pub async fn run<S: Store>(
    store: &S,
    merger: &dyn NoteMerger,
    sink: &dyn MergeSink,
    params: &ConsolidationParams,
) -> Result<ConsolidationReport> {
    let candidate_ids = store.small_text_items(params.max_note_len).await?;

    // Arena: candidates with a usable mean embedding.
    let mut ids: Vec<String> = Vec::new();
    let mut vectors: Vec<Vec<f32>> = Vec::new();
    for id in candidate_ids {
        match mean_embedding(store, &id).await? {
            Some(mean) => {
                ids.push(id);
                vectors.push(mean);
            }
            None => {
                debug!(item = %id, "small item has no embeddings, not clustering");
            }
        }
    }

    let mut report = ConsolidationReport::default();
    if ids.len() < 2 {
        debug!(candidates = ids.len(), "not enough small items to consolidate");
        return Ok(report);
    }

    let clusters = cluster_indices(&vectors, params.cluster_threshold);
    info!(candidates = ids.len(), clusters = clusters.len(), "consolidation clusters formed");

    for cluster in clusters {
        let member_ids: Vec<String> = cluster.iter().map(|&i| ids[i].clone()).collect();

        let mut texts = Vec::with_capacity(member_ids.len());
        for id in &member_ids {
            texts.push(store.item_text(id).await?);
        }

        let note = match merger.merge(&texts).await {
            Ok(note) => note,
            Err(e) => {
                warn!(members = member_ids.len(), error = %e, "cluster merge failed, leaving items untouched");
                report.failed_clusters += 1;
                continue;
            }
        };

        let new_item = match sink.ingest_merged(&note).await {
            Ok(id) => id,
            Err(e) => {
                warn!(members = member_ids.len(), error = %e, "merged note ingestion failed, leaving items untouched");
                report.failed_clusters += 1;
                continue;
            }
        };

        // Sources go away only after the merged item exists.
        for id in &member_ids {
            store.delete_item(id).await?;
        }

        info!(new_item = %new_item, merged = member_ids.len(), title = %note.title, "cluster consolidated");
        report.merged.push(MergeRecord {
            new_item,
            title: note.title,
            source_items: member_ids,
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentKind, Fragment, Item};
    use crate::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn seed_note(store: &InMemoryStore, id: &str, text: &str, vector: Vec<f32>) {
        store.insert_item(Item {
            id: id.to_string(),
            source_path: format!("/notes/{id}.txt"),
            kind: ContentKind::Text,
            content_hash: format!("hash-{id}"),
            file_mtime: None,
            title: Some(id.to_string()),
            tags: Vec::new(),
            summary: None,
            created_at: 0,
            enriched: false,
        });
        store.insert_fragment(
            Fragment {
                id: format!("{id}-f0"),
                item_id: id.to_string(),
                seq: 0,
                text: text.to_string(),
            },
            vector,
        );
    }

    struct JoiningMerger;

    #[async_trait]
    impl NoteMerger for JoiningMerger {
        async fn merge(&self, notes: &[String]) -> Result<MergedNote, ServiceError> {
            Ok(MergedNote {
                title: "Merged".to_string(),
                body: notes.join("\n"),
            })
        }
    }

    /// Fails the first `fail_first` merge calls, then succeeds.
    struct FlakyMerger {
        fail_first: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NoteMerger for FlakyMerger {
        async fn merge(&self, notes: &[String]) -> Result<MergedNote, ServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ServiceError::Transient("merge timed out".into()));
            }
            Ok(MergedNote {
                title: "Merged".to_string(),
                body: notes.join("\n"),
            })
        }
    }

    /// Records merged notes as fresh items in the same store.
    struct StoreSink<'a> {
        store: &'a InMemoryStore,
        counter: AtomicUsize,
        created: Mutex<Vec<String>>,
    }

    impl<'a> StoreSink<'a> {
        fn new(store: &'a InMemoryStore) -> Self {
            StoreSink {
                store,
                counter: AtomicUsize::new(0),
                created: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MergeSink for StoreSink<'_> {
        async fn ingest_merged(&self, note: &MergedNote) -> Result<String> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let id = format!("merged-{n}");
            seed_note(self.store, &id, &note.body, vec![1.0, 0.0]);
            self.created.lock().unwrap().push(id.clone());
            Ok(id)
        }
    }

    #[test]
    fn test_cluster_transitivity() {
        // a~b and b~c above threshold, a~c below: all three in one cluster.
        let a = vec![1.0, 0.0];
        let b = vec![0.8, (1.0f32 - 0.64).sqrt()];
        let c = vec![0.3, (1.0f32 - 0.09).sqrt()];
        assert!(cosine_similarity(&a, &b) >= 0.70);
        assert!(cosine_similarity(&b, &c) >= 0.70);
        assert!(cosine_similarity(&a, &c) < 0.70);

        let clusters = cluster_indices(&[a, b, c], 0.70);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], vec![0, 1, 2]);
    }

    #[test]
    fn test_no_singleton_clusters() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let clusters = cluster_indices(&vectors, 0.70);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_disjoint_clusters() {
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.99, 0.01],
            vec![0.0, 1.0],
            vec![0.01, 0.99],
        ];
        let clusters = cluster_indices(&vectors, 0.70);
        assert_eq!(clusters.len(), 2);
    }

    #[tokio::test]
    async fn test_consolidation_merges_and_deletes_sources() {
        let store = InMemoryStore::new();
        seed_note(&store, "n1", "buy milk", vec![1.0, 0.0]);
        seed_note(&store, "n2", "buy bread", vec![0.98, 0.02]);
        seed_note(&store, "other", "quantum entanglement", vec![0.0, 1.0]);

        let sink = StoreSink::new(&store);
        let report = run(&store, &JoiningMerger, &sink, &ConsolidationParams::default())
            .await
            .unwrap();

        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.failed_clusters, 0);
        let record = &report.merged[0];
        assert_eq!(record.source_items.len(), 2);
        // Sources deleted, merged item and the unrelated note remain.
        assert!(store.item_metadata("n1").await.unwrap().is_none());
        assert!(store.item_metadata("n2").await.unwrap().is_none());
        assert!(store.item_metadata("other").await.unwrap().is_some());
        assert!(store
            .item_metadata(&record.new_item)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_cluster_left_whole_others_proceed() {
        let store = InMemoryStore::new();
        // Two disjoint clusters.
        seed_note(&store, "a1", "alpha one", vec![1.0, 0.0]);
        seed_note(&store, "a2", "alpha two", vec![0.99, 0.01]);
        seed_note(&store, "b1", "beta one", vec![0.0, 1.0]);
        seed_note(&store, "b2", "beta two", vec![0.01, 0.99]);

        let merger = FlakyMerger {
            fail_first: 1,
            calls: AtomicUsize::new(0),
        };
        let sink = StoreSink::new(&store);
        let report = run(&store, &merger, &sink, &ConsolidationParams::default())
            .await
            .unwrap();

        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.failed_clusters, 1);

        // The failed cluster is fully intact — never partially deleted.
        let merged_sources = &report.merged[0].source_items;
        let all = ["a1", "a2", "b1", "b2"];
        let surviving: Vec<&str> = {
            let mut v = Vec::new();
            for id in all {
                if store.item_metadata(id).await.unwrap().is_some() {
                    v.push(id);
                }
            }
            v
        };
        assert_eq!(surviving.len(), 2);
        for id in &surviving {
            assert!(!merged_sources.iter().any(|s| s == id));
        }
    }

    #[tokio::test]
    async fn test_single_candidate_never_merges() {
        let store = InMemoryStore::new();
        seed_note(&store, "lonely", "a short note", vec![1.0, 0.0]);

        let sink = StoreSink::new(&store);
        let report = run(&store, &JoiningMerger, &sink, &ConsolidationParams::default())
            .await
            .unwrap();
        assert!(report.merged.is_empty());
        assert!(store.item_metadata("lonely").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_large_items_not_considered() {
        let store = InMemoryStore::new();
        seed_note(&store, "big1", &"x".repeat(400), vec![1.0, 0.0]);
        seed_note(&store, "big2", &"y".repeat(400), vec![0.99, 0.01]);

        let sink = StoreSink::new(&store);
        let report = run(&store, &JoiningMerger, &sink, &ConsolidationParams::default())
            .await
            .unwrap();
        assert!(report.merged.is_empty());
    }
}
