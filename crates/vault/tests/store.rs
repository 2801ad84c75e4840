//! SqliteStore behavior against a real (temporary) database.

use sqlx::SqlitePool;
use tempfile::TempDir;

use vault::config::{Config, DbConfig};
use vault::sqlite_store::SqliteStore;
use vault_core::embedding::vec_to_blob;
use vault_core::models::ContentKind;
use vault_core::store::{ItemFilter, Store, VectorSpace};

async fn setup() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        db: DbConfig {
            path: tmp.path().join("vault.sqlite"),
        },
        chunking: Default::default(),
        retrieval: Default::default(),
        connections: Default::default(),
        consolidation: Default::default(),
        embedding: Default::default(),
        llm: Default::default(),
    };
    let pool = vault::db::connect(&config).await.unwrap();
    vault::migrate::run_migrations(&pool).await.unwrap();
    (tmp, pool)
}

async fn insert_item(
    pool: &SqlitePool,
    id: &str,
    kind: ContentKind,
    created_at: i64,
    title: Option<&str>,
    tags: &str,
) {
    sqlx::query(
        r#"
        INSERT INTO items (id, source_path, kind, content_hash, title, tags, created_at, enriched)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(format!("/notes/{id}.txt"))
    .bind(kind.as_str())
    .bind(format!("hash-{id}"))
    .bind(title)
    .bind(tags)
    .bind(created_at)
    .bind(title.is_some() as i64)
    .execute(pool)
    .await
    .unwrap();
}

async fn insert_fragment(pool: &SqlitePool, id: &str, item_id: &str, seq: i64, text: &str, vector: &[f32]) {
    sqlx::query("INSERT INTO fragments (id, item_id, seq, text) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(item_id)
        .bind(seq)
        .bind(text)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO fragments_fts (fragment_id, item_id, text) VALUES (?, ?, ?)")
        .bind(id)
        .bind(item_id)
        .bind(text)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO fragment_vectors (fragment_id, item_id, embedding) VALUES (?, ?, ?)")
        .bind(id)
        .bind(item_id)
        .bind(vec_to_blob(vector))
        .execute(pool)
        .await
        .unwrap();
}

async fn set_metadata_vector(pool: &SqlitePool, item_id: &str, vector: &[f32]) {
    sqlx::query("INSERT INTO item_vectors (item_id, embedding) VALUES (?, ?)")
        .bind(item_id)
        .bind(vec_to_blob(vector))
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_content_vector_search_orders_by_similarity() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "near", ContentKind::Text, 100, Some("Near"), "").await;
    insert_item(&pool, "far", ContentKind::Text, 100, Some("Far"), "").await;
    insert_fragment(&pool, "f1", "near", 0, "close match", &[1.0, 0.0]).await;
    insert_fragment(&pool, "f2", "far", 0, "distant match", &[0.0, 1.0]).await;

    let store = SqliteStore::new(pool);
    let hits = store
        .vector_search(VectorSpace::Content, &[1.0, 0.0], 10, &ItemFilter::default())
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].item_id, "near");
    assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    assert!(hits[0].similarity > hits[1].similarity);
    assert!(hits[0].fragment_id.is_some());
    assert_eq!(hits[0].snippet, "close match");
}

#[tokio::test]
async fn test_metadata_vector_search() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "a", ContentKind::Text, 100, Some("Alpha"), "").await;
    set_metadata_vector(&pool, "a", &[0.6, 0.8]).await;

    let store = SqliteStore::new(pool);
    let hits = store
        .vector_search(VectorSpace::Metadata, &[0.6, 0.8], 10, &ItemFilter::default())
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item_id, "a");
    assert!(hits[0].fragment_id.is_none());
    assert!((hits[0].similarity - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_lexical_search_ranks_and_filters() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "txt", ContentKind::Text, 100, Some("T"), "work").await;
    insert_item(&pool, "img", ContentKind::Image, 100, Some("I"), "home").await;
    insert_fragment(
        &pool,
        "f1",
        "txt",
        0,
        "kubernetes deployment checklist for kubernetes clusters",
        &[1.0, 0.0],
    )
    .await;
    insert_fragment(&pool, "f2", "img", 0, "kubernetes screenshot", &[1.0, 0.0]).await;

    let store = SqliteStore::new(pool);
    let all = store
        .lexical_search(&["kubernetes".into()], 10, &ItemFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    for hit in &all {
        assert!(hit.raw_rank > 0.0, "BM25 rank must be negated to positive");
    }

    let filter = ItemFilter {
        kind: Some(ContentKind::Text),
        ..Default::default()
    };
    let only_text = store
        .lexical_search(&["kubernetes".into()], 10, &filter)
        .await
        .unwrap();
    assert_eq!(only_text.len(), 1);
    assert_eq!(only_text[0].item_id, "txt");
}

#[tokio::test]
async fn test_lexical_search_empty_terms() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool);
    let hits = store
        .lexical_search(&[], 10, &ItemFilter::default())
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_tag_filter_matches_substring_case_insensitive() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "a", ContentKind::Text, 100, Some("A"), "Work, rust").await;
    insert_item(&pool, "b", ContentKind::Text, 200, Some("B"), "personal").await;

    let store = SqliteStore::new(pool);
    let filter = ItemFilter {
        tags: vec!["work".into()],
        ..Default::default()
    };
    let items = store.recent_items(&filter, 10).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "a");
}

#[tokio::test]
async fn test_recent_items_ordering_and_date_filter() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "oldest", ContentKind::Text, 100, None, "").await;
    insert_item(&pool, "middle", ContentKind::Text, 200, None, "").await;
    insert_item(&pool, "newest", ContentKind::Text, 300, None, "").await;

    let store = SqliteStore::new(pool);
    let items = store
        .recent_items(&ItemFilter::default(), 10)
        .await
        .unwrap();
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["newest", "middle", "oldest"]);

    let filter = ItemFilter {
        created_after: Some(150),
        ..Default::default()
    };
    let recent = store.recent_items(&filter, 10).await.unwrap();
    assert_eq!(recent.len(), 2);
}

#[tokio::test]
async fn test_item_metadata_includes_text_len_and_tags() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "a", ContentKind::Text, 100, Some("Alpha"), "work, rust").await;
    insert_fragment(&pool, "f1", "a", 0, "12345", &[1.0]).await;
    insert_fragment(&pool, "f2", "a", 1, "678", &[1.0]).await;

    let store = SqliteStore::new(pool);
    let meta = store.item_metadata("a").await.unwrap().unwrap();
    assert_eq!(meta.total_text_len, 8);
    assert_eq!(meta.tags, vec!["work", "rust"]);
    assert!(meta.enriched);
    assert!(store.item_metadata("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_connection_upsert_is_symmetric_and_idempotent() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "a", ContentKind::Text, 100, None, "").await;
    insert_item(&pool, "b", ContentKind::Text, 100, None, "").await;

    let store = SqliteStore::new(pool);
    store.upsert_connection("b", "a", 0.8).await.unwrap();
    store.upsert_connection("a", "b", 0.9).await.unwrap();

    let from_a = store.connections_for("a").await.unwrap();
    let from_b = store.connections_for("b").await.unwrap();
    assert_eq!(from_a.len(), 1);
    assert_eq!(from_b.len(), 1);
    assert!((from_a[0].score - 0.9).abs() < 1e-9);
    assert_eq!(from_a[0].item_a, "a");
    assert_eq!(from_a[0].item_b, "b");
}

#[tokio::test]
async fn test_delete_item_cascades_everywhere() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "a", ContentKind::Text, 100, Some("A"), "").await;
    insert_item(&pool, "b", ContentKind::Text, 100, Some("B"), "").await;
    insert_fragment(&pool, "f1", "a", 0, "text of a", &[1.0, 0.0]).await;
    set_metadata_vector(&pool, "a", &[1.0, 0.0]).await;

    let store = SqliteStore::new(pool);
    store.upsert_connection("a", "b", 0.9).await.unwrap();
    store.record_view("a", 123).await.unwrap();

    store.delete_item("a").await.unwrap();

    assert!(store.item_metadata("a").await.unwrap().is_none());
    assert!(store.fragment_vectors("a").await.unwrap().is_empty());
    assert!(store.metadata_vector("a").await.unwrap().is_none());
    assert!(store.connections_for("b").await.unwrap().is_empty());
    assert!(store.recent_views(10).await.unwrap().is_empty());
    let hits = store
        .lexical_search(&["text".into()], 10, &ItemFilter::default())
        .await
        .unwrap();
    assert!(hits.is_empty(), "FTS rows must be gone after delete");
}

#[tokio::test]
async fn test_small_text_items_threshold() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "tiny", ContentKind::Text, 100, None, "").await;
    insert_item(&pool, "big", ContentKind::Text, 100, None, "").await;
    insert_item(&pool, "img", ContentKind::Image, 100, None, "").await;
    insert_fragment(&pool, "f1", "tiny", 0, "short note", &[1.0]).await;
    insert_fragment(&pool, "f2", "big", 0, &"x".repeat(400), &[1.0]).await;
    insert_fragment(&pool, "f3", "img", 0, "ocr text", &[1.0]).await;

    let store = SqliteStore::new(pool);
    let small = store.small_text_items(300).await.unwrap();
    assert_eq!(small, vec!["tiny"]);
}

#[tokio::test]
async fn test_item_text_joins_fragments_in_order() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "a", ContentKind::Text, 100, None, "").await;
    insert_fragment(&pool, "f2", "a", 1, "second", &[1.0]).await;
    insert_fragment(&pool, "f1", "a", 0, "first", &[1.0]).await;

    let store = SqliteStore::new(pool);
    assert_eq!(store.item_text("a").await.unwrap(), "first\nsecond");
}

#[tokio::test]
async fn test_recent_views_newest_first() {
    let (_tmp, pool) = setup().await;
    insert_item(&pool, "a", ContentKind::Text, 100, None, "").await;
    insert_item(&pool, "b", ContentKind::Text, 100, None, "").await;

    let store = SqliteStore::new(pool);
    store.record_view("a", 100).await.unwrap();
    store.record_view("b", 200).await.unwrap();
    store.record_view("a", 300).await.unwrap();

    let views = store.recent_views(2).await.unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].item_id, "a");
    assert_eq!(views[0].viewed_at, 300);
    assert_eq!(views[1].item_id, "b");
}
