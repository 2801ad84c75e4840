//! SQLite-backed [`Store`] implementation.
//!
//! Lexical search rides the FTS5 index (BM25 rank, negated to a positive
//! relevance score); vector search is brute-force cosine similarity over
//! BLOB-encoded embeddings, which is plenty for a personal vault. Filter
//! predicates are pushed down into SQL so candidates are restricted
//! before scoring.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use vault_core::embedding::{blob_to_vec, cosine_similarity};
use vault_core::models::{Connection, ContentKind, SessionEntry};
use vault_core::store::{
    ItemFilter, ItemMetadata, LexicalHit, Store, VectorHit, VectorSpace,
};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record a session view event. The engine only ever reads the
    /// last-N window; pruning older rows is an optimization, not a
    /// correctness requirement.
    pub async fn record_view(&self, item_id: &str, viewed_at: i64) -> Result<()> {
        sqlx::query("INSERT INTO session_history (item_id, viewed_at) VALUES (?, ?)")
            .bind(item_id)
            .bind(viewed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Append the filter's SQL predicates (over alias `i`) and collect binds.
fn filter_clause(filter: &ItemFilter, sql: &mut String, binds: &mut Vec<String>) {
    if let Some(kind) = filter.kind {
        sql.push_str(" AND i.kind = ?");
        binds.push(kind.as_str().to_string());
    }
    if let Some(after) = filter.created_after {
        sql.push_str(" AND i.created_at >= ?");
        binds.push(after.to_string());
    }
    for tag in &filter.tags {
        sql.push_str(" AND LOWER(COALESCE(i.tags, '')) LIKE ?");
        binds.push(format!("%{}%", tag.to_lowercase()));
    }
}

fn split_tags(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn row_to_metadata(row: &sqlx::sqlite::SqliteRow) -> ItemMetadata {
    let kind: String = row.get("kind");
    ItemMetadata {
        id: row.get("id"),
        title: row.get("title"),
        tags: split_tags(row.get("tags")),
        summary: row.get("summary"),
        kind: ContentKind::parse(&kind).unwrap_or(ContentKind::Text),
        created_at: row.get("created_at"),
        enriched: row.get::<i64, _>("enriched") != 0,
        total_text_len: row.get("total_text_len"),
    }
}

const METADATA_COLUMNS: &str = "i.id, i.title, i.tags, i.summary, i.kind, i.created_at, i.enriched, \
     COALESCE((SELECT SUM(LENGTH(f.text)) FROM fragments f WHERE f.item_id = i.id), 0) AS total_text_len";

#[async_trait]
impl Store for SqliteStore {
    async fn vector_search(
        &self,
        space: VectorSpace,
        query_vec: &[f32],
        k: i64,
        filter: &ItemFilter,
    ) -> Result<Vec<VectorHit>> {
        let mut sql = match space {
            VectorSpace::Content => String::from(
                r#"
                SELECT fv.fragment_id AS fragment_id, fv.item_id AS item_id, fv.embedding AS embedding,
                       COALESCE(substr(f.text, 1, 240), '') AS snippet
                FROM fragment_vectors fv
                JOIN fragments f ON f.id = fv.fragment_id
                JOIN items i ON i.id = fv.item_id
                WHERE 1=1
                "#,
            ),
            VectorSpace::Metadata => String::from(
                r#"
                SELECT NULL AS fragment_id, iv.item_id AS item_id, iv.embedding AS embedding,
                       COALESCE(i.summary, COALESCE(i.title, '')) AS snippet
                FROM item_vectors iv
                JOIN items i ON i.id = iv.item_id
                WHERE 1=1
                "#,
            ),
        };
        let mut binds = Vec::new();
        filter_clause(filter, &mut sql, &mut binds);

        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut candidates: Vec<VectorHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                VectorHit {
                    item_id: row.get("item_id"),
                    fragment_id: row.get("fragment_id"),
                    similarity: cosine_similarity(query_vec, &vec) as f64,
                    snippet: row.get("snippet"),
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k as usize);
        Ok(candidates)
    }

    async fn lexical_search(
        &self,
        terms: &[String],
        k: i64,
        filter: &ItemFilter,
    ) -> Result<Vec<LexicalHit>> {
        let match_expr = fts_match_expr(terms);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r#"
            SELECT fragments_fts.fragment_id AS fragment_id,
                   fragments_fts.item_id AS item_id,
                   rank,
                   snippet(fragments_fts, 2, '>>>', '<<<', '...', 48) AS snippet
            FROM fragments_fts
            JOIN items i ON i.id = fragments_fts.item_id
            WHERE fragments_fts MATCH ?
            "#,
        );
        let mut binds = Vec::new();
        filter_clause(filter, &mut sql, &mut binds);
        sql.push_str(" ORDER BY rank LIMIT ?");

        let mut query = sqlx::query(&sql).bind(&match_expr);
        for b in &binds {
            query = query.bind(b);
        }
        query = query.bind(k);

        let rows = query.fetch_all(&self.pool).await?;

        let candidates: Vec<LexicalHit> = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                LexicalHit {
                    item_id: row.get("item_id"),
                    fragment_id: row.get("fragment_id"),
                    // FTS5 rank is more negative for better matches.
                    raw_rank: -rank,
                    snippet: row.get("snippet"),
                }
            })
            .collect();

        Ok(candidates)
    }

    async fn item_metadata(&self, id: &str) -> Result<Option<ItemMetadata>> {
        let sql = format!("SELECT {METADATA_COLUMNS} FROM items i WHERE i.id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_metadata))
    }

    async fn metadata_vector(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let row = sqlx::query("SELECT embedding FROM item_vectors WHERE item_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| blob_to_vec(&r.get::<Vec<u8>, _>("embedding"))))
    }

    async fn fragment_vectors(&self, id: &str) -> Result<Vec<Vec<f32>>> {
        let rows = sqlx::query(
            r#"
            SELECT fv.embedding AS embedding
            FROM fragment_vectors fv
            JOIN fragments f ON f.id = fv.fragment_id
            WHERE fv.item_id = ?
            ORDER BY f.seq ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| blob_to_vec(&r.get::<Vec<u8>, _>("embedding")))
            .collect())
    }

    async fn item_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT id FROM items ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn recent_items(&self, filter: &ItemFilter, limit: i64) -> Result<Vec<ItemMetadata>> {
        let mut sql = format!("SELECT {METADATA_COLUMNS} FROM items i WHERE 1=1");
        let mut binds = Vec::new();
        filter_clause(filter, &mut sql, &mut binds);
        sql.push_str(" ORDER BY i.created_at DESC, i.id ASC LIMIT ?");

        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b);
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_metadata).collect())
    }

    async fn recent_views(&self, limit: i64) -> Result<Vec<SessionEntry>> {
        let rows = sqlx::query(
            "SELECT item_id, viewed_at FROM session_history ORDER BY viewed_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| SessionEntry {
                item_id: r.get("item_id"),
                viewed_at: r.get("viewed_at"),
            })
            .collect())
    }

    async fn upsert_connection(&self, a: &str, b: &str, score: f64) -> Result<()> {
        let c = Connection::new(a, b, score);
        sqlx::query(
            r#"
            INSERT INTO connections (item_a, item_b, score) VALUES (?, ?, ?)
            ON CONFLICT(item_a, item_b) DO UPDATE SET score = excluded.score
            "#,
        )
        .bind(&c.item_a)
        .bind(&c.item_b)
        .bind(c.score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn connections_for(&self, id: &str) -> Result<Vec<Connection>> {
        let rows = sqlx::query(
            "SELECT item_a, item_b, score FROM connections WHERE item_a = ? OR item_b = ? ORDER BY score DESC",
        )
        .bind(id)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Connection {
                item_a: r.get("item_a"),
                item_b: r.get("item_b"),
                score: r.get("score"),
            })
            .collect())
    }

    async fn clear_connections(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM connections WHERE item_a = ? OR item_b = ?")
            .bind(id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn small_text_items(&self, max_len: i64) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT i.id
            FROM items i
            JOIN fragments f ON f.item_id = i.id
            WHERE i.kind = 'text'
            GROUP BY i.id
            HAVING SUM(LENGTH(f.text)) > 0 AND SUM(LENGTH(f.text)) < ?
            ORDER BY i.id
            "#,
        )
        .bind(max_len)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn item_text(&self, id: &str) -> Result<String> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT text FROM fragments WHERE item_id = ? ORDER BY seq ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.join("\n"))
    }

    async fn delete_item(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM fragment_vectors WHERE item_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM fragments_fts WHERE item_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM fragments WHERE item_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM item_vectors WHERE item_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM connections WHERE item_a = ? OR item_b = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM session_history WHERE item_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Build an FTS5 MATCH expression: each term quoted, OR-joined.
fn fts_match_expr(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}
