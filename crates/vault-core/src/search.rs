//! The retrieval and ranking engine.
//!
//! Operates entirely through the [`Store`] trait: the calling application
//! classifies the query, embeds it, loads the session window, and passes
//! everything in a [`SearchRequest`].
//!
//! # Scoring pipeline
//!
//! 1. Filter-only metadata intents short-circuit through the temporal
//!    bypass: a filtered lookup ordered by creation time, scored by linear
//!    recency decay, with no vector or lexical work at all.
//! 2. Otherwise, candidates come from three sources: content-space vector
//!    search, metadata-space vector search, and lexical search (original
//!    terms plus expansion terms — expansion never touches the vector
//!    query).
//! 3. Per item: content similarity is the max across its fragments;
//!    metadata similarity is computed against its metadata embedding;
//!    `base = 0.7 × content + 0.3 × metadata`.
//! 4. The session booster multiplies the base score by up to 1.20 when the
//!    item aligns with the recent-view window.
//! 5. Lexical ranks are normalized against the top score in the candidate
//!    set, then discounted for short or untitled documents.
//! 6. `final = 0.6 × boosted_semantic + 0.4 × lexical`; items below the
//!    score floor are discarded; ties break by creation time, then id.
//!
//! A missing signal contributes 0.0 — items are only excluded at the
//! floor. Missing metadata embeddings on enriched items are logged as
//! consistency degradations, never propagated as errors.

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::embedding::cosine_similarity;
use crate::intent::QueryIntent;
use crate::score::{
    base_semantic, normalize_lexical, recency_score, session_multiplier, short_doc_multiplier,
    ScoreParams,
};
use crate::session::SessionWindow;
use crate::store::{ItemMetadata, Store, VectorSpace};

/// Bundles all inputs for a single search invocation.
#[derive(Debug)]
pub struct SearchRequest<'a> {
    /// Classified intent (or the fallback).
    pub intent: &'a QueryIntent,
    /// Pre-computed embedding of the semantic query. Required unless the
    /// intent routes through the temporal bypass.
    pub query_vec: Option<&'a [f32]>,
    /// Rolling window of recently viewed items.
    pub session: &'a SessionWindow,
    /// Query instant as Unix seconds; anchors recency scoring.
    pub now: i64,
    /// Maximum results to return.
    pub limit: i64,
    /// Candidates fetched per source before fusion.
    pub candidate_k: i64,
    /// Scoring policy.
    pub params: ScoreParams,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct RankedItem {
    pub id: String,
    pub title: Option<String>,
    /// Final fused score, or the recency score on the bypass path.
    pub score: f64,
    /// Best-matching text excerpt.
    pub snippet: String,
    /// Creation time (Unix seconds).
    pub created_at: i64,
}

/// Run a search against a [`Store`] backend.
///
/// Returns results sorted by score descending; scores on the fused path
/// never fall below `params.score_floor`. Bypass results carry recency
/// scores instead, which may reach 0.0 for items older than the window.
pub async fn search<S: Store>(store: &S, req: &SearchRequest<'_>) -> Result<Vec<RankedItem>> {
    if req.intent.wants_bypass() {
        return temporal_bypass(store, req).await;
    }

    let query_vec = match req.query_vec {
        Some(qv) => qv,
        None => bail!("query_vec is required outside the temporal bypass"),
    };

    let filter = req.intent.filters.to_item_filter();
    let terms = req.intent.lexical_terms();

    let content_hits = store
        .vector_search(VectorSpace::Content, query_vec, req.candidate_k, &filter)
        .await?;
    let metadata_hits = store
        .vector_search(VectorSpace::Metadata, query_vec, req.candidate_k, &filter)
        .await?;
    let lexical_hits = match store.lexical_search(&terms, req.candidate_k, &filter).await {
        Ok(hits) => hits,
        Err(e) => {
            // A broken lexical index degrades to vector-only ranking.
            warn!(error = %e, "lexical search failed, continuing without it");
            Vec::new()
        }
    };

    if content_hits.is_empty() && metadata_hits.is_empty() && lexical_hits.is_empty() {
        return Ok(Vec::new());
    }

    // Per-item aggregation: max across fragments, merged across sources.
    let mut content: HashMap<String, (f64, String)> = HashMap::new();
    for hit in &content_hits {
        let entry = content
            .entry(hit.item_id.clone())
            .or_insert((f64::NEG_INFINITY, String::new()));
        if hit.similarity > entry.0 {
            *entry = (hit.similarity, hit.snippet.clone());
        }
    }

    let mut lexical: HashMap<String, (f64, String)> = HashMap::new();
    for hit in &lexical_hits {
        let entry = lexical
            .entry(hit.item_id.clone())
            .or_insert((f64::NEG_INFINITY, String::new()));
        if hit.raw_rank > entry.0 {
            *entry = (hit.raw_rank, hit.snippet.clone());
        }
    }

    let top_lexical = lexical
        .values()
        .map(|(raw, _)| *raw)
        .fold(0.0f64, f64::max);

    let mut candidate_ids: Vec<String> = content.keys().cloned().collect();
    for id in metadata_hits.iter().map(|h| &h.item_id) {
        if !content.contains_key(id) && !candidate_ids.contains(id) {
            candidate_ids.push(id.clone());
        }
    }
    for id in lexical.keys() {
        if !content.contains_key(id) && !candidate_ids.contains(id) {
            candidate_ids.push(id.clone());
        }
    }

    let session_vec = req.session.vector(store).await?;

    let mut results: Vec<RankedItem> = Vec::new();

    for item_id in candidate_ids {
        let meta = match store.item_metadata(&item_id).await? {
            Some(m) => m,
            None => {
                // Candidate vanished between retrieval and assembly.
                warn!(item = %item_id, "candidate item disappeared mid-query, skipping");
                continue;
            }
        };

        let content_sim = content.get(&item_id).map(|(s, _)| *s).unwrap_or(0.0);

        let metadata_vec = store.metadata_vector(&item_id).await?;
        if metadata_vec.is_none() && meta.enriched {
            warn!(item = %item_id, "enriched item is missing its metadata embedding");
        }
        let metadata_sim = metadata_vec
            .as_ref()
            .map(|v| cosine_similarity(query_vec, v) as f64)
            .unwrap_or(0.0);

        let base = base_semantic(content_sim, metadata_sim, &req.params);

        let session_sim = match (&session_vec, &metadata_vec) {
            (Some(sv), Some(mv)) => cosine_similarity(sv, mv) as f64,
            _ => 0.0,
        };
        let boosted = base * session_multiplier(session_sim, &req.params);

        let (lexical_raw, lexical_snippet) = lexical
            .get(&item_id)
            .map(|(raw, snip)| (*raw, snip.clone()))
            .unwrap_or((0.0, String::new()));
        let lexical_norm = normalize_lexical(lexical_raw, top_lexical)
            * short_doc_multiplier(meta.total_text_len, meta.title.is_some(), &req.params);

        let final_score =
            req.params.semantic_weight * boosted + req.params.lexical_weight * lexical_norm;

        if final_score < req.params.score_floor {
            continue;
        }

        let snippet = content
            .get(&item_id)
            .map(|(_, snip)| snip.clone())
            .filter(|s| !s.is_empty())
            .or_else(|| Some(lexical_snippet).filter(|s| !s.is_empty()))
            .or_else(|| meta.summary.clone())
            .or_else(|| meta.title.clone())
            .unwrap_or_default();

        results.push(RankedItem {
            id: meta.id,
            title: meta.title,
            score: final_score,
            snippet,
            created_at: meta.created_at,
        });
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.created_at.cmp(&a.created_at))
            .then(a.id.cmp(&b.id))
    });
    results.truncate(req.limit as usize);

    debug!(results = results.len(), "ranking complete");
    Ok(results)
}

/// Shortcut path for filter-only queries: no vectors, no lexical index.
///
/// Results come straight from the filtered item listing, newest first,
/// scored by linear recency decay so downstream consumers see a uniform
/// score field.
async fn temporal_bypass<S: Store>(store: &S, req: &SearchRequest<'_>) -> Result<Vec<RankedItem>> {
    debug!("filter-only query, taking temporal bypass");
    let filter = req.intent.filters.to_item_filter();
    let items = store.recent_items(&filter, req.limit).await?;

    Ok(items
        .into_iter()
        .map(|meta| {
            let score = recency_score(meta.created_at, req.now, &req.params);
            let snippet = bypass_snippet(&meta);
            RankedItem {
                id: meta.id,
                title: meta.title,
                score,
                snippet,
                created_at: meta.created_at,
            }
        })
        .collect())
}

fn bypass_snippet(meta: &ItemMetadata) -> String {
    let tags = if meta.tags.is_empty() {
        "-".to_string()
    } else {
        meta.tags.join(", ")
    };
    let summary = meta.summary.as_deref().unwrap_or("-");
    format!("{} | {} | {}", meta.kind.as_str(), tags, summary)
}
