//! Scoring policy: weights, thresholds, and the pure functions that apply
//! them.
//!
//! Everything here is a deterministic function of its inputs, so the
//! ranking produced by [`crate::search`] is reproducible for a given
//! candidate set and session window. All constants are carried in
//! [`ScoreParams`] rather than hard-coded at call sites, so the
//! application config can tune them.

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct ScoreParams {
    /// Weight of fragment-vector similarity inside the semantic blend.
    pub content_weight: f64,
    /// Weight of metadata-vector similarity inside the semantic blend.
    pub metadata_weight: f64,
    /// Weight of the (boosted) semantic score in the final fusion.
    pub semantic_weight: f64,
    /// Weight of the normalized lexical score in the final fusion.
    pub lexical_weight: f64,
    /// Results with a final score below this are discarded.
    pub score_floor: f64,
    /// Session similarity at or below this gets no boost.
    pub session_threshold: f64,
    /// Multiplier applied at session similarity 1.0.
    pub session_max_boost: f64,
    /// Items with less total text than this are "short documents".
    pub short_doc_len: i64,
    /// Multiplicative discount on the normalized lexical score of short
    /// or untitled documents.
    pub short_doc_penalty: f64,
    /// Recency scores decay linearly to zero over this many seconds.
    pub recency_window_secs: i64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            content_weight: 0.7,
            metadata_weight: 0.3,
            semantic_weight: 0.6,
            lexical_weight: 0.4,
            score_floor: 0.1,
            session_threshold: 0.4,
            session_max_boost: 1.2,
            short_doc_len: 120,
            short_doc_penalty: 0.65,
            recency_window_secs: 7 * 24 * 3600,
        }
    }
}

/// Blend content and metadata similarity into one semantic score.
///
/// A missing signal is passed in as `0.0`; full-text similarity carries
/// more evidence than a compressed summary, but titles and tags catch
/// vocabulary the body never uses.
pub fn base_semantic(content_sim: f64, metadata_sim: f64, p: &ScoreParams) -> f64 {
    p.content_weight * content_sim + p.metadata_weight * metadata_sim
}

/// Multiplier applied to the semantic score for session-context alignment.
///
/// Scales linearly from 1.0 at the threshold up to `session_max_boost`
/// at similarity 1.0. At or below the threshold the multiplier is exactly
/// 1.0.
pub fn session_multiplier(session_sim: f64, p: &ScoreParams) -> f64 {
    if session_sim <= p.session_threshold {
        return 1.0;
    }
    let span = 1.0 - p.session_threshold;
    let frac = ((session_sim - p.session_threshold) / span).min(1.0);
    1.0 + frac * (p.session_max_boost - 1.0)
}

/// Recency score for temporal-bypass results.
///
/// 1.0 for an item created at the query instant, decaying linearly to
/// 0.0 over the recency window, floored at 0.0 beyond it.
pub fn recency_score(created_at: i64, now: i64, p: &ScoreParams) -> f64 {
    let age = now - created_at;
    if age <= 0 {
        return 1.0;
    }
    if age >= p.recency_window_secs {
        return 0.0;
    }
    1.0 - age as f64 / p.recency_window_secs as f64
}

/// Lexical discount for short or untitled documents.
///
/// BM25-style ranks inflate for documents with very little text, so
/// anything under `short_doc_len` total characters, or with no title,
/// has its lexical contribution multiplied by `short_doc_penalty`.
pub fn short_doc_multiplier(total_text_len: i64, has_title: bool, p: &ScoreParams) -> f64 {
    if total_text_len < p.short_doc_len || !has_title {
        p.short_doc_penalty
    } else {
        1.0
    }
}

/// Normalize raw lexical ranks to `[0, 1]` against the top score.
///
/// Raw ranks are expected to be non-negative (stores negate SQLite's
/// BM25 rank before returning it). If the candidate set has no positive
/// score, everything normalizes to 0.0.
pub fn normalize_lexical(raw: f64, top: f64) -> f64 {
    if top <= 0.0 {
        return 0.0;
    }
    (raw / top).clamp(0.0, 1.0)
}
