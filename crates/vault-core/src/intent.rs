//! Query-intent classification types and the deterministic fallback.
//!
//! A raw query string is turned into a [`QueryIntent`]: an intent class,
//! structured filters, a cleaned semantic query, and a few lexical
//! expansion terms. The classification itself is performed by an external
//! generative service behind the [`IntentClassifier`] trait; this module
//! owns the response schema, its validation, and the fallback used when
//! the service fails. Callers go through [`classify_or_fallback`], which
//! never returns an error — a broken classifier degrades to a plain
//! semantic search over the verbatim query.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::error::ServiceError;
use crate::models::ContentKind;
use crate::store::ItemFilter;

/// Upper bound on lexical expansion terms kept from the classifier.
pub const MAX_EXPANSION_TERMS: usize = 3;

/// Semantic queries shorter than this route filter-only intents through
/// the temporal bypass.
const MIN_SEMANTIC_LEN: usize = 3;

/// Classification of what the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentClass {
    /// General conceptual search.
    SemanticSearch,
    /// Explicit request for kinds, dates, or tags.
    MetadataFilter,
}

/// Structured filter predicates extracted from the query.
#[derive(Debug, Clone, Default)]
pub struct IntentFilters {
    pub kind: Option<ContentKind>,
    pub created_after: Option<NaiveDate>,
    pub tags: Vec<String>,
}

impl IntentFilters {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.created_after.is_none() && self.tags.is_empty()
    }

    /// Lower the parsed filters into the store's candidate filter.
    pub fn to_item_filter(&self) -> ItemFilter {
        ItemFilter {
            kind: self.kind,
            created_after: self
                .created_after
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp()),
            tags: self.tags.clone(),
        }
    }
}

/// Structured interpretation of a raw query. Transient — never persisted.
#[derive(Debug, Clone)]
pub struct QueryIntent {
    pub class: IntentClass,
    pub filters: IntentFilters,
    /// The query with filter language stripped; what gets embedded.
    pub semantic_query: String,
    /// Synonyms widening lexical recall. Never fed to the vector query.
    pub expansion_terms: Vec<String>,
}

impl QueryIntent {
    /// The deterministic fallback: a plain semantic search over the
    /// verbatim query, no filters, no expansion.
    pub fn fallback(query: &str) -> Self {
        QueryIntent {
            class: IntentClass::SemanticSearch,
            filters: IntentFilters::default(),
            semantic_query: query.to_string(),
            expansion_terms: Vec::new(),
        }
    }

    /// Whether this intent short-circuits scoring entirely: a metadata
    /// filter with no real semantic content to rank by.
    pub fn wants_bypass(&self) -> bool {
        self.class == IntentClass::MetadataFilter
            && !self.filters.is_empty()
            && self.semantic_query.trim().chars().count() < MIN_SEMANTIC_LEN
    }

    /// Terms for the lexical index: the semantic query's words plus the
    /// expansion terms.
    pub fn lexical_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = self
            .semantic_query
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        for t in &self.expansion_terms {
            if !terms.iter().any(|x| x.eq_ignore_ascii_case(t)) {
                terms.push(t.clone());
            }
        }
        terms
    }

    /// Validate and normalize a classifier response.
    ///
    /// `original_query` is kept as a safeguard: if the service strips the
    /// semantic query below two characters, the original wins.
    pub fn from_service_json(raw: &str, original_query: &str) -> Result<Self, ServiceError> {
        let wire: WireIntent = serde_json::from_str(raw)
            .map_err(|e| ServiceError::Schema(format!("intent JSON: {e}")))?;

        let class = match wire.intent.as_str() {
            "semantic_search" => IntentClass::SemanticSearch,
            "metadata_filter" => IntentClass::MetadataFilter,
            other => {
                return Err(ServiceError::Schema(format!("unknown intent class: {other}")));
            }
        };

        let kind = match wire.filters.file_type.as_deref() {
            None | Some("") => None,
            Some(s) => Some(ContentKind::parse(s).ok_or_else(|| {
                ServiceError::Schema(format!("unknown content kind: {s}"))
            })?),
        };

        let created_after = match wire.filters.created_after.as_deref() {
            None | Some("") => None,
            Some(s) => Some(NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                ServiceError::Schema(format!("bad created_after date {s:?}: {e}"))
            })?),
        };

        let filters = IntentFilters {
            kind,
            created_after,
            tags: wire.filters.tags,
        };

        // The bypass decision is made on the stripped query as returned by
        // the service; the safeguard below must not defeat it.
        let mut semantic_query = wire.semantic_query.trim().to_string();
        let stripped_len = semantic_query.chars().count();
        let filter_only = class == IntentClass::MetadataFilter
            && !filters.is_empty()
            && stripped_len < MIN_SEMANTIC_LEN;
        if !filter_only && stripped_len < 2 {
            semantic_query = original_query.to_string();
        }

        let mut expansion_terms: Vec<String> = wire
            .lexical_synonyms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        expansion_terms.truncate(MAX_EXPANSION_TERMS);

        Ok(QueryIntent {
            class,
            filters,
            semantic_query,
            expansion_terms,
        })
    }
}

/// Wire schema the classification service must produce.
#[derive(Debug, Deserialize)]
struct WireIntent {
    #[serde(default)]
    filters: WireFilters,
    semantic_query: String,
    #[serde(default)]
    lexical_synonyms: Vec<String>,
    intent: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireFilters {
    #[serde(default)]
    created_after: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Trait for intent classification backends.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify a raw query. Implementations enforce their own timeout
    /// and report failures as [`ServiceError`]s.
    async fn classify(&self, query: &str) -> Result<QueryIntent, ServiceError>;
}

/// Classify a query, degrading to [`QueryIntent::fallback`] on any failure.
///
/// This is the only entry point the search path uses: no classifier error
/// ever propagates into ranking.
pub async fn classify_or_fallback(classifier: &dyn IntentClassifier, query: &str) -> QueryIntent {
    match classifier.classify(query).await {
        Ok(intent) => intent,
        Err(e) => {
            warn!(error = %e, "intent classification failed, using fallback");
            QueryIntent::fallback(query)
        }
    }
}
