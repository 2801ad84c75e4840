//! TOML configuration parsing and validation.
//!
//! Every scoring constant the engine uses is a config field with the
//! documented default, so the ranking policy is tunable without a
//! rebuild. [`load_config`] validates ranges up front and fails fast on
//! nonsense values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use vault_core::consolidate::ConsolidationParams;
use vault_core::score::ScoreParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_fragment_chars")]
    pub max_fragment_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_fragment_chars: default_max_fragment_chars(),
        }
    }
}

fn default_max_fragment_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_content_weight")]
    pub content_weight: f64,
    #[serde(default = "default_metadata_weight")]
    pub metadata_weight: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_score_floor")]
    pub score_floor: f64,
    #[serde(default = "default_session_threshold")]
    pub session_threshold: f64,
    #[serde(default = "default_session_max_boost")]
    pub session_max_boost: f64,
    #[serde(default = "default_short_doc_len")]
    pub short_doc_len: i64,
    #[serde(default = "default_short_doc_penalty")]
    pub short_doc_penalty: f64,
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: i64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: i64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            content_weight: default_content_weight(),
            metadata_weight: default_metadata_weight(),
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
            score_floor: default_score_floor(),
            session_threshold: default_session_threshold(),
            session_max_boost: default_session_max_boost(),
            short_doc_len: default_short_doc_len(),
            short_doc_penalty: default_short_doc_penalty(),
            recency_window_days: default_recency_window_days(),
            candidate_k: default_candidate_k(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_content_weight() -> f64 {
    0.7
}
fn default_metadata_weight() -> f64 {
    0.3
}
fn default_semantic_weight() -> f64 {
    0.6
}
fn default_lexical_weight() -> f64 {
    0.4
}
fn default_score_floor() -> f64 {
    0.1
}
fn default_session_threshold() -> f64 {
    0.4
}
fn default_session_max_boost() -> f64 {
    1.2
}
fn default_short_doc_len() -> i64 {
    120
}
fn default_short_doc_penalty() -> f64 {
    0.65
}
fn default_recency_window_days() -> i64 {
    7
}
fn default_candidate_k() -> i64 {
    40
}
fn default_final_limit() -> i64 {
    10
}

impl RetrievalConfig {
    pub fn score_params(&self) -> ScoreParams {
        ScoreParams {
            content_weight: self.content_weight,
            metadata_weight: self.metadata_weight,
            semantic_weight: self.semantic_weight,
            lexical_weight: self.lexical_weight,
            score_floor: self.score_floor,
            session_threshold: self.session_threshold,
            session_max_boost: self.session_max_boost,
            short_doc_len: self.short_doc_len,
            short_doc_penalty: self.short_doc_penalty,
            recency_window_secs: self.recency_window_days * 24 * 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionsConfig {
    #[serde(default = "default_connection_threshold")]
    pub threshold: f64,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            threshold: default_connection_threshold(),
        }
    }
}

fn default_connection_threshold() -> f64 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsolidationConfig {
    #[serde(default = "default_max_note_len")]
    pub max_note_len: i64,
    #[serde(default = "default_cluster_threshold")]
    pub cluster_threshold: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            max_note_len: default_max_note_len(),
            cluster_threshold: default_cluster_threshold(),
        }
    }
}

fn default_max_note_len() -> i64 {
    300
}
fn default_cluster_threshold() -> f64 {
    0.70
}

impl ConsolidationConfig {
    pub fn params(&self) -> ConsolidationParams {
        ConsolidationParams {
            max_note_len: self.max_note_len,
            cluster_threshold: self.cluster_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_llm_enabled(),
            model: None,
            url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_enabled() -> bool {
    false
}
fn default_llm_timeout_secs() -> u64 {
    15
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let r = &config.retrieval;
    for (name, w) in [
        ("retrieval.content_weight", r.content_weight),
        ("retrieval.metadata_weight", r.metadata_weight),
        ("retrieval.semantic_weight", r.semantic_weight),
        ("retrieval.lexical_weight", r.lexical_weight),
        ("retrieval.score_floor", r.score_floor),
        ("retrieval.short_doc_penalty", r.short_doc_penalty),
    ] {
        if !(0.0..=1.0).contains(&w) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if !(0.0..=1.0).contains(&r.session_threshold) {
        anyhow::bail!("retrieval.session_threshold must be in [0.0, 1.0]");
    }
    if r.session_max_boost < 1.0 {
        anyhow::bail!("retrieval.session_max_boost must be >= 1.0");
    }
    if r.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if r.candidate_k < 1 {
        anyhow::bail!("retrieval.candidate_k must be >= 1");
    }
    if r.recency_window_days < 1 {
        anyhow::bail!("retrieval.recency_window_days must be >= 1");
    }

    if config.chunking.max_fragment_chars == 0 {
        anyhow::bail!("chunking.max_fragment_chars must be > 0");
    }

    if !(0.0..=1.0).contains(&config.connections.threshold) {
        anyhow::bail!("connections.threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.consolidation.cluster_threshold) {
        anyhow::bail!("consolidation.cluster_threshold must be in [0.0, 1.0]");
    }
    if config.consolidation.max_note_len < 1 {
        anyhow::bail!("consolidation.max_note_len must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    if config.llm.enabled && config.llm.model.is_none() {
        anyhow::bail!("llm.model must be specified when llm.enabled is true");
    }

    Ok(config)
}
