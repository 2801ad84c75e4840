//! Generative service client: intent classification, enrichment, merging.
//!
//! Talks to an Ollama-compatible `/api/generate` endpoint in JSON mode.
//! All three operations have strict response schemas; anything the model
//! returns that doesn't validate is a [`ServiceError::Schema`], and every
//! transport problem (refused connection, timeout, server error) is a
//! [`ServiceError::Transient`]. Neither ever escapes into ranking logic —
//! each caller has a documented fallback.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use vault_core::consolidate::{MergedNote, NoteMerger};
use vault_core::error::ServiceError;
use vault_core::intent::{IntentClassifier, QueryIntent};

use crate::config::LlmConfig;

/// Title, tags, and summary produced for an item.
#[derive(Debug, Clone, Deserialize)]
pub struct Enrichment {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// Client for the configured generative model.
pub struct GenerativeClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl GenerativeClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transient(format!("http client: {e}")))?;
        Ok(Self {
            config: config.clone(),
            http,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// One JSON-mode generation round-trip; returns the raw response text.
    async fn generate_json(&self, prompt: &str) -> Result<String, ServiceError> {
        let model = self
            .config
            .model
            .as_deref()
            .ok_or_else(|| ServiceError::Schema("llm.model not configured".into()))?;
        let url = self
            .config
            .url
            .as_deref()
            .unwrap_or("http://localhost:11434");

        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
        });

        let response = self
            .http
            .post(format!("{}/api/generate", url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transient(format!("generate request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::Transient(format!(
                "generate returned {status}: {text}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Schema(format!("generate body: {e}")))?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| strip_code_fences(s.trim()).to_string())
            .ok_or_else(|| ServiceError::Schema("generate response missing 'response'".into()))
    }

    /// Produce title, tags, and summary for an item's text.
    pub async fn enrich(&self, text: &str) -> Result<Enrichment, ServiceError> {
        let mut excerpt = text.to_string();
        if excerpt.len() > 12_000 {
            let mut cut = 12_000;
            while cut > 0 && !excerpt.is_char_boundary(cut) {
                cut -= 1;
            }
            excerpt.truncate(cut);
            excerpt.push_str("\n[... truncated ...]");
        }

        let prompt = format!(
            r#"Analyze the following document and return a JSON object with exactly these keys:
- "title": a concise, descriptive title (max 10 words)
- "tags": an array of 3-7 relevant tags (lowercase, single words or short phrases)
- "summary": a 2-3 sentence summary of the document content

Document:
"""
{excerpt}
"""

Return ONLY valid JSON, no markdown formatting, no extra text."#
        );

        let raw = self.generate_json(&prompt).await?;
        parse_enrichment(&raw)
    }
}

#[async_trait]
impl IntentClassifier for GenerativeClient {
    async fn classify(&self, query: &str) -> Result<QueryIntent, ServiceError> {
        let today = chrono::Utc::now().date_naive();
        let prompt = format!(
            r#"You are a query parser for a personal text vault.
Extract the core semantic search terms and any explicit metadata filters from the user query.

Intent rules:
- "metadata_filter": explicit request for file kinds (text/image), dates, or specific tags.
- "semantic_search": general conceptual search without metadata constraints.

Filter rules:
- created_after: date in YYYY-MM-DD (today is {today}); resolve words like "today" or "yesterday".
- file_type: ONLY "text" or "image".
- tags: array of strings when the user explicitly asks for tags or labels.

Semantic query rule:
- The actual searchable topic, with filter language stripped. If the query is
  "images of kittens", semantic_query is "kittens" and file_type is "image".

Lexical synonyms rule:
- 2-3 related terms or synonyms to widen text search recall. Do NOT repeat the
  semantic_query words.

Return EXACTLY this JSON schema:
{{
  "filters": {{
    "created_after": "YYYY-MM-DD" or null,
    "file_type": "text" or "image" or null,
    "tags": ["tag1"] or []
  }},
  "semantic_query": "string",
  "lexical_synonyms": ["synonym1", "synonym2"],
  "intent": "metadata_filter" or "semantic_search"
}}

User query: "{query}"

Return ONLY valid JSON."#
        );

        let raw = self.generate_json(&prompt).await?;
        QueryIntent::from_service_json(&raw, query)
    }
}

#[async_trait]
impl NoteMerger for GenerativeClient {
    async fn merge(&self, notes: &[String]) -> Result<MergedNote, ServiceError> {
        let combined = notes.join("\n---\n");
        let prompt = format!(
            r#"You consolidate short notes into a single coherent document.
Here are several short notes that are semantically related:

{combined}

Combine the information into one well-structured text, removing redundancy,
and produce a short descriptive title.

Return EXACTLY this JSON schema:
{{
  "title": "string",
  "body": "string"
}}

Return ONLY valid JSON."#
        );

        let raw = self.generate_json(&prompt).await?;
        parse_merged_note(&raw)
    }
}

/// Strip a fenced code block wrapper if the model added one anyway.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let inner = match trimmed.find('\n') {
        Some(i) => &trimmed[i + 1..],
        None => return trimmed,
    };
    inner.rsplit_once("```").map(|(body, _)| body.trim()).unwrap_or(inner.trim())
}

fn parse_enrichment(raw: &str) -> Result<Enrichment, ServiceError> {
    let enrichment: Enrichment = serde_json::from_str(raw)
        .map_err(|e| ServiceError::Schema(format!("enrichment JSON: {e}")))?;
    if enrichment.title.trim().is_empty() {
        return Err(ServiceError::Schema("enrichment title is empty".into()));
    }
    Ok(enrichment)
}

#[derive(Debug, Deserialize)]
struct WireMergedNote {
    title: String,
    body: String,
}

fn parse_merged_note(raw: &str) -> Result<MergedNote, ServiceError> {
    let wire: WireMergedNote =
        serde_json::from_str(raw).map_err(|e| ServiceError::Schema(format!("merge JSON: {e}")))?;
    if wire.title.trim().is_empty() || wire.body.trim().is_empty() {
        return Err(ServiceError::Schema("merged note missing title or body".into()));
    }
    Ok(MergedNote {
        title: wire.title,
        body: wire.body,
    })
}
