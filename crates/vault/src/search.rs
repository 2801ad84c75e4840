//! The `search` command: classify, embed, rank, print.

use anyhow::{bail, Result};
use tracing::{debug, warn};

use vault_core::intent::{classify_or_fallback, QueryIntent};
use vault_core::search::{search, SearchRequest};
use vault_core::session::SessionWindow;

use crate::config::Config;
use crate::db;
use crate::embedding::EmbeddingClient;
use crate::llm::GenerativeClient;
use crate::sqlite_store::SqliteStore;

pub async fn run_search(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    // Intent classification degrades to a verbatim semantic search; a
    // disabled classifier is just the fallback without the round-trip.
    let intent = if config.llm.enabled {
        match GenerativeClient::new(&config.llm) {
            Ok(llm) => classify_or_fallback(&llm, query).await,
            Err(e) => {
                warn!(error = %e, "classifier unavailable, using fallback intent");
                QueryIntent::fallback(query)
            }
        }
    } else {
        QueryIntent::fallback(query)
    };
    debug!(?intent, "query classified");

    let query_vec = if intent.wants_bypass() {
        None
    } else {
        let embedder = EmbeddingClient::new(&config.embedding)?;
        if !embedder.is_enabled() {
            bail!("Search requires an embedding provider. Set [embedding] in config.");
        }
        Some(embedder.embed_query(&intent.semantic_query).await?)
    };

    let session = SessionWindow::load(&store).await?;

    let request = SearchRequest {
        intent: &intent,
        query_vec: query_vec.as_deref(),
        session: &session,
        now: chrono::Utc::now().timestamp(),
        limit: limit.unwrap_or(config.retrieval.final_limit),
        candidate_k: config.retrieval.candidate_k,
        params: config.retrieval.score_params(),
    };

    let results = search(&store, &request).await?;

    if results.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        let title = r.title.as_deref().unwrap_or("(untitled)");
        let snippet: String = r.snippet.chars().take(120).collect();
        println!("{:>2}. [{:.3}] {}  {}", i + 1, r.score, title, r.id);
        if !snippet.is_empty() {
            println!("      {}", snippet.replace('\n', " "));
        }
    }

    pool.close().await;
    Ok(())
}
