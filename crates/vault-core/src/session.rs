//! Session context: the rolling window of recently viewed items.
//!
//! The window is an explicitly passed value, not process-global state, so
//! ranking stays a pure function of (query, candidates, window). The
//! session vector — the mean of the windowed items' metadata embeddings —
//! is recomputed per query rather than cached, since the window changes
//! with every recorded view.

use anyhow::Result;
use tracing::debug;

use crate::embedding::mean_vector;
use crate::models::SessionEntry;
use crate::store::Store;

/// How many recent views are semantically relevant.
pub const SESSION_WINDOW: usize = 5;

/// The last-N window of session view entries, newest first.
#[derive(Debug, Clone, Default)]
pub struct SessionWindow {
    entries: Vec<SessionEntry>,
}

impl SessionWindow {
    /// Build a window from entries ordered newest first, truncated to
    /// [`SESSION_WINDOW`].
    pub fn new(mut entries: Vec<SessionEntry>) -> Self {
        entries.truncate(SESSION_WINDOW);
        SessionWindow { entries }
    }

    /// The current window as read from a store.
    pub async fn load<S: Store>(store: &S) -> Result<Self> {
        Ok(SessionWindow::new(
            store.recent_views(SESSION_WINDOW as i64).await?,
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    /// Mean of the windowed items' metadata embeddings.
    ///
    /// Entries whose item has no metadata embedding (not yet enriched, or
    /// deleted since viewing) are skipped. Returns `None` when nothing in
    /// the window contributes a vector, in which case the booster is a
    /// no-op.
    pub async fn vector<S: Store>(&self, store: &S) -> Result<Option<Vec<f32>>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let mut vectors = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            match store.metadata_vector(&entry.item_id).await? {
                Some(v) => vectors.push(v),
                None => {
                    debug!(item = %entry.item_id, "viewed item has no metadata vector, skipping");
                }
            }
        }
        Ok(mean_vector(&vectors))
    }
}
