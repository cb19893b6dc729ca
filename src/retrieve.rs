//! Query-time retrieval over the knowledge store.
//!
//! Embeds the query with the store's embedder, ranks stored chunks by cosine
//! similarity, and joins the best matches into one context block (one chunk
//! per line).

use std::sync::Arc;

use thiserror::Error;

use crate::embedding::{embed_query, EmbeddingError};
use crate::models::SearchHit;
use crate::store::KnowledgeStore;

/// Default number of chunks pulled into the prompt.
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Retrieves context for a query from a shared [`KnowledgeStore`].
#[derive(Clone)]
pub struct Retriever {
    store: Arc<KnowledgeStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(store: Arc<KnowledgeStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    /// Context for `query` using the configured `top_k`.
    pub async fn retrieve(&self, query: &str) -> Result<String, RetrievalError> {
        self.retrieve_top(query, self.top_k).await
    }

    /// Up to `top_k` chunks joined with `\n`; empty when the store is empty.
    pub async fn retrieve_top(&self, query: &str, top_k: usize) -> Result<String, RetrievalError> {
        let hits = self.hits(query, top_k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| hit.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Scored matches for `query`. An empty store short-circuits without
    /// calling the embedder.
    pub async fn hits(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        if self.store.is_empty() {
            tracing::debug!("knowledge store is empty, skipping retrieval");
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.store.embedder().as_ref(), query).await?;
        let hits = self.store.search_scored(&query_vec, top_k);
        for hit in &hits {
            tracing::debug!(index = hit.index, score = hit.score, "retrieved chunk");
        }
        Ok(hits)
    }
}
