//! In-memory knowledge store.
//!
//! Holds chunk texts and their embedding vectors as two parallel sequences
//! behind a single `std::sync::RwLock`, so readers never observe the
//! sequences at different lengths. Appends take the write lock; searches take
//! the read lock. Vector search is brute-force cosine similarity over every
//! stored vector.
//!
//! The store lives for the lifetime of the process; there is no persistence
//! and no per-chunk deletion.

use std::cmp::Ordering;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::embedding::{cosine_similarity, Embedder, EmbeddingError};
use crate::models::SearchHit;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("embedding dimension mismatch: store holds {expected}-dimensional vectors, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Default)]
struct Entries {
    chunks: Vec<String>,
    embeddings: Vec<Vec<f32>>,
}

impl Entries {
    fn dims(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }
}

/// Process-lifetime chunk store with cosine similarity lookup.
pub struct KnowledgeStore {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Entries>,
}

impl KnowledgeStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// The embedder used for both chunks and queries.
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed `chunks` and append them with their vectors.
    ///
    /// Empty input is a no-op and makes no embedding call. Embedding runs
    /// before the write lock is taken; the append itself is all-or-nothing.
    pub async fn add(&self, chunks: &[String]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let vectors = self.embedder.embed(chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: chunks.len(),
                got: vectors.len(),
            }
            .into());
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let expected = entries.dims().unwrap_or(vectors[0].len());
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                got: bad.len(),
            });
        }

        entries.chunks.extend_from_slice(chunks);
        entries.embeddings.extend(vectors);
        tracing::debug!(added = chunks.len(), total = entries.chunks.len(), "knowledge store append");
        Ok(())
    }

    /// Up to `top_k` chunk texts ranked by descending cosine similarity to
    /// `query_embedding`. Equal scores keep insertion order.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<String> {
        self.search_scored(query_embedding, top_k)
            .into_iter()
            .map(|hit| hit.text)
            .collect()
    }

    /// Same ranking as [`search`](Self::search), with scores and indices.
    pub fn search_scored(&self, query_embedding: &[f32], top_k: usize) -> Vec<SearchHit> {
        if top_k == 0 {
            return Vec::new();
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, f32)> = entries
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query_embedding, v)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(index, score)| SearchHit {
                index,
                score,
                text: entries.chunks[index].clone(),
            })
            .collect()
    }

    /// Number of stored chunks.
    pub fn size(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chunks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Length of the chunk and embedding sequences, read under one lock.
    pub fn lengths(&self) -> (usize, usize) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        (entries.chunks.len(), entries.embeddings.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Deterministic bag-of-letters embedder: one dimension per ASCII letter.
    pub(crate) struct LetterEmbedder {
        pub calls: AtomicUsize,
    }

    impl LetterEmbedder {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    pub(crate) fn letters(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 26];
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        v
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(texts.iter().map(|t| letters(t)).collect())
        }
    }

    /// Embeds successfully `ok_calls` times, then reports the model as gone.
    pub(crate) struct FailAfter {
        ok_calls: AtomicUsize,
    }

    impl FailAfter {
        pub(crate) fn new(ok_calls: usize) -> Self {
            Self {
                ok_calls: AtomicUsize::new(ok_calls),
            }
        }
    }

    #[async_trait]
    impl Embedder for FailAfter {
        fn model_name(&self) -> &str {
            "fail-after"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let left = self.ok_calls.load(AtomicOrdering::SeqCst);
            if left == 0 {
                return Err(EmbeddingError::Unavailable("model unloaded".to_string()));
            }
            self.ok_calls.store(left - 1, AtomicOrdering::SeqCst);
            Ok(texts.iter().map(|t| letters(t)).collect())
        }
    }

    /// Returns vectors whose width can be changed between calls.
    struct WidthEmbedder(AtomicUsize);

    #[async_trait]
    impl Embedder for WidthEmbedder {
        fn model_name(&self) -> &str {
            "width"
        }
        fn dims(&self) -> usize {
            self.0.load(AtomicOrdering::SeqCst)
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let width = self.dims();
            Ok(texts.iter().map(|_| vec![1.0; width]).collect())
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_add_makes_no_embedding_call() {
        let embedder = Arc::new(LetterEmbedder::new());
        let store = KnowledgeStore::new(embedder.clone());
        store.add(&[]).await.unwrap();
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(store.size(), 0);
    }

    #[tokio::test]
    async fn test_lengths_stay_equal() {
        let store = KnowledgeStore::new(Arc::new(LetterEmbedder::new()));
        for batch in [vec!["aaa"], vec!["bbb", "ccc"], vec![], vec!["ddd", "eee", "fff"]] {
            store.add(&strings(&batch)).await.unwrap();
            let (chunks, embeddings) = store.lengths();
            assert_eq!(chunks, embeddings);
        }
        assert_eq!(store.size(), 6);
    }

    #[test]
    fn test_empty_store_search() {
        let store = KnowledgeStore::new(Arc::new(LetterEmbedder::new()));
        assert!(store.search(&letters("anything"), 3).is_empty());
    }

    #[tokio::test]
    async fn test_ranked_by_similarity() {
        let store = KnowledgeStore::new(Arc::new(LetterEmbedder::new()));
        store
            .add(&strings(&["zzzz", "abab", "aaaa", "xyxy"]))
            .await
            .unwrap();
        let results = store.search(&letters("aaa"), 2);
        assert_eq!(results, strings(&["aaaa", "abab"]));
    }

    #[tokio::test]
    async fn test_top_k_bounds() {
        let store = KnowledgeStore::new(Arc::new(LetterEmbedder::new()));
        store.add(&strings(&["ab", "cd"])).await.unwrap();
        assert_eq!(store.search(&letters("a"), 10).len(), 2);
        assert!(store.search(&letters("a"), 0).is_empty());
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = KnowledgeStore::new(Arc::new(LetterEmbedder::new()));
        store
            .add(&strings(&["cat", "act", "tac", "dog"]))
            .await
            .unwrap();
        let hits = store.search_scored(&letters("cat"), 3);
        let indices: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_search_is_deterministic() {
        let store = KnowledgeStore::new(Arc::new(LetterEmbedder::new()));
        store
            .add(&strings(&["same", "same", "mesa", "other", "seam"]))
            .await
            .unwrap();
        let q = letters("same");
        assert_eq!(store.search(&q, 4), store.search(&q, 4));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let embedder = Arc::new(WidthEmbedder(AtomicUsize::new(4)));
        let store = KnowledgeStore::new(embedder.clone());
        store.add(&strings(&["one"])).await.unwrap();

        embedder.0.store(8, AtomicOrdering::SeqCst);
        let err = store.add(&strings(&["two", "three"])).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 4,
                got: 8
            }
        ));
        assert_eq!(store.lengths(), (1, 1));
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_store_unchanged() {
        let store = KnowledgeStore::new(Arc::new(crate::embedding::DisabledEmbedder));
        let err = store.add(&strings(&["text"])).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Embedding(EmbeddingError::Unavailable(_))
        ));
        assert_eq!(store.lengths(), (0, 0));
    }

    #[tokio::test]
    async fn test_concurrent_add_and_search() {
        let store = Arc::new(KnowledgeStore::new(Arc::new(LetterEmbedder::new())));
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .add(&[format!("chunk {}", i), format!("more {}", i)])
                    .await
                    .unwrap();
                let (c, e) = store.lengths();
                assert_eq!(c, e);
                store.search(&letters("chunk"), 3)
            }));
        }
        for h in handles {
            assert!(!h.await.unwrap().is_empty());
        }
        assert_eq!(store.size(), 16);
    }
}
