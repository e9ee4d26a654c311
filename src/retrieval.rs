use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::types::RetrievedPassage;
use async_trait::async_trait;
use std::collections::HashMap;

/// Turns a query string into an embedding vector. The embedding model
/// runtime is out of scope for this crate — this trait is the seam.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OrchestratorError>;
}

/// A single vector-store hit before it is mapped to a `RetrievedPassage`.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub content: String,
    pub score: f64,
    pub source: String,
    pub category: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Similarity search over a vector store. The store's transport/backend is
/// out of scope for this crate — this trait is the seam.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>, OrchestratorError>;
}

/// Embeds a query, searches the vector store, and filters/maps hits into
/// `RetrievedPassage`s (§4.5).
pub struct RetrievalPipeline {
    embedder: Box<dyn Embedder>,
    store: Box<dyn VectorStore>,
}

impl RetrievalPipeline {
    pub fn new(embedder: Box<dyn Embedder>, store: Box<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        config: &OrchestratorConfig,
    ) -> Result<Vec<RetrievedPassage>, OrchestratorError> {
        let embedding = self.embedder.embed(query).await?;
        let hits = self.store.search(&embedding, config.retrieval_top_k).await?;

        let passages = hits
            .into_iter()
            .filter(|hit| hit.score >= config.retrieval_min_score)
            .map(|hit| RetrievedPassage {
                content: hit.content,
                score: hit.score,
                source: hit.source,
                category: hit.category,
                metadata: hit.metadata,
            })
            .collect::<Vec<_>>();

        tracing::info!(count = passages.len(), "retrieval complete");
        Ok(passages)
    }
}

/// Deterministic embedder for tests: the "embedding" is just the byte
/// length repeated, so two equal-length strings collide and that's fine —
/// it exists to exercise the pipeline, not to produce meaningful vectors.
pub struct MockEmbedder;

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OrchestratorError> {
        Ok(vec![text.len() as f32])
    }
}

/// An in-memory vector store for tests — returns a fixed set of hits
/// regardless of the query embedding, each with a score set up front.
#[derive(Default)]
pub struct MockVectorStore {
    pub hits: Vec<VectorHit>,
}

impl MockVectorStore {
    pub fn new(hits: Vec<VectorHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn search(&self, _embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>, OrchestratorError> {
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}
