use crate::error::{IndexError, ServiceError};
use crate::models::{Chunk, RetrievedChunk};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub replaced: usize,
}

/// Nearest-neighbour storage for embedded chunks.
///
/// Implementations assume a single writer. Searches may run concurrently
/// with each other but not with an `upsert` from another process.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<UpsertSummary, IndexError>;

    /// Returns at most `k` records ordered by non-increasing similarity.
    async fn search(&self, query_vector: &[f32], k: usize)
        -> Result<Vec<RetrievedChunk>, IndexError>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}
