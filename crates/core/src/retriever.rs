use crate::embeddings::Embedder;
use crate::error::AskError;
use crate::models::RetrievalResult;
use crate::traits::VectorIndex;
use std::sync::Arc;
use tracing::debug;

/// Embeds a question and returns the `k` most similar indexed chunks.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, k: usize) -> Self {
        Self {
            embedder,
            index,
            k: k.max(1),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult, AskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::EmptyQuestion);
        }

        let query_vector = self
            .embedder
            .embed_query(question)
            .await
            .map_err(AskError::Embedding)?;
        let chunks = self.index.search(&query_vector, self.k).await?;

        debug!(k = self.k, hits = chunks.len(), "retrieved chunks");
        Ok(RetrievalResult { chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{Chunk, Metadata, SOURCE_KEY};
    use crate::stores::LocalVectorIndex;
    use tempfile::tempdir;

    async fn seeded(texts: &[(&str, &str)]) -> (tempfile::TempDir, Arc<LocalVectorIndex>) {
        let dir = tempdir().expect("tempdir");
        let embedder = CharacterNgramEmbedder::default();
        let index = LocalVectorIndex::open(dir.path(), embedder.model_name())
            .await
            .expect("open index");

        let chunks: Vec<Chunk> = texts
            .iter()
            .map(|(source, text)| {
                let mut metadata = Metadata::new();
                metadata.insert(SOURCE_KEY.to_string(), source.to_string());
                Chunk {
                    text: text.to_string(),
                    metadata,
                }
            })
            .collect();
        let inputs: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embedder.embed_documents(&inputs).await.expect("embed");
        index.upsert(&chunks, &vectors).await.expect("upsert");

        (dir, Arc::new(index))
    }

    #[tokio::test]
    async fn returns_at_most_k_in_descending_order() {
        let (_dir, index) = seeded(&[
            ("cpu.pdf", "A CPU executes instructions."),
            ("gpu.pdf", "A GPU renders graphics in parallel."),
            ("ram.pdf", "RAM holds working memory."),
        ])
        .await;
        let retriever = Retriever::new(Arc::new(CharacterNgramEmbedder::default()), index, 2);

        let result = retriever.retrieve("What does a CPU execute?").await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.chunks[0].source(), "cpu.pdf");
        assert!(result.chunks[0].score >= result.chunks[1].score);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let (_dir, index) = seeded(&[]).await;
        let retriever = Retriever::new(Arc::new(CharacterNgramEmbedder::default()), index, 4);
        assert!(matches!(
            retriever.retrieve("   ").await,
            Err(AskError::EmptyQuestion)
        ));
    }

    #[tokio::test]
    async fn empty_index_yields_empty_result() {
        let (_dir, index) = seeded(&[]).await;
        let retriever = Retriever::new(Arc::new(CharacterNgramEmbedder::default()), index, 4);
        assert!(retriever.retrieve("anything").await.unwrap().is_empty());
    }
}
