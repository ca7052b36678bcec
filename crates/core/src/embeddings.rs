use crate::error::ServiceError;
use crate::ollama::OllamaClient;
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ServiceError>;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// Embeds through a model served by Ollama. Document batches are split
/// into requests of at most `batch_size` inputs.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    model: String,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(client: Arc<OllamaClient>, model: impl Into<String>, batch_size: usize) -> Self {
        Self {
            client,
            model: model.into(),
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let mut vectors = self.client.embed(&self.model, &[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ServiceError::Decode("model returned no embedding".to_string()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.client.embed(&self.model, batch).await?);
        }

        if let Some(first) = vectors.first() {
            let dimensions = first.len();
            if let Some(odd) = vectors.iter().find(|vector| vector.len() != dimensions) {
                return Err(ServiceError::Decode(format!(
                    "model {} returned mixed dimensions {} and {}",
                    self.model,
                    dimensions,
                    odd.len()
                )));
            }
        }

        Ok(vectors)
    }
}

/// Deterministic trigram-hashing embedder. Needs no model service, which
/// makes it suitable for tests and offline smoke runs.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

fn trigram_hash(trigram: &[char]) -> u64 {
    trigram
        .iter()
        .collect::<String>()
        .bytes()
        .fold(FNV_OFFSET, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        })
}

impl CharacterNgramEmbedder {
    /// Counts lowercase character trigrams into hashed buckets and scales
    /// the result to unit length. Texts shorter than three characters map
    /// to the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let buckets = self.dimensions.max(1);
        let chars: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();

        let counts = chars.windows(3).fold(vec![0f32; buckets], |mut counts, trigram| {
            counts[(trigram_hash(trigram) % buckets as u64) as usize] += 1.0;
            counts
        });

        let norm = counts.iter().map(|count| count * count).sum::<f32>().sqrt();
        if norm == 0.0 {
            return counts;
        }
        counts.into_iter().map(|count| count / norm).collect()
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "character-trigram"
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        Ok(self.embed(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}
