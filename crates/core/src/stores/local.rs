//! File-backed vector index with brute-force cosine search.
//!
//! Records live in memory behind a `tokio::sync::RwLock` and are written to
//! `<dir>/index.json` after every upsert (temp file, then rename). Record
//! ids hash the chunk's source, page and text, so upserting the same chunk
//! again replaces it instead of appending a duplicate.

use crate::error::IndexError;
use crate::models::{Chunk, IndexedRecord, RetrievedChunk, PAGE_KEY, SOURCE_KEY};
use crate::traits::{UpsertSummary, VectorIndex};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "index.json";
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    embedding_model: String,
    dimensions: Option<usize>,
    records: Vec<IndexedRecord>,
}

#[derive(Debug, Clone, Default)]
struct IndexState {
    dimensions: Option<usize>,
    records: Vec<IndexedRecord>,
    positions: HashMap<String, usize>,
}

impl IndexState {
    fn from_records(dimensions: Option<usize>, records: Vec<IndexedRecord>) -> Self {
        let positions = records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.id.clone(), position))
            .collect();
        Self {
            dimensions,
            records,
            positions,
        }
    }
}

#[derive(Debug)]
pub struct LocalVectorIndex {
    dir: PathBuf,
    embedding_model: String,
    state: RwLock<IndexState>,
}

impl LocalVectorIndex {
    /// Opens (or creates) the index stored under `dir`.
    ///
    /// An index written by a different embedding model is discarded with a
    /// warning, since its vectors are not comparable with new queries.
    pub async fn open(
        dir: impl Into<PathBuf>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, IndexError> {
        let dir = dir.into();
        let embedding_model = embedding_model.into();
        tokio::fs::create_dir_all(&dir).await?;

        let file = dir.join(INDEX_FILE);
        let state = if tokio::fs::try_exists(&file).await? {
            let text = tokio::fs::read_to_string(&file).await?;
            let persisted: PersistedIndex = serde_json::from_str(&text)?;
            load_state(persisted, &embedding_model, &file)?
        } else {
            IndexState::default()
        };

        info!(
            path = %dir.display(),
            records = state.records.len(),
            model = %embedding_model,
            "opened vector index"
        );

        Ok(Self {
            dir,
            embedding_model,
            state: RwLock::new(state),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub async fn dimensions(&self) -> Option<usize> {
        self.state.read().await.dimensions
    }

    async fn persist(&self, state: &IndexState) -> Result<(), IndexError> {
        let snapshot = PersistedIndex {
            version: SCHEMA_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimensions: state.dimensions,
            records: state.records.clone(),
        };
        let data = serde_json::to_vec(&snapshot)?;

        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, self.file_path()).await?;
        debug!(records = state.records.len(), "persisted vector index");
        Ok(())
    }
}

fn load_state(
    persisted: PersistedIndex,
    embedding_model: &str,
    file: &Path,
) -> Result<IndexState, IndexError> {
    if persisted.version > SCHEMA_VERSION {
        return Err(IndexError::Corrupt(format!(
            "{} has schema version {}, newer than supported {}",
            file.display(),
            persisted.version,
            SCHEMA_VERSION
        )));
    }

    if persisted.embedding_model != embedding_model {
        warn!(
            previous = %persisted.embedding_model,
            current = %embedding_model,
            discarded = persisted.records.len(),
            "embedding model changed; discarding stale index records"
        );
        return Ok(IndexState::default());
    }

    if let Some(expected) = persisted.dimensions {
        if let Some(record) = persisted
            .records
            .iter()
            .find(|record| record.embedding.len() != expected)
        {
            return Err(IndexError::Corrupt(format!(
                "record {} has dimension {} but index declares {}",
                record.id,
                record.embedding.len(),
                expected
            )));
        }
    }

    Ok(IndexState::from_records(
        persisted.dimensions,
        persisted.records,
    ))
}

/// Stable identity for a chunk: SHA-256 over its source, page and text.
pub fn content_id(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    for key in [SOURCE_KEY, PAGE_KEY] {
        if let Some(value) = chunk.metadata.get(key) {
            hasher.update(value.as_bytes());
        }
        hasher.update([0u8]);
    }
    hasher.update(chunk.text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cosine similarity; 0.0 when either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn upsert(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<UpsertSummary, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        if chunks.is_empty() {
            return Ok(UpsertSummary::default());
        }

        let mut state = self.state.write().await;
        let mut next = state.clone();
        let expected = next.dimensions.unwrap_or(embeddings[0].len());
        if let Some(vector) = embeddings.iter().find(|vector| vector.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        next.dimensions = Some(expected);

        let now = Utc::now();
        let mut summary = UpsertSummary::default();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let record = IndexedRecord {
                id: content_id(chunk),
                text: chunk.text.clone(),
                embedding: embedding.clone(),
                metadata: chunk.metadata.clone(),
                indexed_at: now,
            };

            match next.positions.get(&record.id).copied() {
                Some(position) => {
                    next.records[position] = record;
                    summary.replaced += 1;
                }
                None => {
                    let position = next.records.len();
                    next.positions.insert(record.id.clone(), position);
                    next.records.push(record);
                    summary.inserted += 1;
                }
            }
        }

        // Readers keep seeing the old state unless the new one is on disk.
        self.persist(&next).await?;
        *state = next;
        Ok(summary)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let state = self.state.read().await;
        if k == 0 || state.records.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(expected) = state.dimensions {
            if query_vector.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: query_vector.len(),
                });
            }
        }

        let mut scored: Vec<(f32, &IndexedRecord)> = state
            .records
            .iter()
            .map(|record| (cosine_similarity(&record.embedding, query_vector), record))
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| RetrievedChunk {
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use tempfile::tempdir;

    fn chunk(source: &str, text: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.to_string());
        metadata.insert(PAGE_KEY.to_string(), "1".to_string());
        Chunk {
            text: text.to_string(),
            metadata,
        }
    }

    fn corpus() -> (Vec<Chunk>, Vec<Vec<f32>>) {
        (
            vec![
                chunk("cpu.pdf", "cpu"),
                chunk("gpu.pdf", "gpu"),
                chunk("ram.pdf", "ram"),
            ],
            vec![vec![1.0, 0.0], vec![0.6, 0.8], vec![0.0, 1.0]],
        )
    }

    #[tokio::test]
    async fn failed_persist_leaves_index_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let db = dir.path().join("db");
        let index = LocalVectorIndex::open(&db, "test-model").await?;
        std::fs::remove_dir_all(&db)?;
        std::fs::write(&db, b"not a directory")?;

        let (chunks, embeddings) = corpus();
        let error = index.upsert(&chunks, &embeddings).await.unwrap_err();
        assert!(matches!(error, IndexError::Io(_)));
        assert_eq!(index.len().await, 0);
        assert_eq!(index.dimensions().await, None);
        assert!(index.search(&[1.0, 0.0], 3).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn search_orders_by_descending_similarity() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = LocalVectorIndex::open(dir.path(), "test-model").await?;
        let (chunks, embeddings) = corpus();
        index.upsert(&chunks, &embeddings).await?;

        let hits = index.search(&[1.0, 0.1], 2).await?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "cpu");
        assert_eq!(hits[1].text, "gpu");
        assert!(hits[0].score >= hits[1].score);

        let all = index.search(&[0.0, 1.0], 10).await?;
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|pair| pair[0].score >= pair[1].score));
        Ok(())
    }

    #[tokio::test]
    async fn reupserting_does_not_duplicate() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = LocalVectorIndex::open(dir.path(), "test-model").await?;
        let (chunks, embeddings) = corpus();

        let first = index.upsert(&chunks, &embeddings).await?;
        let second = index.upsert(&chunks, &embeddings).await?;

        assert_eq!(first.inserted, 3);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.replaced, 3);
        assert_eq!(index.len().await, 3);
        Ok(())
    }

    #[tokio::test]
    async fn records_survive_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("db");
        {
            let index = LocalVectorIndex::open(&path, "test-model").await?;
            let (chunks, embeddings) = corpus();
            index.upsert(&chunks, &embeddings).await?;
        }

        let reopened = LocalVectorIndex::open(&path, "test-model").await?;
        assert_eq!(reopened.len().await, 3);
        assert_eq!(reopened.dimensions().await, Some(2));
        let hits = reopened.search(&[0.0, 1.0], 1).await?;
        assert_eq!(hits[0].source(), "ram.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn changing_the_embedding_model_discards_records() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let index = LocalVectorIndex::open(dir.path(), "model-a").await?;
            let (chunks, embeddings) = corpus();
            index.upsert(&chunks, &embeddings).await?;
        }

        let reopened = LocalVectorIndex::open(dir.path(), "model-b").await?;
        assert!(reopened.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = LocalVectorIndex::open(dir.path(), "test-model").await?;
        let (chunks, embeddings) = corpus();
        index.upsert(&chunks, &embeddings).await?;

        let error = index
            .upsert(&[chunk("x.pdf", "x")], &[vec![1.0, 2.0, 3.0]])
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::DimensionMismatch { expected: 2, actual: 3 }));

        let error = index.search(&[1.0], 1).await.unwrap_err();
        assert!(matches!(error, IndexError::DimensionMismatch { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn empty_index_returns_no_hits() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = LocalVectorIndex::open(dir.path(), "test-model").await?;
        assert!(index.search(&[1.0, 0.0], 4).await?.is_empty());
        Ok(())
    }

    #[test]
    fn content_id_depends_on_source_and_text() {
        assert_eq!(content_id(&chunk("a.pdf", "t")), content_id(&chunk("a.pdf", "t")));
        assert_ne!(content_id(&chunk("a.pdf", "t")), content_id(&chunk("b.pdf", "t")));
        assert_ne!(content_id(&chunk("a.pdf", "t")), content_id(&chunk("a.pdf", "u")));
    }
}
