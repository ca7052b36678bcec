use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const SOURCE_KEY: &str = "source";
pub const PAGE_KEY: &str = "page";

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// One source PDF after extraction. Pages are kept in document order.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub pages: Vec<PageText>,
}

impl Document {
    /// Yields one `(text, metadata)` pair per page, carrying the full source
    /// path and the page number.
    pub fn page_inputs(&self) -> Vec<(String, Metadata)> {
        let source = self.path.to_string_lossy().to_string();
        self.pages
            .iter()
            .map(|page| {
                let mut metadata = Metadata::new();
                metadata.insert(SOURCE_KEY.to_string(), source.clone());
                metadata.insert(PAGE_KEY.to_string(), page.number.to_string());
                (page.text.clone(), metadata)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

impl RetrievedChunk {
    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Retrieved chunks ordered by non-increasing similarity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Source names in retrieval order, duplicates kept.
    pub fn sources(&self) -> Vec<String> {
        self.chunks
            .iter()
            .map(|chunk| chunk.source().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<String>,
}
