pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod loader;
pub mod models;
pub mod ollama;
pub mod orchestrator;
pub mod retriever;
pub mod stores;
pub mod synthesizer;
pub mod traits;

pub use chunking::{base_file_name, normalize_page_text, ChunkingConfig, TextSplitter};
pub use config::{LoggingConfig, PipelineConfig, RetryPolicy};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{AskError, ConfigError, IndexError, IngestError, IngestionError, ServiceError};
pub use extractor::{extract_page_texts, LopdfExtractor, PdfExtractor};
pub use loader::{discover_pdf_files, load_documents, LoadReport, SkippedPdf};
pub use models::{
    AnswerResult, Chunk, Document, IndexedRecord, Metadata, PageText, RetrievalResult,
    RetrievedChunk, PAGE_KEY, SOURCE_KEY,
};
pub use ollama::{OllamaClient, OllamaGenerator};
pub use orchestrator::{
    IngestionOrchestrator, IngestionOutcome, IngestionState, IngestionSummary, ReadinessGate,
};
pub use retriever::Retriever;
pub use stores::LocalVectorIndex;
pub use synthesizer::{render_prompt, AnswerSynthesizer};
pub use traits::{LanguageModel, UpsertSummary, VectorIndex};
