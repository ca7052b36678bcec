//! One-shot ingestion: load PDFs, chunk, embed, upsert.
//!
//! The orchestrator publishes its lifecycle on a `watch` channel:
//!
//! ```text
//! NotStarted -> Running -> Completed { .. }
//!                       \-> Failed { reason }
//! ```
//!
//! Only the first `run` per orchestrator does any work. Query paths hold a
//! [`ReadinessGate`] and refuse to answer until the state is `Completed`.

use crate::chunking::{ChunkingConfig, TextSplitter};
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::IngestionError;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::loader::{load_documents, SkippedPdf};
use crate::models::{Chunk, PAGE_KEY};
use crate::traits::VectorIndex;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CHUNKS_FILE: &str = "chunks.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionState {
    NotStarted,
    Running,
    Completed {
        records: usize,
        documents: usize,
        skipped: usize,
    },
    Failed {
        reason: String,
    },
}

impl IngestionState {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            IngestionState::Completed { .. } | IngestionState::Failed { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            IngestionState::NotStarted => "not_started",
            IngestionState::Running => "running",
            IngestionState::Completed { .. } => "completed",
            IngestionState::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionSummary {
    pub run_id: Uuid,
    pub documents: usize,
    pub skipped_files: Vec<SkippedPdf>,
    pub chunks: usize,
    pub inserted: usize,
    pub replaced: usize,
    /// Total records in the index once the run finished.
    pub records: usize,
    pub chunks_file: Option<PathBuf>,
}

impl IngestionSummary {
    fn empty(run_id: Uuid, records: usize) -> Self {
        Self {
            run_id,
            documents: 0,
            skipped_files: Vec::new(),
            chunks: 0,
            inserted: 0,
            replaced: 0,
            records,
            chunks_file: None,
        }
    }

    fn completed_state(&self) -> IngestionState {
        IngestionState::Completed {
            records: self.records,
            documents: self.documents,
            skipped: self.skipped_files.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum IngestionOutcome {
    Ingested(IngestionSummary),
    /// A previous call already claimed this orchestrator; carries the state
    /// observed at the time of the call.
    AlreadyRun(IngestionState),
}

/// Read-only view of the ingestion state for query paths.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    receiver: watch::Receiver<IngestionState>,
}

impl ReadinessGate {
    /// A gate pinned to `state`, for callers that never ingest.
    pub fn fixed(state: IngestionState) -> Self {
        let (_sender, receiver) = watch::channel(state);
        Self { receiver }
    }

    pub fn state(&self) -> IngestionState {
        self.receiver.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.receiver.borrow(), IngestionState::Completed { .. })
    }

    /// Waits until ingestion is `Completed` or `Failed` and returns that
    /// state. If the orchestrator is dropped first, returns the last state.
    pub async fn wait_until_settled(&self) -> IngestionState {
        let mut receiver = self.receiver.clone();
        let _ = receiver.wait_for(IngestionState::is_settled).await;
        let settled = receiver.borrow().clone();
        settled
    }
}

pub struct IngestionOrchestrator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    extractor: Arc<dyn PdfExtractor>,
    state: watch::Sender<IngestionState>,
}

impl IngestionOrchestrator {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self::with_extractor(embedder, index, Arc::new(LopdfExtractor))
    }

    pub fn with_extractor(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        extractor: Arc<dyn PdfExtractor>,
    ) -> Self {
        let (state, _receiver) = watch::channel(IngestionState::NotStarted);
        Self {
            embedder,
            index,
            extractor,
            state,
        }
    }

    pub fn readiness(&self) -> ReadinessGate {
        ReadinessGate {
            receiver: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> IngestionState {
        self.state.borrow().clone()
    }

    /// Runs ingestion for `config` unless this orchestrator already ran.
    ///
    /// On error the state moves to `Failed` and stays there.
    pub async fn run(&self, config: &PipelineConfig) -> Result<IngestionOutcome, IngestionError> {
        if !self.try_start() {
            return Ok(IngestionOutcome::AlreadyRun(self.state()));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("ingestion", %run_id);
        let result = self.ingest(config, run_id).instrument(span).await;
        self.finish(result)
    }

    /// Loads the config at `path` and runs ingestion. A missing config file
    /// completes the run without indexing anything.
    pub async fn run_from_config_file(
        &self,
        path: &Path,
    ) -> Result<IngestionOutcome, IngestionError> {
        let config = match PipelineConfig::load(path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                if !self.try_start() {
                    return Ok(IngestionOutcome::AlreadyRun(self.state()));
                }
                warn!(path = %path.display(), "no config file; skipping ingestion");
                let summary = IngestionSummary::empty(Uuid::new_v4(), self.index.len().await);
                return self.finish(Ok(summary));
            }
            Err(error) => {
                if !self.try_start() {
                    return Ok(IngestionOutcome::AlreadyRun(self.state()));
                }
                return self.finish(Err(error.into()));
            }
        };

        self.run(&config).await
    }

    fn try_start(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == IngestionState::NotStarted {
                *state = IngestionState::Running;
                true
            } else {
                false
            }
        })
    }

    fn finish(
        &self,
        result: Result<IngestionSummary, IngestionError>,
    ) -> Result<IngestionOutcome, IngestionError> {
        match result {
            Ok(summary) => {
                self.state.send_replace(summary.completed_state());
                Ok(IngestionOutcome::Ingested(summary))
            }
            Err(error) => {
                warn!(error = %error, "ingestion failed");
                self.state.send_replace(IngestionState::Failed {
                    reason: error.to_string(),
                });
                Err(error)
            }
        }
    }

    async fn ingest(
        &self,
        config: &PipelineConfig,
        run_id: Uuid,
    ) -> Result<IngestionSummary, IngestionError> {
        info!(path = %config.data_path.display(), "starting ingestion");
        let splitter = TextSplitter::new(ChunkingConfig::try_from(config)?);

        let data_path = config.data_path.clone();
        let extractor = Arc::clone(&self.extractor);
        let report = tokio::task::spawn_blocking(move || {
            load_documents(&data_path, extractor.as_ref())
        })
        .await
        .map_err(|error| IngestionError::Aborted(error.to_string()))?;

        let inputs: Vec<_> = report
            .documents
            .iter()
            .flat_map(|document| document.page_inputs())
            .collect();
        let chunks = splitter.split_documents(&inputs);
        info!(
            documents = report.documents.len(),
            skipped = report.skipped_files.len(),
            chunk_count = chunks.len(),
            "chunked documents"
        );

        let chunks_file = match (config.store_chunks, config.output_path.as_deref()) {
            (true, Some(dir)) => match write_chunks_file(dir, &chunks).await {
                Ok(path) => Some(path),
                Err(error) => {
                    warn!(path = %dir.display(), reason = %error, "could not write chunks file");
                    None
                }
            },
            _ => None,
        };

        let mut summary = IngestionSummary {
            run_id,
            documents: report.documents.len(),
            skipped_files: report.skipped_files,
            chunks: chunks.len(),
            inserted: 0,
            replaced: 0,
            records: 0,
            chunks_file,
        };

        if !chunks.is_empty() {
            let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self
                .embedder
                .embed_documents(&texts)
                .await
                .map_err(IngestionError::Embedding)?;

            let upserted = self.index.upsert(&chunks, &embeddings).await?;
            summary.inserted = upserted.inserted;
            summary.replaced = upserted.replaced;
        }

        summary.records = self.index.len().await;
        info!(
            records = summary.records,
            inserted = summary.inserted,
            replaced = summary.replaced,
            "ingestion finished"
        );
        Ok(summary)
    }
}

async fn write_chunks_file(dir: &Path, chunks: &[Chunk]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let mut body = String::new();
    for (position, chunk) in chunks.iter().enumerate() {
        let page = chunk.metadata.get(PAGE_KEY).map(String::as_str).unwrap_or("-");
        let _ = writeln!(
            body,
            "=== chunk {} | source: {} | page: {} ===",
            position + 1,
            chunk.source(),
            page
        );
        body.push_str(&chunk.text);
        body.push_str("\n\n");
    }

    let path = dir.join(CHUNKS_FILE);
    tokio::fs::write(&path, body).await?;
    info!(path = %path.display(), chunk_count = chunks.len(), "wrote chunks file");
    Ok(path)
}
