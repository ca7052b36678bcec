use pdf_qa_core::{
    AnswerSynthesizer, Embedder, IngestionOrchestrator, LocalVectorIndex, OllamaClient,
    OllamaEmbedder, OllamaGenerator, PipelineConfig, ReadinessGate, Retriever, VectorIndex,
};
use std::sync::Arc;

/// Shared by every request handler.
pub struct AppState {
    pub synthesizer: AnswerSynthesizer,
    pub readiness: ReadinessGate,
}

impl AppState {
    pub fn new(synthesizer: AnswerSynthesizer, readiness: ReadinessGate) -> Self {
        Self {
            synthesizer,
            readiness,
        }
    }
}

/// The wired pipeline for one process.
pub struct Pipeline {
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub synthesizer: AnswerSynthesizer,
}

impl Pipeline {
    pub async fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let client = Arc::new(OllamaClient::from_config(config));

        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(
            Arc::clone(&client),
            config.embedding_model(),
            config.embed_batch_size,
        ));
        let index: Arc<dyn VectorIndex> =
            Arc::new(LocalVectorIndex::open(&config.db_path, embedder.model_name()).await?);
        let generator = Arc::new(OllamaGenerator::new(
            client,
            config.ollama_model.clone(),
            config.generation_timeout,
        ));

        let retriever = Retriever::new(Arc::clone(&embedder), Arc::clone(&index), config.retrieval_k);
        Ok(Self {
            orchestrator: Arc::new(IngestionOrchestrator::new(embedder, index)),
            synthesizer: AnswerSynthesizer::new(retriever, generator),
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.synthesizer.clone(), self.orchestrator.readiness())
    }
}
