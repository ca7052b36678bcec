//! Prompt assembly and answer generation.
//!
//! The retrieved chunks are fetched once and used both for the prompt
//! context and for the returned source list, so the sources always
//! describe exactly the context the model saw.

use crate::error::{AskError, ServiceError};
use crate::models::{AnswerResult, RetrievedChunk};
use crate::retriever::Retriever;
use crate::traits::LanguageModel;
use std::sync::Arc;
use tracing::{debug, info};

const PREAMBLE: &str = "You are a helpful assistant that answers questions directly, \
professionally and concisely.
Your knowledge comes only from the documents passed to you as context.
Answer the question based only on the following context. If the context does not \
contain the answer, say \"I don't know\" or that you cannot provide a complete answer.
After each sentence, put the file names of the sources you used in parentheses.";

/// Renders the prompt sent to the language model.
pub fn render_prompt(question: &str, context: &[RetrievedChunk]) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str("\n\nContext:\n");

    for chunk in context {
        prompt.push_str("[source: ");
        prompt.push_str(chunk.source());
        prompt.push_str("]\n");
        prompt.push_str(chunk.text.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str("Question: ");
    prompt.push_str(question.trim());
    prompt.push_str("\n\nAnswer (with source file names in parentheses):\n");
    prompt
}

#[derive(Clone)]
pub struct AnswerSynthesizer {
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
}

impl AnswerSynthesizer {
    pub fn new(retriever: Retriever, model: Arc<dyn LanguageModel>) -> Self {
        Self { retriever, model }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn ask(&self, question: &str) -> Result<AnswerResult, AskError> {
        let retrieval = self.retriever.retrieve(question).await?;
        let prompt = render_prompt(question, &retrieval.chunks);
        debug!(
            model = self.model.model_name(),
            prompt_chars = prompt.chars().count(),
            "generating answer"
        );

        let answer = self
            .model
            .generate(&prompt)
            .await
            .map_err(AskError::Generation)?
            .trim()
            .to_string();
        if answer.is_empty() {
            return Err(AskError::Generation(ServiceError::Decode(
                "model returned an empty answer".to_string(),
            )));
        }

        let sources = retrieval.sources();
        info!(sources = ?sources, "answered question");
        Ok(AnswerResult { answer, sources })
    }
}
