use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is not valid json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("missing required config key `{0}`")]
    MissingKey(&'static str),

    #[error("invalid value for config key `{key}`: {details}")]
    Invalid { key: &'static str, details: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),
}

/// Failures talking to the model service (embeddings and generation).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("model service unavailable at {endpoint}: {details}")]
    Unavailable { endpoint: String, details: String },

    #[error("model service at {endpoint} timed out after {seconds}s")]
    Timeout { endpoint: String, seconds: u64 },

    #[error("unexpected HTTP status {status} from {url}: {body}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("failed to decode model service response: {0}")]
    Decode(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Unavailable { .. } | ServiceError::Timeout { .. } => true,
            ServiceError::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ServiceError::Decode(_) | ServiceError::Url(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("got {embeddings} embeddings for {chunks} chunks")]
    LengthMismatch { chunks: usize, embeddings: usize },

    #[error("index is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("index not ready: {0}")]
    NotReady(String),

    #[error("embedding failed: {0}")]
    Embedding(#[source] ServiceError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("answer generation failed: {0}")]
    Generation(#[source] ServiceError),
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("embedding failed: {0}")]
    Embedding(#[source] ServiceError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("ingestion task aborted: {0}")]
    Aborted(String),
}
