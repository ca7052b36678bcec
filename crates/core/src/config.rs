//! Pipeline configuration loaded from a JSON document.
//!
//! Optional keys fall back to defaults. Required keys fail with
//! [`ConfigError::MissingKey`] instead of leaking an absent value into
//! downstream calls.

use crate::error::ConfigError;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_RETRIEVAL_K: usize = 4;
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub data_path: PathBuf,
    pub db_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub ollama_model: String,
    pub ollama_url: Url,
    pub embedding_model: Option<String>,
    pub retrieval_k: usize,
    pub store_chunks: bool,
    pub output_path: Option<PathBuf>,
    pub embed_batch_size: usize,
    pub request_timeout: Duration,
    pub generation_timeout: Duration,
    pub retry: RetryPolicy,
    pub bind_addr: String,
    pub logging: LoggingConfig,
    pub environment: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), doubling each time.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(rename = "LOGGING_LEVEL", default)]
    pub level: Option<String>,
    #[serde(rename = "LOG_FILE", default)]
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Maps the configured level name onto a `tracing` filter directive.
    /// Unknown names fall back to `debug`.
    pub fn filter_directive(&self) -> &'static str {
        match self.level.as_deref().map(str::to_lowercase).as_deref() {
            None => "info",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warning") | Some("warn") => "warn",
            Some("error") | Some("critical") => "error",
            Some("trace") => "trace",
            Some(_) => "debug",
        }
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct RawConfig {
    data_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    ollama_model: Option<String>,
    ollama_url: Option<String>,
    #[serde(default)]
    embedding_model: Option<String>,
    #[serde(default)]
    retrieval_k: Option<usize>,
    #[serde(default)]
    store_chunks: Option<bool>,
    #[serde(default)]
    output_path: Option<PathBuf>,
    #[serde(default)]
    embed_batch_size: Option<usize>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    request_timeout_secs: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    generation_timeout_secs: Option<Duration>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    retry_backoff_ms: Option<Duration>,
    #[serde(default)]
    bind_addr: Option<String>,
    #[serde(rename = "LOGS", default)]
    logs: Option<LoggingConfig>,
    #[serde(rename = "ENVIRONMENT", default)]
    environment: Option<String>,
    #[serde(rename = "VERSION", default)]
    version: Option<String>,
}

impl PipelineConfig {
    /// Loads the config file at `path`.
    ///
    /// A missing file is not an error: it returns `Ok(None)` and logs a
    /// warning so callers can decide how to degrade.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found");
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Self::from_json_str(&text).map(Some)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let data_path = raw.data_path.ok_or(ConfigError::MissingKey("data_path"))?;
        let db_path = raw.db_path.ok_or(ConfigError::MissingKey("db_path"))?;
        let chunk_size = raw.chunk_size.ok_or(ConfigError::MissingKey("chunk_size"))?;
        let chunk_overlap = raw
            .chunk_overlap
            .ok_or(ConfigError::MissingKey("chunk_overlap"))?;
        let ollama_model = raw
            .ollama_model
            .filter(|model| !model.trim().is_empty())
            .ok_or(ConfigError::MissingKey("ollama_model"))?;
        let raw_url = raw.ollama_url.ok_or(ConfigError::MissingKey("ollama_url"))?;

        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "chunk_size",
                details: "must be greater than zero".to_string(),
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::Invalid {
                key: "chunk_overlap",
                details: format!("{chunk_overlap} must be less than chunk_size {chunk_size}"),
            });
        }

        let ollama_url = parse_service_url(&raw_url)?;

        let retrieval_k = raw.retrieval_k.unwrap_or(DEFAULT_RETRIEVAL_K);
        if retrieval_k == 0 {
            return Err(ConfigError::Invalid {
                key: "retrieval_k",
                details: "must be at least 1".to_string(),
            });
        }

        let embed_batch_size = raw.embed_batch_size.unwrap_or(DEFAULT_EMBED_BATCH_SIZE);
        if embed_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "embed_batch_size",
                details: "must be at least 1".to_string(),
            });
        }

        let store_chunks = raw.store_chunks.unwrap_or(false);
        if store_chunks && raw.output_path.is_none() {
            return Err(ConfigError::MissingKey("output_path"));
        }

        let defaults = RetryPolicy::default();

        Ok(Self {
            data_path,
            db_path,
            chunk_size,
            chunk_overlap,
            ollama_model,
            ollama_url,
            embedding_model: raw.embedding_model.filter(|model| !model.trim().is_empty()),
            retrieval_k,
            store_chunks,
            output_path: raw.output_path,
            embed_batch_size,
            request_timeout: raw.request_timeout_secs.unwrap_or(Duration::from_secs(60)),
            generation_timeout: raw
                .generation_timeout_secs
                .unwrap_or(Duration::from_secs(120)),
            retry: RetryPolicy {
                max_retries: raw.max_retries.unwrap_or(defaults.max_retries),
                initial_backoff: raw.retry_backoff_ms.unwrap_or(defaults.initial_backoff),
            },
            bind_addr: raw
                .bind_addr
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            logging: raw.logs.unwrap_or_default(),
            environment: raw.environment.filter(|value| !value.is_empty()),
            version: raw.version.filter(|value| !value.is_empty()),
        })
    }

    pub fn embedding_model(&self) -> &str {
        self.embedding_model.as_deref().unwrap_or(&self.ollama_model)
    }
}

fn parse_service_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|error| ConfigError::Invalid {
        key: "ollama_url",
        details: error.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            key: "ollama_url",
            details: format!("unsupported scheme `{}`", url.scheme()),
        });
    }

    Ok(url)
}
