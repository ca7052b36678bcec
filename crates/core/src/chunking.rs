//! Recursive character splitting with exact overlap.
//!
//! Text is first cut into pieces no longer than `chunk_size - chunk_overlap`
//! characters, preferring the earliest separator in the priority list
//! (paragraph, line, sentence, word, character). Pieces are then merged
//! greedily; every chunk after the first in a page starts with the last
//! `chunk_overlap` characters of its predecessor. Lengths are counted in
//! characters, not bytes.

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::models::{Chunk, Metadata, SOURCE_KEY};

pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
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

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replaces the separator priority list. Without a trailing `""`
    /// entry, tokens that cannot be split are emitted as oversized chunks.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    fn piece_budget(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

impl TryFrom<&PipelineConfig> for ChunkingConfig {
    type Error = ConfigError;

    fn try_from(value: &PipelineConfig) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// Collapses runs of spaces and tabs inside each line, trims lines, and
/// squeezes consecutive blank lines into one paragraph break.
pub fn normalize_page_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for line in text.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_run += 1;
            continue;
        }

        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        blank_run = 0;
    }

    out
}

/// Strips directory components from a source path, accepting both `/` and
/// `\` separators.
pub fn base_file_name(source: &str) -> String {
    let trimmed = source.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

pub fn normalize_source(metadata: &mut Metadata) {
    if let Some(source) = metadata.get_mut(SOURCE_KEY) {
        *source = base_file_name(source);
    }
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkingConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        split_recursive(
            text,
            &self.config.separators,
            self.config.piece_budget(),
            &mut pieces,
        );

        merge_pieces(pieces, self.config.chunk_size, self.config.chunk_overlap)
    }

    /// Chunks each `(text, metadata)` input independently. Every chunk
    /// inherits its input's metadata with `source` reduced to a base name.
    pub fn split_documents(&self, inputs: &[(String, Metadata)]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for (text, metadata) in inputs {
            let mut metadata = metadata.clone();
            normalize_source(&mut metadata);

            let normalized = normalize_page_text(text);
            for piece in self.split_text(&normalized) {
                if piece.trim().is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    text: piece,
                    metadata: metadata.clone(),
                });
            }
        }

        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn tail(text: &str, count: usize) -> String {
    let len = char_len(text);
    text.chars().skip(len.saturating_sub(count)).collect()
}

fn split_recursive(text: &str, separators: &[String], budget: usize, out: &mut Vec<String>) {
    if char_len(text) <= budget {
        if !text.is_empty() {
            out.push(text.to_string());
        }
        return;
    }

    let Some((separator, remaining)) = separators.split_first() else {
        out.push(text.to_string());
        return;
    };

    if separator.is_empty() {
        out.extend(split_by_chars(text, budget));
        return;
    }

    if !text.contains(separator.as_str()) {
        split_recursive(text, remaining, budget, out);
        return;
    }

    for segment in split_keeping_separator(text, separator) {
        split_recursive(segment, remaining, budget, out);
    }
}

/// Splits at `separator`, leaving the separator attached to the preceding
/// segment so concatenating the segments reproduces `text`.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

fn split_by_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|window| window.iter().collect())
        .collect()
}

fn merge_pieces(pieces: Vec<String>, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    // Characters at the head of `current` copied from the previous chunk.
    let mut carried = 0usize;

    for piece in pieces {
        let piece_len = char_len(&piece);

        if current_len + piece_len <= chunk_size {
            current.push_str(&piece);
            current_len += piece_len;
            continue;
        }

        if current_len > carried {
            chunks.push(current.clone());
        }

        if piece_len > chunk_size {
            current = tail(&piece, chunk_overlap);
            carried = char_len(&current);
            current_len = carried;
            chunks.push(piece);
            continue;
        }

        let keep = chunk_overlap.min(chunk_size - piece_len);
        let mut next = tail(&current, keep);
        carried = char_len(&next);
        next.push_str(&piece);
        current = next;
        current_len = carried + piece_len;
    }

    if current_len > carried {
        chunks.push(current);
    }

    chunks
}
