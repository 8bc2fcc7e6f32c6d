//! Text extraction from stored document bytes.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::processing::sanitize::{sanitize_string, word_count};

/// Errors raised by a [`TextExtractor`].
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extractor cannot read this kind of document.
    #[error("Unsupported MIME type '{0}'")]
    UnsupportedMimeType(String),
    /// Bytes are not valid in the declared encoding.
    #[error("Document is not valid UTF-8: {0}")]
    InvalidEncoding(String),
    /// Extractor failed for another reason.
    #[error("Extraction failed: {0}")]
    Failed(String),
}

impl ExtractionError {
    /// Unsupported or undecodable input fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Metadata reported alongside extracted text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionMetadata {
    /// Page count, when the format has pages.
    pub page_count: Option<u32>,
    /// Word count of the raw text.
    pub word_count: Option<u64>,
    /// Document title.
    pub title: Option<String>,
    /// Document author.
    pub author: Option<String>,
}

/// Extractor output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    /// Raw text, cleaned later by the pipeline.
    pub text: String,
    /// Reported metadata.
    pub metadata: ExtractionMetadata,
    /// Whether the source looked like a scanned image without a text layer.
    pub is_scanned: bool,
}

/// Turns document bytes into text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text from `bytes` declared as `mime_type`.
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<ExtractedText, ExtractionError>;
}

/// Extractor for UTF-8 text formats (plain text, markdown, CSV, JSON, HTML).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    fn supports(mime_type: &str) -> bool {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence.starts_with("text/")
            || matches!(
                essence.as_str(),
                "application/json" | "application/x-ndjson" | "application/markdown" | "application/xml"
            )
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<ExtractedText, ExtractionError> {
        if !Self::supports(mime_type) {
            return Err(ExtractionError::UnsupportedMimeType(mime_type.to_string()));
        }
        let raw = std::str::from_utf8(bytes)
            .map_err(|error| ExtractionError::InvalidEncoding(error.to_string()))?;
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let text = if mime_type.to_ascii_lowercase().starts_with("text/html") {
            strip_markup(raw)
        } else {
            raw.to_string()
        };

        let title = sanitize_string(
            text.lines()
                .find_map(|line| line.trim_start().strip_prefix("# "))
                .map(str::to_string),
        );

        Ok(ExtractedText {
            metadata: ExtractionMetadata {
                page_count: None,
                word_count: Some(word_count(&text) as u64),
                title,
                author: None,
            },
            text,
            is_scanned: false,
        })
    }
}

fn strip_markup(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text
}
