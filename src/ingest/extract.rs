//! Document text extraction seam.
//!
//! Extraction is an external collaborator: given a raw document it either
//! yields plain text or fails with [`ExtractionError`]. The error is
//! structural — a scanned, image-only document does not become extractable
//! by retrying — so the pipeline surfaces it instead of retrying.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

/// A raw document handed to the ingestion pipeline.
#[derive(Clone, Debug)]
pub struct RawDocument {
    /// Caller-facing name, used in error reports.
    pub name: String,
    pub data: Vec<u8>,
}

impl RawDocument {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Non-retryable extraction failures.
#[derive(Debug, Error, Diagnostic)]
pub enum ExtractionError {
    /// The document is structurally text-free (e.g. scanned pages).
    #[error("no extractable text in document '{document}'")]
    #[diagnostic(
        code(papersmith::extract::no_text),
        help("Scanned or image-only documents need OCR before ingestion.")
    )]
    NoText { document: String },

    /// The document bytes could not be interpreted at all.
    #[error("unreadable document '{document}': {reason}")]
    #[diagnostic(code(papersmith::extract::unreadable))]
    Unreadable { document: String, reason: String },
}

/// Turns a raw document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &RawDocument) -> Result<String, ExtractionError>;
}

/// Pass-through extractor for documents that already are UTF-8 text.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, document: &RawDocument) -> Result<String, ExtractionError> {
        let text = std::str::from_utf8(&document.data).map_err(|err| ExtractionError::Unreadable {
            document: document.name.clone(),
            reason: err.to_string(),
        })?;
        if text.trim().is_empty() {
            return Err(ExtractionError::NoText {
                document: document.name.clone(),
            });
        }
        Ok(text.to_string())
    }
}
