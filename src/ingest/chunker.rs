//! Token-aware document chunking.
//!
//! [`TokenChunker`] splits extracted text into overlapping, token-bounded
//! chunks. Boundaries prefer paragraph breaks, then sentence breaks, and only
//! fall back to word-level (and in the degenerate case character-level)
//! splits when a single unit exceeds the chunk budget. Consecutive chunks
//! share up to `chunk_overlap` tokens; each chunk records the byte length of
//! that shared prefix so the original text can be reconstructed exactly.

use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base};

use super::extract::ExtractionError;
use crate::config::ChunkingConfig;

/// Curriculum metadata stamped onto every chunk of a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub class_level: String,
    pub subject: String,
    pub chapter: String,
    pub source_document_id: String,
    pub chunk_index: usize,
}

/// One token-bounded segment of a source document.
///
/// Immutable once created; the chunker owns it until it is handed to the
/// embedding batcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub token_count: usize,
    /// Byte length of the prefix of `text` shared with the previous chunk.
    /// `chunks[0].text + chunks[i].text[overlap_len..]` reconstructs the
    /// source exactly.
    pub overlap_len: usize,
    pub metadata: ChunkMetadata,
}

/// Identity and curriculum placement of a document being ingested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentDescriptor {
    pub document_id: String,
    pub class_level: String,
    pub subject: String,
    pub chapter: String,
}

impl DocumentDescriptor {
    pub fn new(
        document_id: impl Into<String>,
        class_level: impl Into<String>,
        subject: impl Into<String>,
        chapter: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            class_level: class_level.into(),
            subject: subject.into(),
            chapter: chapter.into(),
        }
    }
}

/// Chunker construction failures.
#[derive(Debug, Error, Diagnostic)]
pub enum ChunkerError {
    #[error("failed to load tokenizer: {0}")]
    #[diagnostic(code(papersmith::chunker::tokenizer))]
    Tokenizer(String),

    #[error("chunk_overlap {overlap} must be smaller than chunk_size {size}")]
    #[diagnostic(code(papersmith::chunker::overlap_too_large))]
    OverlapTooLarge { overlap: usize, size: usize },
}

/// Shared token counter over the `cl100k_base` vocabulary.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TokenCounter {
    pub fn new() -> Result<Self, ChunkerError> {
        let bpe = cl100k_base().map_err(|err| ChunkerError::Tokenizer(err.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

#[derive(Clone, Debug)]
struct Unit {
    text: String,
    tokens: usize,
}

/// Splits text into overlapping token-bounded chunks.
#[derive(Clone)]
pub struct TokenChunker {
    counter: TokenCounter,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TokenChunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self, ChunkerError> {
        if config.chunk_overlap >= config.chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                overlap: config.chunk_overlap,
                size: config.chunk_size,
            });
        }
        Ok(Self {
            counter: TokenCounter::new()?,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        })
    }

    /// Shares this chunker's token counter (used by the context retriever for
    /// its token budget).
    pub fn counter(&self) -> TokenCounter {
        self.counter.clone()
    }

    /// Chunks `text` into an ordered, gap-free cover of the input.
    ///
    /// Fails with [`ExtractionError::NoText`] when the input has no
    /// extractable content; that condition is structural and never retried.
    pub fn chunk(
        &self,
        text: &str,
        descriptor: &DocumentDescriptor,
    ) -> Result<Vec<DocumentChunk>, ExtractionError> {
        if text.trim().is_empty() {
            return Err(ExtractionError::NoText {
                document: descriptor.document_id.clone(),
            });
        }

        let units = self.split_units(text);
        let mut chunks: Vec<DocumentChunk> = Vec::new();
        let mut current: Vec<Unit> = Vec::new();
        let mut current_tokens = 0usize;
        // Leading units of `current` carried over from the previous chunk.
        let mut overlap_count = 0usize;

        for unit in units {
            let has_fresh_content = current.len() > overlap_count;
            if has_fresh_content && current_tokens + unit.tokens > self.chunk_size {
                let overlap_len = byte_len(&current[..overlap_count]);
                chunks.push(self.make_chunk(descriptor, chunks.len(), &current, overlap_len));

                let mut carry = self.trailing_overlap(&current);
                let mut carry_tokens: usize = carry.iter().map(|u| u.tokens).sum();
                while !carry.is_empty() && carry_tokens + unit.tokens > self.chunk_size {
                    let dropped = carry.remove(0);
                    carry_tokens -= dropped.tokens;
                }
                overlap_count = carry.len();
                current_tokens = carry_tokens;
                current = carry;
            }
            current_tokens += unit.tokens;
            current.push(unit);
        }

        if current.len() > overlap_count {
            let overlap_len = byte_len(&current[..overlap_count]);
            chunks.push(self.make_chunk(descriptor, chunks.len(), &current, overlap_len));
        }

        if chunks.is_empty() {
            return Err(ExtractionError::NoText {
                document: descriptor.document_id.clone(),
            });
        }
        tracing::debug!(
            document = %descriptor.document_id,
            chunks = chunks.len(),
            "chunked document"
        );
        Ok(chunks)
    }

    fn make_chunk(
        &self,
        descriptor: &DocumentDescriptor,
        index: usize,
        units: &[Unit],
        overlap_len: usize,
    ) -> DocumentChunk {
        let mut text = String::with_capacity(byte_len(units));
        let mut tokens = 0usize;
        for unit in units {
            text.push_str(&unit.text);
            tokens += unit.tokens;
        }
        DocumentChunk {
            text,
            token_count: tokens,
            overlap_len,
            metadata: ChunkMetadata {
                class_level: descriptor.class_level.clone(),
                subject: descriptor.subject.clone(),
                chapter: descriptor.chapter.clone(),
                source_document_id: descriptor.document_id.clone(),
                chunk_index: index,
            },
        }
    }

    /// Trailing units of the closed chunk that fit within the overlap budget.
    /// When even the last unit is too large, a trailing word suffix of it is
    /// used instead, so consecutive chunks still share at least one token
    /// whenever any word fits the budget.
    fn trailing_overlap(&self, units: &[Unit]) -> Vec<Unit> {
        let mut carry: Vec<Unit> = Vec::new();
        let mut total = 0usize;
        for unit in units.iter().rev() {
            if total + unit.tokens > self.chunk_overlap {
                break;
            }
            total += unit.tokens;
            carry.push(unit.clone());
        }
        carry.reverse();
        if carry.is_empty() {
            if let Some(last) = units.last() {
                if let Some(suffix) = self.trailing_word_suffix(&last.text) {
                    carry.push(suffix);
                }
            }
        }
        carry
    }

    fn trailing_word_suffix(&self, text: &str) -> Option<Unit> {
        let mut best: Option<Unit> = None;
        for offset in word_start_offsets(text).into_iter().rev() {
            let suffix = &text[offset..];
            let tokens = self.counter.count(suffix);
            if tokens == 0 {
                continue;
            }
            if tokens > self.chunk_overlap {
                break;
            }
            best = Some(Unit {
                text: suffix.to_string(),
                tokens,
            });
        }
        best
    }

    /// Splits text into boundary-respecting units, each within the chunk
    /// budget: whole paragraphs when they fit, sentences otherwise, packed
    /// words for oversized sentences.
    fn split_units(&self, text: &str) -> Vec<Unit> {
        let mut units = Vec::new();
        for paragraph in text.split_inclusive("\n\n") {
            let tokens = self.counter.count(paragraph);
            if tokens <= self.chunk_size {
                units.push(Unit {
                    text: paragraph.to_string(),
                    tokens,
                });
                continue;
            }
            for sentence in split_sentences(paragraph) {
                let tokens = self.counter.count(sentence);
                if tokens <= self.chunk_size {
                    units.push(Unit {
                        text: sentence.to_string(),
                        tokens,
                    });
                } else {
                    units.extend(self.pack_words(sentence));
                }
            }
        }
        units
    }

    fn pack_words(&self, sentence: &str) -> Vec<Unit> {
        let mut units = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;
        for piece in sentence.split_inclusive(char::is_whitespace) {
            let piece_tokens = self.counter.count(piece);
            if piece_tokens > self.chunk_size {
                if !current.is_empty() {
                    units.push(Unit {
                        text: std::mem::take(&mut current),
                        tokens: current_tokens,
                    });
                    current_tokens = 0;
                }
                units.extend(self.hard_split(piece));
                continue;
            }
            if !current.is_empty() && current_tokens + piece_tokens > self.chunk_size {
                units.push(Unit {
                    text: std::mem::take(&mut current),
                    tokens: current_tokens,
                });
                current_tokens = 0;
            }
            current.push_str(piece);
            current_tokens += piece_tokens;
        }
        if !current.is_empty() {
            units.push(Unit {
                text: current,
                tokens: current_tokens,
            });
        }
        units
    }

    /// Last resort for a single word larger than the chunk budget: cut on
    /// character boundaries, shrinking proportionally until a slice fits.
    fn hard_split(&self, text: &str) -> Vec<Unit> {
        let mut units = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let mut end = rest.len();
            loop {
                let slice = &rest[..end];
                let tokens = self.counter.count(slice);
                let char_count = slice.chars().count();
                if tokens <= self.chunk_size || char_count <= 1 {
                    units.push(Unit {
                        text: slice.to_string(),
                        tokens,
                    });
                    rest = &rest[end..];
                    break;
                }
                let target = (char_count * self.chunk_size / tokens).clamp(1, char_count - 1);
                end = slice
                    .char_indices()
                    .nth(target)
                    .map(|(idx, _)| idx)
                    .unwrap_or(1);
            }
        }
        units
    }
}

fn byte_len(units: &[Unit]) -> usize {
    units.iter().map(|unit| unit.text.len()).sum()
}

/// Splits text after sentence-terminal punctuation followed by whitespace,
/// keeping separators attached so the pieces concatenate back to the input.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut prev_terminal = false;
    for (idx, ch) in text.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            let end = idx + ch.len_utf8();
            pieces.push(&text[start..end]);
            start = end;
            prev_terminal = false;
        } else {
            prev_terminal = matches!(ch, '.' | '!' | '?');
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Byte offsets at which a word starts (a non-whitespace character preceded
/// by whitespace or the start of the string).
fn word_start_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut prev_was_ws = true;
    for (idx, ch) in text.char_indices() {
        if !ch.is_whitespace() && prev_was_ws {
            offsets.push(idx);
        }
        prev_was_ws = ch.is_whitespace();
    }
    offsets
}
