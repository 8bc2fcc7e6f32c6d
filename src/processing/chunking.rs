//! Text chunking: character windows, word windows, and paragraph sections.
//!
//! All three strategies share the same output shape ([`ChunkRecord`]): a zero-based contiguous
//! index, trimmed content, and half-open `[start_char, end_char)` offsets measured in Unicode
//! scalar values against the text that was passed in.
//!
//! - Character windows walk `size` characters at a time and, when asked to, pull the window end
//!   back to the closest sentence terminator (`. `, `! `, `? ` or the same followed by a newline)
//!   within 200 characters, then to whitespace within 100 characters. A snapped end never falls
//!   at or before `start + overlap`, so the next window always starts strictly later and no
//!   character between two windows is skipped.
//! - Word windows group `size` whitespace-separated words and join them with single spaces.
//! - Sections pack blank-line separated paragraphs greedily up to `max_size` characters and fall
//!   back to character windows for a paragraph that does not fit on its own.

use super::tokens::{TokenCounter, build_token_counter, whitespace_token_counter};
use super::types::{ChunkRecord, ChunkingError, ChunkingMode};

const SENTENCE_LOOKBACK: usize = 200;
const WHITESPACE_LOOKBACK: usize = 100;

/// Splits extracted text into ordered chunk records.
///
/// Construct once per model (token estimates are model-aware) and reuse; the service holds no
/// mutable state.
#[derive(Clone)]
pub struct ChunkingService {
    token_counter: TokenCounter,
}

impl Default for ChunkingService {
    fn default() -> Self {
        Self::new(whitespace_token_counter())
    }
}

impl std::fmt::Debug for ChunkingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkingService").finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct RawChunk {
    start: usize,
    end: usize,
    content: String,
}

impl ChunkingService {
    /// Build a service around an explicit token counter.
    pub fn new(token_counter: TokenCounter) -> Self {
        Self { token_counter }
    }

    /// Build a service whose token estimates follow the tokenizer of `model` when known.
    pub fn for_model(model: &str) -> Self {
        Self::new(build_token_counter(model))
    }

    /// Character-window chunking.
    ///
    /// Empty or whitespace-only text yields an empty vector. Fails when `size == 0` or
    /// `overlap >= size`.
    pub fn chunk(
        &self,
        text: &str,
        size: usize,
        overlap: usize,
        respect_sentences: bool,
    ) -> Result<Vec<ChunkRecord>, ChunkingError> {
        validate_window(size, overlap)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let chars: Vec<char> = text.chars().collect();
        let raw = character_windows(&chars, size, overlap, respect_sentences);
        Ok(self.finalize(raw))
    }

    /// Word-window chunking; `size` and `overlap` are counted in words.
    ///
    /// Content joins the window's words with single spaces, but `start_char`/`end_char` are the
    /// positions of the first word's start and the last word's end in `text` itself, not offsets
    /// into a running concatenation of joined windows. Offsets therefore stay valid for slicing
    /// the source even when it contains whitespace runs or overlapping windows.
    pub fn chunk_by_words(
        &self,
        text: &str,
        size: usize,
        overlap: usize,
    ) -> Result<Vec<ChunkRecord>, ChunkingError> {
        validate_window(size, overlap)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let chars: Vec<char> = text.chars().collect();
        let words = word_spans(&chars);
        let mut raw = Vec::new();
        let step = size - overlap;
        let mut position = 0;

        while position < words.len() {
            let window_end = (position + size).min(words.len());
            let window = &words[position..window_end];
            let content = window
                .iter()
                .map(|&(start, end)| slice(&chars, start, end))
                .collect::<Vec<_>>()
                .join(" ");
            raw.push(RawChunk {
                start: window[0].0,
                end: window[window.len() - 1].1,
                content,
            });
            if window_end == words.len() {
                break;
            }
            position += step;
        }

        Ok(self.finalize(raw))
    }

    /// Paragraph-aware chunking bounded by `max_size` characters.
    ///
    /// `overlap` only applies when an oversized paragraph is re-split with character windows.
    pub fn chunk_by_sections(
        &self,
        text: &str,
        max_size: usize,
        overlap: usize,
    ) -> Result<Vec<ChunkRecord>, ChunkingError> {
        validate_window(max_size, overlap)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let chars: Vec<char> = text.chars().collect();
        let mut raw = Vec::new();
        let mut current: Option<(usize, usize)> = None;

        for (para_start, para_end) in paragraph_spans(&chars) {
            if para_end - para_start > max_size {
                if let Some((start, end)) = current.take() {
                    raw.push(raw_from_span(&chars, start, end));
                }
                let paragraph = &chars[para_start..para_end];
                raw.extend(
                    character_windows(paragraph, max_size, overlap, true)
                        .into_iter()
                        .map(|chunk| RawChunk {
                            start: chunk.start + para_start,
                            end: chunk.end + para_start,
                            content: chunk.content,
                        }),
                );
                continue;
            }

            current = match current {
                Some((start, _)) if para_end - start <= max_size => Some((start, para_end)),
                Some((start, end)) => {
                    raw.push(raw_from_span(&chars, start, end));
                    Some((para_start, para_end))
                }
                None => Some((para_start, para_end)),
            };
        }

        if let Some((start, end)) = current {
            raw.push(raw_from_span(&chars, start, end));
        }

        Ok(self.finalize(raw))
    }

    /// Dispatch to the strategy named by `mode`.
    ///
    /// Character windows respect sentence boundaries when chosen through this entry point.
    pub fn chunk_with_mode(
        &self,
        mode: ChunkingMode,
        text: &str,
        size: usize,
        overlap: usize,
    ) -> Result<Vec<ChunkRecord>, ChunkingError> {
        match mode {
            ChunkingMode::Words => self.chunk_by_words(text, size, overlap),
            ChunkingMode::Characters => self.chunk(text, size, overlap, true),
            ChunkingMode::Sections => self.chunk_by_sections(text, size, overlap),
        }
    }

    /// Advisory token estimate for an arbitrary string.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        (self.token_counter)(text)
    }

    fn finalize(&self, raw: Vec<RawChunk>) -> Vec<ChunkRecord> {
        raw.into_iter()
            .filter(|chunk| !chunk.content.is_empty())
            .enumerate()
            .map(|(index, chunk)| ChunkRecord {
                index,
                token_count: self.estimate_tokens(&chunk.content),
                content: chunk.content,
                start_char: chunk.start,
                end_char: chunk.end,
            })
            .collect()
    }
}

fn validate_window(size: usize, overlap: usize) -> Result<(), ChunkingError> {
    if size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= size {
        return Err(ChunkingError::InvalidOverlap { size, overlap });
    }
    Ok(())
}

fn character_windows(
    chars: &[char],
    size: usize,
    overlap: usize,
    respect_sentences: bool,
) -> Vec<RawChunk> {
    let len = chars.len();
    let mut windows = Vec::new();
    let mut position = 0;

    while position < len {
        let start = position;
        let mut end = (start + size).min(len);
        if respect_sentences && end < len {
            end = snap_window_end(chars, start, end, overlap);
        }

        let content = trimmed(chars, start, end);
        if !content.is_empty() {
            windows.push(RawChunk {
                start,
                end,
                content,
            });
        }

        if end >= len {
            break;
        }

        let mut next = end.saturating_sub(overlap);
        if next <= start {
            next = start + size;
        }
        position = next;
    }

    windows
}

/// Pull `end` back to a sentence terminator, then to whitespace; keep it otherwise.
fn snap_window_end(chars: &[char], start: usize, end: usize, overlap: usize) -> usize {
    let floor = start + overlap + 1;

    let sentence_floor = end.saturating_sub(SENTENCE_LOOKBACK).max(start);
    for index in (sentence_floor..end.saturating_sub(1)).rev() {
        if index + 1 < floor {
            break;
        }
        if matches!(chars[index], '.' | '!' | '?') && matches!(chars[index + 1], ' ' | '\n') {
            return index + 1;
        }
    }

    let whitespace_floor = end.saturating_sub(WHITESPACE_LOOKBACK).max(floor);
    for index in (whitespace_floor..end).rev() {
        if chars[index].is_whitespace() {
            return index;
        }
    }

    end
}

fn word_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut word_start: Option<usize> = None;

    for (index, ch) in chars.iter().enumerate() {
        match (ch.is_whitespace(), word_start) {
            (true, Some(start)) => {
                spans.push((start, index));
                word_start = None;
            }
            (false, None) => word_start = Some(index),
            _ => {}
        }
    }
    if let Some(start) = word_start {
        spans.push((start, chars.len()));
    }

    spans
}

/// Paragraph spans separated by one or more blank lines, trimmed to non-whitespace.
fn paragraph_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut paragraphs = Vec::new();
    let mut paragraph: Option<(usize, usize)> = None;
    let mut line_start = 0;

    for index in 0..=chars.len() {
        if index < chars.len() && chars[index] != '\n' {
            continue;
        }
        let line = &chars[line_start..index];
        if line.iter().all(|ch| ch.is_whitespace()) {
            if let Some(span) = paragraph.take() {
                paragraphs.push(span);
            }
        } else {
            paragraph = match paragraph {
                Some((start, _)) => Some((start, index)),
                None => Some((line_start, index)),
            };
        }
        line_start = index + 1;
    }
    if let Some(span) = paragraph {
        paragraphs.push(span);
    }

    paragraphs
        .into_iter()
        .filter_map(|(start, end)| trim_span(chars, start, end))
        .collect()
}

fn raw_from_span(chars: &[char], start: usize, end: usize) -> RawChunk {
    RawChunk {
        start,
        end,
        content: trimmed(chars, start, end),
    }
}

fn trim_span(chars: &[char], start: usize, end: usize) -> Option<(usize, usize)> {
    let first = (start..end).find(|&index| !chars[index].is_whitespace())?;
    let last = (start..end).rev().find(|&index| !chars[index].is_whitespace())?;
    Some((first, last + 1))
}

fn trimmed(chars: &[char], start: usize, end: usize) -> String {
    trim_span(chars, start, end)
        .map(|(first, last)| slice(chars, first, last))
        .unwrap_or_default()
}

fn slice(chars: &[char], start: usize, end: usize) -> String {
    chars[start..end].iter().collect()
}
