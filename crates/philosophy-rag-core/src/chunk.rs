//! Overlapping fixed-window text chunker.
//!
//! Splits document text into spans of at most `chunk_size` characters,
//! consecutive spans sharing exactly `overlap` characters. Windows are
//! measured in Unicode scalar values rather than bytes, so Vietnamese or
//! Greek source text never gets cut inside a character.
//!
//! # Algorithm
//!
//! 1. Validate `0 ≤ overlap < chunk_size` (see [`ChunkConfig::new`]).
//! 2. Emit the window `[start, start + chunk_size)`, clipped to the text.
//! 3. Stop once a window reaches the end of the text; otherwise advance
//!    `start` by `chunk_size - overlap` characters and repeat.
//!
//! The final span may be shorter than `chunk_size`; trailing text is
//! never dropped. Dropping the first `overlap` characters of every span
//! after the first and concatenating reproduces the input exactly (see
//! [`reconstruct`]).
//!
//! # Example
//!
//! ```rust
//! use philosophy_rag_core::chunk::{ChunkConfig, Chunker};
//!
//! let chunker = Chunker::new(ChunkConfig::new(8, 3).unwrap());
//! let spans: Vec<_> = chunker.spans("Know thyself, said the oracle.").collect();
//! assert_eq!(spans[0].text, "Know thy");
//! assert_eq!(spans[1].text, "thyself,");
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Validated chunking parameters, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkConfig {
    /// Create a config, rejecting `chunk_size == 0` and `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Config("chunking.chunk_size must be > 0".into()));
        }
        if overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// A borrowed window of the source text with its character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

/// Lazy iterator over the spans of one document.
///
/// Cloning the iterator restarts nothing; call [`Chunker::spans`] again
/// (or clone before consuming) to walk the same text a second time.
#[derive(Debug, Clone)]
pub struct Spans<'a> {
    text: &'a str,
    config: ChunkConfig,
    byte_pos: usize,
    char_pos: usize,
    done: bool,
}

impl<'a> Iterator for Spans<'a> {
    type Item = Span<'a>;

    fn next(&mut self) -> Option<Span<'a>> {
        if self.done {
            return None;
        }
        let rest = &self.text[self.byte_pos..];
        if rest.is_empty() {
            self.done = true;
            return None;
        }

        let end_byte = byte_offset_after(rest, self.config.chunk_size);
        let piece = &rest[..end_byte];
        let span = Span {
            start: self.char_pos,
            end: self.char_pos + piece.chars().count(),
            text: piece,
        };

        if end_byte == rest.len() {
            self.done = true;
        } else {
            self.byte_pos += byte_offset_after(rest, self.config.step());
            self.char_pos += self.config.step();
        }
        Some(span)
    }
}

/// Byte offset just past the first `n` characters of `s` (or `s.len()`).
fn byte_offset_after(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Splits documents into overlapping chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Iterate the spans of `text`. Empty text yields no spans.
    pub fn spans<'a>(&self, text: &'a str) -> Spans<'a> {
        Spans {
            text,
            config: self.config,
            byte_pos: 0,
            char_pos: 0,
            done: false,
        }
    }

    /// Lazily materialise the chunks of one source document.
    ///
    /// Chunk ids are deterministic (`{school}:{source}#{ordinal}`) so that a
    /// rebuilt index produces the same citations for unchanged sources.
    pub fn chunk_document<'a>(
        &self,
        school_id: &'a str,
        source: &'a str,
        text: &'a str,
    ) -> impl Iterator<Item = Chunk> + 'a {
        self.spans(text)
            .enumerate()
            .map(move |(ordinal, span)| make_chunk(school_id, source, ordinal, span))
    }
}

/// Concatenate spans, dropping the characters each one shares with its
/// predecessor. Inverse of [`Chunker::spans`].
pub fn reconstruct<'a, I>(spans: I) -> String
where
    I: IntoIterator<Item = Span<'a>>,
{
    let mut out = String::new();
    let mut covered = 0usize;
    for span in spans {
        let skip = covered.saturating_sub(span.start);
        out.extend(span.text.chars().skip(skip));
        covered = covered.max(span.end);
    }
    out
}

fn make_chunk(school_id: &str, source: &str, ordinal: usize, span: Span<'_>) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(span.text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}:{}#{}", school_id, source, ordinal),
        school_id: school_id.to_string(),
        source: source.to_string(),
        ordinal,
        start: span.start,
        end: span.end,
        text: span.text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkConfig::new(size, overlap).unwrap())
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(matches!(ChunkConfig::new(10, 10), Err(RagError::Config(_))));
        assert!(matches!(ChunkConfig::new(10, 11), Err(RagError::Config(_))));
        assert!(matches!(ChunkConfig::new(0, 0), Err(RagError::Config(_))));
        assert!(ChunkConfig::new(10, 9).is_ok());
        assert!(ChunkConfig::new(1, 0).is_ok());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let spans: Vec<_> = chunker(100, 20).spans("Hello, world!").collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Hello, world!");
        assert_eq!((spans[0].start, spans[0].end), (0, 13));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert_eq!(chunker(10, 2).spans("").count(), 0);
    }

    #[test]
    fn test_consecutive_spans_overlap_exactly() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let spans: Vec<_> = chunker(6, 2).spans(text).collect();
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 2);
            let tail: String = pair[0].text.chars().skip(4).collect();
            let head: String = pair[1].text.chars().take(2).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_trailing_content_kept_in_short_final_chunk() {
        let spans: Vec<_> = chunker(4, 1).spans("0123456789a").collect();
        let texts: Vec<&str> = spans.iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["0123", "3456", "6789", "9a"]);
        assert_eq!(spans.last().unwrap().end, 11);
    }

    #[test]
    fn test_no_chunk_exceeds_size() {
        let text = "Tri thức bắt đầu từ sự ngạc nhiên. ".repeat(20);
        for span in chunker(37, 11).spans(&text) {
            let n = span.text.chars().count();
            assert!(n >= 1 && n <= 37);
            assert_eq!(span.end - span.start, n);
        }
    }

    #[test]
    fn test_reconstruct_round_trip() {
        let texts = [
            "a",
            "short",
            "Làm sao để chấp nhận những điều không thể thay đổi?",
            "Ἓν οἶδα ὅτι οὐδὲν οἶδα — the unexamined life is not worth living.\n\nSecond paragraph.",
            &"x".repeat(1000),
        ];
        let configs = [(1, 0), (2, 1), (5, 0), (7, 3), (50, 49), (64, 16), (2000, 100)];
        for text in texts {
            for (size, overlap) in configs {
                let c = chunker(size, overlap);
                assert_eq!(
                    reconstruct(c.spans(text)),
                    text,
                    "size={} overlap={}",
                    size,
                    overlap
                );
            }
        }
    }

    #[test]
    fn test_spans_restartable_and_deterministic() {
        let c = chunker(5, 2);
        let text = "Alpha Beta Gamma Delta";
        let first: Vec<_> = c.spans(text).collect();
        let second: Vec<_> = c.spans(text).collect();
        assert_eq!(first, second);

        let iter = c.spans(text);
        let cloned = iter.clone();
        assert_eq!(iter.count(), cloned.count());
    }

    #[test]
    fn test_chunk_document_metadata() {
        let c = chunker(10, 2);
        let chunks: Vec<Chunk> = c
            .chunk_document("stoicism", "letters.txt", "Memento mori, amor fati.")
            .collect();
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
            assert_eq!(chunk.id, format!("stoicism:letters.txt#{}", i));
            assert_eq!(chunk.school_id, "stoicism");
            assert_eq!(chunk.hash.len(), 64);
        }
        assert_eq!(chunks[1].start, 8);
    }
}
