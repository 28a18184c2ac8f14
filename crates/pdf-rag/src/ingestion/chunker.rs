//! Fixed-window text chunking with character overlap

use crate::config::{overlap_chars, validate_chunking};
use crate::error::Result;
use crate::types::Chunk;

/// Splits text into windows of `chunk_size` characters where consecutive
/// windows share `overlap` characters. The last window may be shorter.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Window size in characters
    chunk_size: usize,
    /// Characters shared by consecutive windows
    overlap: usize,
}

impl TextChunker {
    /// Create a chunker; `overlap = floor(chunk_size * overlap_ratio)`
    pub fn new(chunk_size: usize, overlap_ratio: f32) -> Result<Self> {
        validate_chunking(chunk_size, overlap_ratio)?;
        Ok(Self {
            chunk_size,
            overlap: overlap_chars(chunk_size, overlap_ratio),
        })
    }

    /// Window size in characters
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap in characters
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive window starts
    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Number of chunks produced for a text of `char_len` characters
    pub fn expected_chunks(&self, char_len: usize) -> usize {
        if char_len == 0 {
            0
        } else if char_len <= self.chunk_size {
            1
        } else {
            1 + (char_len - self.chunk_size).div_ceil(self.step())
        }
    }

    /// Character ranges `[start, end)` of every window
    pub fn windows(&self, char_len: usize) -> Vec<(usize, usize)> {
        let mut windows = Vec::with_capacity(self.expected_chunks(char_len));
        let mut start = 0usize;

        while start < char_len {
            let end = (start + self.chunk_size).min(char_len);
            windows.push((start, end));
            if end == char_len {
                break;
            }
            start += self.step();
        }

        windows
    }

    /// Chunk extracted document text
    pub fn chunk(&self, document: &str, text: &str) -> Vec<Chunk> {
        // Byte offset of every char boundary, so windows never split a code point
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        self.windows(char_len)
            .into_iter()
            .enumerate()
            .map(|(position, (start, end))| {
                Chunk::new(
                    document,
                    text[boundaries[start]..boundaries[end]].to_string(),
                    position as u32,
                    start,
                    end,
                )
            })
            .collect()
    }
}
