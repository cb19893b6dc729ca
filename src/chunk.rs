//! Sliding-window text chunker.
//!
//! Splits extracted document text into fixed-size windows that overlap their
//! predecessor by a configurable number of characters. Window boundaries are
//! counted in Unicode scalar values, so multi-byte UTF-8 text is never cut
//! inside a code point.

use thiserror::Error;

/// Default window length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between consecutive windows, in characters.
pub const DEFAULT_OVERLAP: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunking configuration: overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    InvalidConfiguration { chunk_size: usize, overlap: usize },
}

/// Check the `0 <= overlap < chunk_size` precondition.
pub fn validate(chunk_size: usize, overlap: usize) -> Result<(), ChunkError> {
    if overlap >= chunk_size {
        return Err(ChunkError::InvalidConfiguration {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

/// Split text into windows `[start, start + chunk_size)`, advancing `start`
/// by `chunk_size - overlap` until a window reaches the end of the text.
///
/// The last window may be shorter than `chunk_size`. Empty text yields no
/// chunks.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    validate(chunk_size, overlap)?;

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;
    let step = chunk_size - overlap;

    let mut chunks = Vec::with_capacity(expected_chunk_count(char_len, chunk_size, overlap));
    let mut start = 0;
    while start < char_len {
        let end = (start + chunk_size).min(char_len);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        if end == char_len {
            // Any later window would lie entirely inside this one's tail.
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Number of chunks [`chunk_text`] produces for a text of `len` characters:
/// `ceil(max(len - overlap, 0) / (chunk_size - overlap))`, or 0 for empty text.
pub fn expected_chunk_count(len: usize, chunk_size: usize, overlap: usize) -> usize {
    if len == 0 || overlap >= chunk_size {
        return 0;
    }
    let step = chunk_size - overlap;
    // A non-empty text shorter than the overlap still produces one window.
    len.saturating_sub(overlap).div_ceil(step).max(1)
}
