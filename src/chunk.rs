//! Sliding-window text chunker.
//!
//! Splits document body text into [`Chunk`]s of at most `chunk_size`
//! characters, with `chunk_overlap` characters shared between
//! consecutive chunks so context survives window boundaries. Windows
//! prefer to break at whitespace; splits always land on character
//! boundaries, never inside a multi-byte sequence.
//!
//! Each chunk carries a SHA-256 hash of its text for staleness checks.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split text into overlapping windows. Returns chunks with contiguous
/// indices starting at 0; empty input yields a single empty chunk.
///
/// Callers guarantee `chunk_overlap < chunk_size` (validated at config
/// load).
pub fn chunk_text(document_id: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return vec![make_chunk(document_id, 0, "")];
    }

    let chars: Vec<char> = trimmed.chars().collect();
    // bounds[k] = byte offset of the k-th character
    let mut bounds: Vec<usize> = trimmed.char_indices().map(|(i, _)| i).collect();
    bounds.push(trimmed.len());
    let total = chars.len();

    if total <= chunk_size {
        return vec![make_chunk(document_id, 0, trimmed)];
    }

    let mut chunks = Vec::new();
    let mut index: i64 = 0;
    let mut start = 0usize;

    while start < total {
        let hard_end = (start + chunk_size).min(total);
        let end = if hard_end < total {
            find_break(&chars, start, hard_end, chunk_size)
        } else {
            hard_end
        };

        let piece = trimmed[bounds[start]..bounds[end]].trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(document_id, index, piece));
            index += 1;
        }

        if end == total {
            break;
        }
        // Step back by the overlap, but always move forward
        start = end.saturating_sub(chunk_overlap).max(start + 1);
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, trimmed));
    }
    chunks
}

/// Prefer the last whitespace in the back half of the window; fall back
/// to a hard split at the window edge.
fn find_break(chars: &[char], start: usize, hard_end: usize, chunk_size: usize) -> usize {
    let min_pos = start + chunk_size / 2;
    for pos in (min_pos.max(start + 1)..=hard_end).rev() {
        if chars[pos - 1].is_whitespace() {
            return pos;
        }
    }
    hard_end
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
