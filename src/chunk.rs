//! Overlapping sliding-window text chunker.
//!
//! Splits long text into windows of at most `chunk_size` characters with a
//! fixed `overlap` between consecutive windows. The window end prefers to
//! land after a paragraph, newline, sentence, or word boundary before
//! falling back to a hard character cut.
//!
//! Determinism is load-bearing: the same text and the same (size, overlap)
//! always yield the identical chunk sequence, because chunks feed both the
//! retrieval stage and persisted-cache equality checks. Because each window
//! starts exactly `overlap` characters before the previous window's end,
//! stripping the overlap from every chunk after the first reconstructs the
//! input with no characters dropped.

/// Boundary candidates, best first. The cut lands after the separator so
/// it stays with the left chunk.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// `overlap` must be smaller than `chunk_size` (enforced at config load).
/// Sizes are measured in characters, not bytes; cuts never split a UTF-8
/// code point. Empty input yields no chunks.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size - 1);

    // Byte offset of every char, plus the end sentinel, so char positions
    // map to byte positions in O(1).
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    let total_chars = offsets.len() - 1;

    if total_chars <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + chunk_size).min(total_chars);
        let end = if hard_end < total_chars {
            pick_boundary(text, &offsets, start, hard_end, overlap)
        } else {
            total_chars
        };

        chunks.push(text[offsets[start]..offsets[end]].to_string());

        if end == total_chars {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Choose the cut position for the window `[start, hard_end)`, in char
/// positions. Scans separators in preference order and takes the latest
/// occurrence whose cut still makes progress (strictly past the region the
/// next window will re-cover as overlap). Falls back to the hard cut.
fn pick_boundary(
    text: &str,
    offsets: &[usize],
    start: usize,
    hard_end: usize,
    overlap: usize,
) -> usize {
    let window = &text[offsets[start]..offsets[hard_end]];
    let min_end = start + overlap + 1;

    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let cut_byte = offsets[start] + pos + sep.len();
            // Separators are ASCII, so cut_byte is a char boundary.
            if let Ok(cut_char) = offsets.binary_search(&cut_byte) {
                if cut_char >= min_end && cut_char <= hard_end {
                    return cut_char;
                }
            }
        }
    }

    hard_end
}
