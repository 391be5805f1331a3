use crate::error::ChunkingError;
use crate::models::{Chunk, HeadingMarker};
use serde::{Deserialize, Serialize};

/// Sliding window settings, all in bytes of extracted text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub length: usize,
    pub overlap: usize,
    /// How far before `length` a window may end to land on a natural boundary.
    pub boundary_tolerance: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            length: 500,
            overlap: 50,
            boundary_tolerance: 100,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.length == 0 {
            return Err(ChunkingError::ZeroLength);
        }
        if self.overlap >= self.length {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.overlap,
                length: self.length,
            });
        }
        let window = self.length - self.overlap;
        if self.boundary_tolerance >= window {
            return Err(ChunkingError::ToleranceTooLarge {
                tolerance: self.boundary_tolerance,
                window,
            });
        }
        Ok(())
    }
}

const SENTENCE_ENDS: [&str; 8] = [". ", "? ", "! ", "; ", ".\n", "?\n", "!\n", ";\n"];

/// Splits `text` into overlapping passages labelled with the nearest
/// preceding heading. `headings` must be in document order.
pub fn chunk_document(
    text: &str,
    headings: &[HeadingMarker],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ChunkingError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end = window_end(text, headings, start, config);
        push_trimmed(&mut chunks, text, headings, start, end);

        if end >= text.len() || text[end..].trim().is_empty() {
            break;
        }
        start = next_start(text, headings, start, end, config.overlap);
    }

    Ok(chunks)
}

fn window_end(text: &str, headings: &[HeadingMarker], start: usize, config: &ChunkingConfig) -> usize {
    let target = start + config.length;

    // a window never runs into the next section, short tails included
    if let Some(heading) = headings
        .iter()
        .find(|heading| heading.start > start && heading.start <= target.min(text.len()))
    {
        return heading.start;
    }
    if target >= text.len() {
        return text.len();
    }

    let hi = floor_boundary(text, target);
    let lo = ceil_boundary(
        text,
        target.saturating_sub(config.boundary_tolerance).max(start + 1),
    );

    let mut end = preferred_break(text, lo, hi).unwrap_or(hi);
    if end <= start {
        end = ceil_boundary(text, start + 1);
    }

    if let Some(heading) = headings
        .iter()
        .find(|heading| heading.start < end && end < heading.end)
    {
        end = if heading.start > start {
            heading.start
        } else {
            heading.end
        };
    }

    end
}

fn preferred_break(text: &str, lo: usize, hi: usize) -> Option<usize> {
    if lo > hi {
        return None;
    }

    let window = &text[lo..hi];
    if let Some(position) = window.rfind("\n\n") {
        return Some(lo + position + 2);
    }

    if let Some(position) = SENTENCE_ENDS
        .iter()
        .filter_map(|separator| window.rfind(separator))
        .max()
    {
        return Some(lo + position + 1);
    }

    window
        .rfind(char::is_whitespace)
        .map(|position| lo + position)
}

fn next_start(
    text: &str,
    headings: &[HeadingMarker],
    start: usize,
    end: usize,
    overlap: usize,
) -> usize {
    let mut next = ceil_boundary(text, end.saturating_sub(overlap));

    if let Some(heading) = headings
        .iter()
        .rev()
        .find(|heading| heading.start >= next && heading.start <= end)
    {
        // overlap stops at a section boundary
        next = heading.start;
    } else if let Some(heading) = headings
        .iter()
        .find(|heading| heading.start < next && next < heading.end)
    {
        next = heading.end.min(end);
    }

    if next <= start {
        end
    } else {
        next
    }
}

fn push_trimmed(
    chunks: &mut Vec<Chunk>,
    text: &str,
    headings: &[HeadingMarker],
    start: usize,
    end: usize,
) {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }

    let chunk_start = start + (slice.len() - slice.trim_start().len());
    let position = chunks.len();
    let section_label = headings
        .iter()
        .take_while(|heading| heading.start <= chunk_start)
        .last()
        .map(|heading| heading.label.clone());

    chunks.push(Chunk {
        chunk_id: Chunk::id_for_position(position),
        position,
        start: chunk_start,
        end: chunk_start + trimmed.len(),
        text: trimmed.to_string(),
        section_label,
    });
}

fn floor_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
