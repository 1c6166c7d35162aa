//! Character/line fallback chunking (spec §4.4.4, C4): fixed-size overlapping
//! windows, used for any extension none of the other three strategies claim.

use crate::config::Config;
use crate::types::{Chunk, ChunkMetadata};

pub fn chunk(relative_path: &str, text: &str, config: &Config) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return vec![Chunk::new(relative_path, 1, 1, "", ChunkMetadata::default())];
    }

    // Approximate a character budget in terms of line count using the
    // average line length seen so far, recomputed window by window.
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < lines.len() {
        let mut end = start;
        let mut size = 0usize;
        while end < lines.len() && (size == 0 || size + lines[end].len() + 1 <= config.chunk_size) {
            size += lines[end].len() + 1;
            end += 1;
        }
        if end == start {
            end = start + 1;
        }
        let text_slice = lines[start..end].join("\n");
        chunks.push(Chunk::new(relative_path, start as u32 + 1, end as u32, text_slice, ChunkMetadata::default()));

        if end >= lines.len() {
            break;
        }
        // Step back by an overlap measured in lines, proportional to the
        // configured character overlap relative to this window's average line length.
        let avg_line_len = (size / (end - start).max(1)).max(1);
        let overlap_lines = (config.chunk_overlap / avg_line_len).min(end - start - 1);
        start = end.saturating_sub(overlap_lines).max(start + 1);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_cover_entire_input() {
        let cfg = Config { chunk_size: 40, chunk_overlap: 10, ..Config::default() };
        let text = (0..50).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk("f.bin.txt", &text, &cfg);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.last().unwrap().end_line as usize, text.lines().count());
    }

    #[test]
    fn empty_input_still_produces_one_chunk() {
        let cfg = Config::default();
        let chunks = chunk("empty.txt", "", &cfg);
        assert_eq!(chunks.len(), 1);
    }
}
