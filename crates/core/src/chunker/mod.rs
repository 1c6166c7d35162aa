//! Chunker (spec §4.4, C4). Dispatches by extension to one of four
//! strategies: AST (tree-sitter, `ast.rs`), heuristic code-aware
//! (`heuristic.rs`, grounded in the donor's `stubs.rs` brace/indent state
//! machine), markdown-section (`markdown.rs`), and character/line fallback
//! (`fallback.rs`).

pub mod ast;
pub mod fallback;
pub mod heuristic;
pub mod markdown;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::limits::CHUNKS_WARNING_THRESHOLD;
use crate::types::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Ast,
    Heuristic,
    Markdown,
    Fallback,
}

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx", "markdown"];

/// Languages with a tree-sitter grammar wired in (`ast::language_for_ext`).
/// Kept here too so `strategy_for_ext` doesn't need the `treesitter` feature
/// to decide routing; `ast::chunk` itself no-ops to heuristic chunking when
/// the feature is off.
const AST_EXTENSIONS: &[&str] =
    &["rs", "ts", "tsx", "py", "go", "js", "jsx", "mjs", "cjs", "c", "h", "cpp", "cc", "cxx", "hpp", "java"];

pub fn strategy_for_ext(ext: &str) -> Strategy {
    let ext = ext.to_ascii_lowercase();
    if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
        Strategy::Markdown
    } else if AST_EXTENSIONS.contains(&ext.as_str()) {
        Strategy::Ast
    } else if heuristic::language_family(&ext).is_some() {
        Strategy::Heuristic
    } else {
        Strategy::Fallback
    }
}

/// Chunk `text` (already read, already confirmed text not binary) belonging
/// to `relative_path`. Enforces `maxChunksPerFile` and logs a warning once
/// the count crosses `CHUNKS_WARNING_THRESHOLD` of the cap.
pub fn chunk_file(relative_path: &str, ext: &str, text: &str, config: &Config) -> Result<Vec<Chunk>> {
    let strategy = strategy_for_ext(ext);
    let mut chunks = match strategy {
        Strategy::Ast => ast::chunk(relative_path, ext, text, config),
        Strategy::Heuristic => heuristic::chunk(relative_path, ext, text, config),
        Strategy::Markdown => markdown::chunk(relative_path, text, config),
        Strategy::Fallback => fallback::chunk(relative_path, text, config),
    };

    if chunks.len() > config.max_chunks_per_file {
        return Err(Error::resource_limit("MAX_CHUNKS_PER_FILE")
            .with_developer(format!("{relative_path}: {} chunks exceeds cap {}", chunks.len(), config.max_chunks_per_file)));
    }
    let warn_at = (config.max_chunks_per_file as f64 * CHUNKS_WARNING_THRESHOLD) as usize;
    if chunks.len() >= warn_at {
        tracing::warn!(path = relative_path, count = chunks.len(), cap = config.max_chunks_per_file, "approaching chunk cap");
    }

    if chunks.is_empty() {
        chunks.push(Chunk::new(relative_path, 1, text.lines().count().max(1) as u32, text, crate::types::ChunkMetadata {
            kind: Some(crate::types::ChunkKind::Module),
            ..Default::default()
        }));
    }
    Ok(chunks)
}

/// Splits an oversized declaration/section body into `maxChunkSize`-bounded
/// parts, repeating `header` on each and setting `metadata.part`. Shared by
/// every strategy that can emit single chunks larger than the configured cap.
pub fn sub_chunk_body(
    relative_path: &str,
    header: &str,
    body_start_line: u32,
    body: &str,
    base_metadata: &crate::types::ChunkMetadata,
    max_chunk_size: usize,
) -> Vec<Chunk> {
    if header.len() + body.len() <= max_chunk_size {
        let end_line = body_start_line + body.lines().count() as u32;
        return vec![Chunk::new(relative_path, body_start_line, end_line.max(body_start_line), format!("{header}{body}"), base_metadata.clone())];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_start_line = body_start_line;
    let mut line_no = body_start_line;
    let avail = max_chunk_size.saturating_sub(header.len()).max(200);
    let mut part_idx: u32 = 1;

    for line in body.lines() {
        if !current.is_empty() && current.len() + line.len() + 1 > avail {
            let mut meta = base_metadata.clone();
            meta.part = Some(part_idx);
            parts.push(Chunk::new(relative_path, current_start_line, line_no.saturating_sub(1).max(current_start_line), format!("{header}{current}"), meta));
            part_idx += 1;
            current.clear();
            current_start_line = line_no;
        }
        current.push_str(line);
        current.push('\n');
        line_no += 1;
    }
    if !current.is_empty() {
        let mut meta = base_metadata.clone();
        meta.part = Some(part_idx);
        parts.push(Chunk::new(relative_path, current_start_line, line_no.saturating_sub(1).max(current_start_line), format!("{header}{current}"), meta));
    }
    parts
}
