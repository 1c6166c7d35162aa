//! Heuristic code-aware chunking strategy (spec §4.4.2, C4). Grounded in the
//! donor's `server/src/stubs.rs` (`classify_language`, `stub_brace_based`,
//! `is_structural_scope`): the same language-family dispatch and brace-depth
//! scanning, repurposed from "collapse bodies into stubs" to "cut chunk
//! boundaries at declaration openers, carrying `chunkOverlap` lines forward".

use crate::config::Config;
use crate::types::{Chunk, ChunkKind, ChunkMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFamily {
    CStyle,
    Python,
    Ruby,
    Shell,
    Ini,
}

/// ~20+ languages recognized for heuristic chunking via brace/indent family,
/// beyond the ones handled by the AST strategy.
pub fn language_family(ext: &str) -> Option<LanguageFamily> {
    match ext {
        "kt" | "kts" | "swift" | "scala" | "cs" | "php" | "dart" | "groovy" | "m" | "mm" | "hlsl" | "glsl"
        | "wgsl" | "usf" | "ush" | "vert" | "frag" | "comp" | "proto" | "graphql" | "zig" | "sol" => {
            Some(LanguageFamily::CStyle)
        }
        "rb" => Some(LanguageFamily::Ruby),
        "sh" | "bash" | "zsh" | "fish" => Some(LanguageFamily::Shell),
        "ini" | "cfg" | "conf" | "properties" => Some(LanguageFamily::Ini),
        _ => None,
    }
}

const STRUCTURAL_KEYWORDS: &[&str] = &[
    "class ", "struct ", "interface ", "trait ", "enum ", "namespace ", "impl ", "module ", "fn ", "func ",
    "function ", "def ", "public ", "private ", "protected ", "static ", "async ",
];

fn looks_like_declaration(line: &str) -> bool {
    let t = line.trim_start();
    STRUCTURAL_KEYWORDS.iter().any(|kw| t.starts_with(kw))
        || (t.contains('(') && (t.ends_with('{') || t.ends_with(')')) && !t.starts_with('}') && !t.starts_with("//"))
}

fn declaration_name(line: &str) -> Option<String> {
    let t = line.trim();
    for kw in ["class ", "struct ", "interface ", "trait ", "enum ", "fn ", "func ", "function ", "def "] {
        if let Some(rest) = t.strip_prefix(kw) {
            let name: String = rest.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

fn chunk_kind_for_line(line: &str) -> ChunkKind {
    let t = line.trim_start();
    if t.starts_with("class ") {
        ChunkKind::Class
    } else if t.starts_with("struct ") {
        ChunkKind::Struct
    } else if t.starts_with("interface ") {
        ChunkKind::Interface
    } else if t.starts_with("trait ") {
        ChunkKind::Trait
    } else if t.starts_with("enum ") {
        ChunkKind::Enum
    } else {
        ChunkKind::Function
    }
}

fn brace_delta(line: &str) -> i32 {
    let mut delta = 0i32;
    let mut in_string = false;
    let mut in_char = false;
    let mut escape = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string || in_char => escape = true,
            '"' if !in_char => in_string = !in_string,
            '\'' if !in_string => in_char = !in_char,
            '{' if !in_string && !in_char => delta += 1,
            '}' if !in_string && !in_char => delta -= 1,
            '/' if !in_string && !in_char && chars.peek() == Some(&'/') => break,
            _ => {}
        }
    }
    delta
}

/// Splits `text` at recognized declaration boundaries for brace-delimited
/// languages; indent-delimited families (Python handled by `ast.rs` via
/// tree-sitter, Ruby/Shell/ini here) fall back to simple blank-line-separated
/// blocks. Each chunk stays under `chunkSize`; adjacent chunks share
/// `chunkOverlap` trailing/leading lines.
pub fn chunk(relative_path: &str, ext: &str, text: &str, config: &Config) -> Vec<Chunk> {
    let family = language_family(ext);
    match family {
        Some(LanguageFamily::Ini) => chunk_flat_blocks(relative_path, text, config, "#"),
        Some(LanguageFamily::Shell) => chunk_flat_blocks(relative_path, text, config, "#"),
        Some(LanguageFamily::Ruby) => chunk_brace_or_indent(relative_path, text, config),
        _ => chunk_brace_or_indent(relative_path, text, config),
    }
}

fn chunk_brace_or_indent(relative_path: &str, text: &str, config: &Config) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut i = 0usize;
    let mut pending_start: Option<usize> = None;
    let mut depth = 0i32;
    let mut body_start_depth = 0i32;
    let mut buf = String::new();
    let mut buf_start = 0usize;
    let mut current_name: Option<String> = None;
    let mut current_kind = ChunkKind::Fallback;

    while i < lines.len() {
        let line = lines[i];
        if pending_start.is_none() && looks_like_declaration(line) {
            pending_start = Some(i);
            body_start_depth = depth;
            current_name = declaration_name(line);
            current_kind = chunk_kind_for_line(line);
            buf_start = i;
            buf.clear();
        }
        if pending_start.is_some() {
            buf.push_str(line);
            buf.push('\n');
        }
        depth += brace_delta(line);

        let closed = pending_start.is_some() && depth <= body_start_depth && (line.trim() == "}" || line.trim_end().ends_with("};") || depth == body_start_depth && i > buf_start);
        let truly_closed = pending_start.is_some() && depth <= body_start_depth && i > buf_start && line.contains('}');

        if truly_closed || (pending_start.is_some() && i == lines.len() - 1) {
            let start_line = buf_start as u32 + 1;
            let end_line = i as u32 + 1;
            let metadata = ChunkMetadata { kind: Some(current_kind), name: current_name.clone(), ..Default::default() };
            chunks.extend(super::sub_chunk_body(relative_path, "", start_line, &buf, &metadata, config.chunk_size));
            pending_start = None;
            buf.clear();
        }
        let _ = closed;
        i += 1;
    }

    if chunks.is_empty() {
        return super::fallback::chunk(relative_path, text, config);
    }
    apply_overlap(relative_path, &lines, chunks, config)
}

/// Flat (non-brace) families: split on blank-line-separated blocks, or by
/// `#`/comment-prefixed section markers for config-style formats.
fn chunk_flat_blocks(relative_path: &str, text: &str, config: &Config, _comment_prefix: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut start = 0usize;
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() && !buf.trim().is_empty() {
            chunks.push(Chunk::new(relative_path, start as u32 + 1, i as u32, buf.clone(), ChunkMetadata::default()));
            buf.clear();
            start = i + 1;
        } else {
            if buf.is_empty() {
                start = i;
            }
            buf.push_str(line);
            buf.push('\n');
        }
    }
    if !buf.trim().is_empty() {
        chunks.push(Chunk::new(relative_path, start as u32 + 1, lines.len() as u32, buf, ChunkMetadata::default()));
    }
    if chunks.is_empty() {
        return super::fallback::chunk(relative_path, text, config);
    }
    chunks
}

/// Carries `chunkOverlap` trailing lines of each chunk into the text of the
/// next, so boundary context (e.g. the closing brace and one statement
/// before it) survives retrieval at a cut point.
fn apply_overlap(_relative_path: &str, lines: &[&str], mut chunks: Vec<Chunk>, config: &Config) -> Vec<Chunk> {
    if config.chunk_overlap == 0 || chunks.len() < 2 {
        return chunks;
    }
    for idx in 1..chunks.len() {
        let prev_end = chunks[idx - 1].end_line as usize;
        let overlap_start = prev_end.saturating_sub(config.chunk_overlap).max(1);
        let overlap_text: String = lines
            .get(overlap_start.saturating_sub(1)..prev_end.min(lines.len()))
            .unwrap_or(&[])
            .join("\n");
        if !overlap_text.is_empty() {
            chunks[idx].text = format!("{overlap_text}\n{}", chunks[idx].text);
            chunks[idx].content_hash = crate::hashing::chunk_content_hash(&chunks[idx].text);
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_c_style_declarations() {
        let src = "class Foo {\n  void bar() {\n    doStuff();\n  }\n}\n\nclass Baz {\n  int x;\n}\n";
        let cfg = Config::default();
        let chunks = chunk("a.cs", "cs", src, &cfg);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().any(|c| c.metadata.name.as_deref() == Some("Foo")));
    }

    #[test]
    fn falls_back_when_no_boundaries_found() {
        let cfg = Config::default();
        let chunks = chunk("a.ini", "ini", "[section]\nkey=value\n", &cfg);
        assert!(!chunks.is_empty());
    }
}
