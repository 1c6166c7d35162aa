//! Markdown-section chunking strategy (spec §4.4.3, C4). New — the donor has
//! no markdown-aware chunker to ground this on, so it is authored fresh in
//! the donor's general chunking idiom (line-scanning state machine, same
//! shape as `heuristic.rs`/`stubs.rs`'s brace scanner): parse ATX/Setext
//! headers, strip YAML frontmatter, treat fenced code blocks as atomic, one
//! chunk per section prefixed with its header breadcrumb.

use crate::config::Config;
use crate::types::{Chunk, ChunkKind, ChunkMetadata};

struct Section {
    level: u8,
    title: String,
    start_line: usize,
    body_lines: Vec<String>,
}

pub fn chunk(relative_path: &str, text: &str, config: &Config) -> Vec<Chunk> {
    let text = strip_frontmatter(text);
    let lines: Vec<&str> = text.lines().collect();

    let mut sections: Vec<Section> = Vec::new();
    let mut in_fence = false;
    let mut fence_marker = "";
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();

        if !in_fence && (trimmed.starts_with("```") || trimmed.starts_with("~~~")) {
            in_fence = true;
            fence_marker = if trimmed.starts_with("```") { "```" } else { "~~~" };
            push_line(&mut sections, line, i);
            i += 1;
            continue;
        }
        if in_fence {
            if trimmed.starts_with(fence_marker) {
                in_fence = false;
            }
            push_line(&mut sections, line, i);
            i += 1;
            continue;
        }

        if let Some((level, title)) = atx_header(line) {
            sections.push(Section { level, title, start_line: i, body_lines: Vec::new() });
            i += 1;
            continue;
        }

        // Setext: a non-empty line followed by a line of all `=` (h1) or `-` (h2).
        if i + 1 < lines.len() && !trimmed.is_empty() {
            let next = lines[i + 1].trim();
            if !next.is_empty() && next.chars().all(|c| c == '=') {
                sections.push(Section { level: 1, title: trimmed.to_string(), start_line: i, body_lines: Vec::new() });
                i += 2;
                continue;
            }
            if !next.is_empty() && next.chars().all(|c| c == '-') && next.len() >= 2 {
                sections.push(Section { level: 2, title: trimmed.to_string(), start_line: i, body_lines: Vec::new() });
                i += 2;
                continue;
            }
        }

        push_line(&mut sections, line, i);
        i += 1;
    }

    if sections.is_empty() {
        return super::fallback::chunk(relative_path, &text, config);
    }

    let mut chunks = Vec::new();
    let mut breadcrumb_stack: Vec<(u8, String)> = Vec::new();

    for (idx, section) in sections.iter().enumerate() {
        while let Some((lvl, _)) = breadcrumb_stack.last() {
            if *lvl >= section.level {
                breadcrumb_stack.pop();
            } else {
                break;
            }
        }
        let breadcrumb: Vec<String> = breadcrumb_stack.iter().map(|(_, t)| t.clone()).collect();
        breadcrumb_stack.push((section.level, section.title.clone()));

        let header_line = "#".repeat(section.level as usize) + " " + &section.title;
        let prefix = if breadcrumb.is_empty() {
            format!("{header_line}\n")
        } else {
            format!("[{}]\n{header_line}\n", breadcrumb.join(" > "))
        };

        let body = section.body_lines.join("\n");
        let end_line = sections.get(idx + 1).map(|s| s.start_line).unwrap_or(lines.len());

        let metadata = ChunkMetadata { kind: Some(ChunkKind::MarkdownSection), name: Some(section.title.clone()), header_path: breadcrumb.clone(), ..Default::default() };

        if prefix.len() + body.len() <= config.chunk_size {
            chunks.push(Chunk::new(relative_path, section.start_line as u32 + 1, end_line as u32, format!("{prefix}{body}"), metadata));
        } else {
            // Sub-chunk long sections by paragraph, repeating the breadcrumb
            // and marking `(continued)`.
            let paragraphs = split_paragraphs(&section.body_lines);
            let mut part = 0u32;
            let mut buf = String::new();
            let mut buf_start = section.start_line;
            for para in paragraphs {
                if !buf.is_empty() && prefix.len() + buf.len() + para.len() > config.chunk_size {
                    part += 1;
                    let title = if part == 1 { header_line.clone() } else { format!("{header_line} (continued)") };
                    let p = if breadcrumb.is_empty() { format!("{title}\n") } else { format!("[{}]\n{title}\n", breadcrumb.join(" > ")) };
                    let mut m = metadata.clone();
                    m.part = Some(part);
                    chunks.push(Chunk::new(relative_path, buf_start as u32 + 1, (buf_start + buf.lines().count()) as u32, format!("{p}{buf}"), m));
                    buf.clear();
                    buf_start += buf.lines().count();
                }
                buf.push_str(&para);
                buf.push_str("\n\n");
            }
            if !buf.trim().is_empty() {
                part += 1;
                let title = if part == 1 { header_line.clone() } else { format!("{header_line} (continued)") };
                let p = if breadcrumb.is_empty() { format!("{title}\n") } else { format!("[{}]\n{title}\n", breadcrumb.join(" > ")) };
                let mut m = metadata.clone();
                m.part = Some(part);
                chunks.push(Chunk::new(relative_path, buf_start as u32 + 1, end_line as u32, format!("{p}{buf}"), m));
            }
        }
    }

    chunks
}

fn push_line(sections: &mut [Section], line: &str, _idx: usize) {
    if let Some(last) = sections.last_mut() {
        last.body_lines.push(line.to_string());
    }
}

fn atx_header(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = trimmed[level..].trim();
    if level < trimmed.len() && !trimmed.as_bytes().get(level).map(|b| b.is_ascii_whitespace()).unwrap_or(true) {
        return None; // e.g. "#tag" isn't a header
    }
    Some((level as u8, rest.trim_end_matches('#').trim().to_string()))
}

fn strip_frontmatter(text: &str) -> String {
    if let Some(rest) = text.strip_prefix("---\n") {
        if let Some(end) = rest.find("\n---\n") {
            return rest[end + 5..].to_string();
        }
        if let Some(end) = rest.find("\n---") {
            if rest[end + 4..].trim().is_empty() {
                return String::new();
            }
        }
    }
    text.to_string()
}

fn split_paragraphs(lines: &[String]) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut buf = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            if !buf.is_empty() {
                paragraphs.push(buf.join("\n"));
                buf.clear();
            }
        } else {
            buf.push(line.clone());
        }
    }
    if !buf.is_empty() {
        paragraphs.push(buf.join("\n"));
    }
    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_by_atx_headers_with_breadcrumb() {
        let text = "# A\n\nintro\n\n## B\n\nbody b\n\n## C\n\nbody c\n";
        let cfg = Config::default();
        let chunks = chunk("doc.md", text, &cfg);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].metadata.header_path, vec!["A".to_string()]);
        assert!(chunks[1].text.contains("[A]"));
    }

    #[test]
    fn strips_yaml_frontmatter() {
        let text = "---\ntitle: x\n---\n# Heading\nbody\n";
        let cfg = Config::default();
        let chunks = chunk("doc.md", text, &cfg);
        assert!(!chunks[0].text.contains("title: x"));
    }

    #[test]
    fn fenced_code_block_is_atomic() {
        let text = "# A\n\n```rust\nfn f() {\n## not a header\n}\n```\n";
        let cfg = Config::default();
        let chunks = chunk("doc.md", text, &cfg);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("## not a header"));
    }
}
