//! Symbol/summary extractor (spec §4.14, C15). Grounded in the donor's
//! `server/src/ast.rs` (`Symbol`, `SymbolKind`, `language_for_ext`,
//! `classify_node`) for symbol classification, reusing `chunker::ast`'s node
//! walk rather than re-parsing with a second pass, plus a cyclomatic/nesting
//! complexity pass new to this system (the donor computes no complexity
//! score anywhere).

use std::time::Instant;

use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, ErrorCode, Result};
use crate::types::ChunkKind;

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSummary {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    pub is_async: bool,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    pub method_count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Complexity {
    pub cyclomatic: u32,
    pub nesting_depth: u32,
    pub decision_points: u32,
    /// 0..100, higher = simpler (spec §4.14).
    pub score_0_100: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub language: String,
    pub lines: usize,
    pub code_lines: usize,
    pub blank_lines: usize,
    pub comment_lines: usize,
    pub functions: Vec<FunctionSummary>,
    pub classes: Vec<ClassSummary>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub complexity: Complexity,
    pub size_bytes: u64,
    pub extraction_time_ms: u64,
}

const MAX_SUMMARY_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// `extract_file_summary(path)`, applying the same safety checks as chunking
/// (`validate_path`/`safe_read`, symlink rejection) and a file-size cap so a
/// pathological file cannot blow the `< 100ms` typical-file budget (spec §4.14).
pub fn extract_file_summary(project_root: &std::path::Path, rel_path: &str, config: &Config) -> Result<FileSummary> {
    let start = Instant::now();
    let bytes = crate::path_safety::safe_read(project_root, rel_path)?;
    if bytes.len() as u64 > MAX_SUMMARY_FILE_BYTES {
        return Err(Error::resource_limit("MAX_JSON_FILE_SIZE").with_developer(format!("{rel_path} too large to summarize")));
    }
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let ext = std::path::Path::new(rel_path).extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

    let lines: Vec<&str> = text.lines().collect();
    let (code_lines, blank_lines, comment_lines) = count_line_kinds(&lines, &ext);

    let chunks = crate::chunker::chunk_file(rel_path, &ext, &text, config)
        .map_err(|e| Error::new(ErrorCode::ExtractionFailed, "failed to parse file for summary").with_developer(e.to_string()))?;

    let mut functions = Vec::new();
    let mut classes = Vec::new();
    for c in &chunks {
        match c.metadata.kind {
            Some(ChunkKind::Function) | Some(ChunkKind::Method) => {
                functions.push(FunctionSummary {
                    name: c.metadata.name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
                    start_line: c.start_line,
                    end_line: c.end_line,
                    is_async: c.metadata.is_async,
                    is_exported: c.metadata.is_exported,
                });
            }
            Some(ChunkKind::Class) | Some(ChunkKind::Struct) | Some(ChunkKind::Interface) | Some(ChunkKind::Trait) => {
                let name = c.metadata.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
                let method_count = chunks
                    .iter()
                    .filter(|m| matches!(m.metadata.kind, Some(ChunkKind::Method)) && m.metadata.parent.as_deref() == Some(name.as_str()))
                    .count();
                classes.push(ClassSummary { name, start_line: c.start_line, end_line: c.end_line, method_count });
            }
            _ => {}
        }
    }

    let imports = extract_imports(&lines, &ext);
    let exports = extract_exports(&lines, &ext);
    let complexity = compute_complexity(&text, &ext, functions.len());

    Ok(FileSummary {
        path: rel_path.to_string(),
        language: language_name(&ext),
        lines: lines.len(),
        code_lines,
        blank_lines,
        comment_lines,
        functions,
        classes,
        imports,
        exports,
        complexity,
        size_bytes: bytes.len() as u64,
        extraction_time_ms: start.elapsed().as_millis() as u64,
    })
}

fn language_name(ext: &str) -> String {
    match ext {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" | "pyi" => "python",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "md" | "mdx" => "markdown",
        other => other,
    }
    .to_string()
}

fn is_comment_line(line: &str, ext: &str) -> bool {
    let t = line.trim_start();
    if ext == "py" || ext == "pyi" {
        t.starts_with('#')
    } else {
        t.starts_with("//") || t.starts_with('*') || t.starts_with("/*")
    }
}

fn count_line_kinds(lines: &[&str], ext: &str) -> (usize, usize, usize) {
    let mut code = 0;
    let mut blank = 0;
    let mut comment = 0;
    for line in lines {
        if line.trim().is_empty() {
            blank += 1;
        } else if is_comment_line(line, ext) {
            comment += 1;
        } else {
            code += 1;
        }
    }
    (code, blank, comment)
}

fn extract_imports(lines: &[&str], ext: &str) -> Vec<String> {
    let prefixes: &[&str] = match ext {
        "rs" => &["use "],
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => &["import "],
        "py" | "pyi" => &["import ", "from "],
        "go" => &["import "],
        "java" => &["import "],
        _ => &[],
    };
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| prefixes.iter().any(|p| l.starts_with(p)))
        .map(|l| l.to_string())
        .collect()
}

fn extract_exports(lines: &[&str], ext: &str) -> Vec<String> {
    match ext {
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| l.starts_with("export "))
            .map(|l| l.to_string())
            .collect(),
        "rs" => lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| l.starts_with("pub fn ") || l.starts_with("pub struct ") || l.starts_with("pub enum ") || l.starts_with("pub trait "))
            .map(|l| l.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

const DECISION_KEYWORDS: &[&str] =
    &["if ", "else if", "for ", "while ", "case ", "match ", "catch ", "except ", "elif ", "&&", "||", "?"];

/// Cyclomatic complexity approximated by counting decision-point keywords
/// (`if`/`for`/`while`/`match`/boolean operators) — a lightweight proxy, not a
/// true CFG-based count, matching the per-file budget in spec §4.14.
fn compute_complexity(text: &str, _ext: &str, function_count: usize) -> Complexity {
    let mut decision_points = 0u32;
    let mut max_depth = 0u32;
    let mut depth = 0i32;

    for line in text.lines() {
        for kw in DECISION_KEYWORDS {
            decision_points += line.matches(kw).count() as u32;
        }
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    max_depth = max_depth.max(depth as u32);
                }
                '}' => depth = (depth - 1).max(0),
                _ => {}
            }
        }
    }

    let cyclomatic = decision_points + 1;
    let penalty = cyclomatic.saturating_mul(2) + max_depth.saturating_mul(3) + function_count as u32;
    let score_0_100 = 100u32.saturating_sub(penalty).max(0).min(100);

    Complexity { cyclomatic, nesting_depth: max_depth, decision_points, score_0_100 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_summary_counts_function_and_complexity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.rs"),
            "use std::fmt;\n\npub fn foo(x: i32) -> i32 {\n    if x > 0 {\n        x\n    } else {\n        -x\n    }\n}\n",
        )
        .unwrap();

        let config = Config::default();
        let summary = extract_file_summary(dir.path(), "a.rs", &config).unwrap();
        assert_eq!(summary.functions.len(), 1);
        assert_eq!(summary.imports, vec!["use std::fmt;"]);
        assert!(summary.complexity.cyclomatic >= 1);
        assert_eq!(summary.language, "rust");
    }

    #[test]
    fn rejects_symlinked_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.rs"), "fn x() {}").unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(dir.path().join("real.rs"), dir.path().join("link.rs")).unwrap();
            let config = Config::default();
            let err = extract_file_summary(dir.path(), "link.rs", &config).unwrap_err();
            assert_eq!(err.code, crate::error::ErrorCode::SymlinkNotAllowed);
        }
    }
}
