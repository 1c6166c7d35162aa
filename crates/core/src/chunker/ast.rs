//! AST chunking strategy (spec §4.4.1, C4). Grounded in the donor's
//! `server/src/ast.rs` tree-sitter symbol walk (`language_for_ext`,
//! `classify_node`, `extract_name`, `extract_signature`): the same grammar
//! dispatch and node classification, but emitting one `Chunk` per top-level
//! declaration (plus one per method nested under a class/impl) instead of a
//! lightweight `Symbol` index. `symbols.rs` (C15) reuses the same
//! classification to build its summary without re-parsing.

use crate::config::Config;
use crate::types::{Chunk, ChunkKind, ChunkMetadata};

#[cfg(feature = "treesitter")]
pub fn language_for_ext(ext: &str) -> Option<tree_sitter::Language> {
    match ext {
        "rs" => Some(tree_sitter_rust::LANGUAGE.into()),
        "ts" | "tsx" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "js" | "jsx" | "mjs" | "cjs" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "py" | "pyi" => Some(tree_sitter_python::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "c" | "h" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(tree_sitter_cpp::LANGUAGE.into()),
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        _ => None,
    }
}

#[cfg(not(feature = "treesitter"))]
pub fn language_for_ext(_ext: &str) -> Option<()> {
    None
}

fn classify_node(kind: &str) -> Option<(ChunkKind, bool)> {
    // (kind, is_method_like) — method-like nodes get `parent` set to the
    // enclosing class/impl/struct name when chunked.
    match kind {
        "function_item" | "function_declaration" | "function_definition" => Some((ChunkKind::Function, false)),
        "struct_item" | "struct_specifier" => Some((ChunkKind::Struct, false)),
        "enum_item" | "enum_specifier" | "enum_declaration" => Some((ChunkKind::Enum, false)),
        "trait_item" => Some((ChunkKind::Trait, false)),
        "impl_item" => Some((ChunkKind::Class, false)),
        "class_declaration" | "class_definition" | "class_specifier" => Some((ChunkKind::Class, false)),
        "interface_declaration" => Some((ChunkKind::Interface, false)),
        "method_definition" | "method_declaration" => Some((ChunkKind::Method, true)),
        _ => None,
    }
}

fn is_python(ext: &str) -> bool {
    matches!(ext, "py" | "pyi")
}
fn is_c_cpp(ext: &str) -> bool {
    matches!(ext, "c" | "h" | "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx")
}
fn is_rust(ext: &str) -> bool {
    ext == "rs"
}
fn is_go(ext: &str) -> bool {
    ext == "go"
}

#[cfg(feature = "treesitter")]
fn extract_name(node: &tree_sitter::Node, source: &[u8], ext: &str) -> Option<String> {
    for field in ["name", "type"] {
        if let Some(name_node) = node.child_by_field_name(field) {
            if let Ok(text) = name_node.utf8_text(source) {
                let name = text.trim();
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }
    }
    if node.kind() == "impl_item" && is_rust(ext) {
        if let Some(type_node) = node.child_by_field_name("type") {
            if let Ok(text) = type_node.utf8_text(source) {
                return Some(text.trim().to_string());
            }
        }
    }
    if node.kind() == "type_spec" && is_go(ext) {
        if let Some(child) = node.named_child(0) {
            if let Ok(text) = child.utf8_text(source) {
                return Some(text.trim().to_string());
            }
        }
    }
    if (node.kind() == "function_definition" && is_c_cpp(ext)) || node.kind() == "function_item" {
        if let Some(decl) = node.child_by_field_name("declarator") {
            if let Some(name_node) = decl.child_by_field_name("declarator") {
                if let Ok(text) = name_node.utf8_text(source) {
                    return Some(text.trim().to_string());
                }
            }
            if let Ok(text) = decl.utf8_text(source) {
                let s = text.trim();
                if let Some(paren) = s.find('(') {
                    return Some(s[..paren].trim().to_string());
                }
                return Some(s.to_string());
            }
        }
    }
    None
}

#[cfg(feature = "treesitter")]
fn extract_signature(node: &tree_sitter::Node, source: &[u8], ext: &str) -> String {
    let text = node.utf8_text(source).unwrap_or("");
    let first_line = text.lines().next().unwrap_or("").trim();
    let sig = if is_python(ext) {
        match first_line.find(':') {
            Some(colon) => &first_line[..=colon],
            None => first_line,
        }
    } else if let Some(brace) = first_line.find('{') {
        first_line[..brace].trim()
    } else {
        first_line
    };
    if sig.len() > 200 {
        let mut cut = 200;
        while cut > 0 && !sig.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &sig[..cut])
    } else {
        sig.to_string()
    }
}

/// Leading line(s) of `///`/`//!`/`#`/`"""` comment directly above `start_line`
/// (1-based), used as the chunk's docstring.
fn leading_docstring(lines: &[&str], start_line_idx: usize, ext: &str) -> Option<String> {
    if start_line_idx == 0 {
        return None;
    }
    let is_doc_line = |l: &str| {
        let t = l.trim_start();
        if is_python(ext) {
            t.starts_with('#')
        } else {
            t.starts_with("///") || t.starts_with("//!") || t.starts_with("/**") || t.starts_with('*') || t.starts_with("//")
        }
    };
    let mut i = start_line_idx;
    let mut collected = Vec::new();
    while i > 0 && is_doc_line(lines[i - 1]) {
        collected.push(lines[i - 1].trim().to_string());
        i -= 1;
    }
    if collected.is_empty() {
        None
    } else {
        collected.reverse();
        Some(collected.join("\n"))
    }
}

#[cfg(feature = "treesitter")]
pub fn chunk(relative_path: &str, ext: &str, text: &str, config: &Config) -> Vec<Chunk> {
    use tree_sitter::Parser;

    let Some(language) = language_for_ext(ext) else {
        return super::heuristic::chunk(relative_path, ext, text, config);
    };
    let mut parser = Parser::new();
    if parser.set_language(&language).is_err() {
        return super::heuristic::chunk(relative_path, ext, text, config);
    }
    let Some(tree) = parser.parse(text, None) else {
        return super::heuristic::chunk(relative_path, ext, text, config);
    };

    let source = text.as_bytes();
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut cursor = tree.walk();
    walk_and_emit(&mut cursor, source, &lines, ext, relative_path, None, config, &mut chunks);

    if chunks.is_empty() {
        chunks.push(module_chunk(relative_path, text));
    }
    chunks
}

#[cfg(feature = "treesitter")]
#[allow(clippy::too_many_arguments)]
fn walk_and_emit(
    cursor: &mut tree_sitter::TreeCursor,
    source: &[u8],
    lines: &[&str],
    ext: &str,
    relative_path: &str,
    parent_name: Option<&str>,
    config: &Config,
    out: &mut Vec<Chunk>,
) {
    loop {
        let node = cursor.node();
        if let Some((kind, _is_method)) = classify_node(node.kind()) {
            let name = extract_name(&node, source, ext);
            let signature = extract_signature(&node, source, ext);
            let start_line = node.start_position().row as u32 + 1;
            let end_line = node.end_position().row as u32 + 1;
            let docstring = leading_docstring(lines, node.start_position().row, ext);

            let metadata = ChunkMetadata {
                kind: Some(kind),
                name: name.clone(),
                signature: Some(signature.clone()),
                parent: parent_name.map(|s| s.to_string()),
                docstring,
                is_exported: text_has_export_marker(&signature, ext),
                is_async: signature.contains("async "),
                is_static: signature.contains("static "),
                visibility: visibility_of(&signature, ext),
                ..Default::default()
            };

            let full_text = node.utf8_text(source).unwrap_or("");
            let header = format!("{signature} ");
            let emitted = super::sub_chunk_body(relative_path, "", start_line, full_text, &metadata, config.chunk_size);
            out.extend(emitted);
            let _ = header;

            // Descend into class/impl bodies to pick up methods with `parent` set.
            if matches!(kind, ChunkKind::Class | ChunkKind::Trait | ChunkKind::Interface) {
                if cursor.goto_first_child() {
                    walk_and_emit(cursor, source, lines, ext, relative_path, name.as_deref(), config, out);
                    cursor.goto_parent();
                }
            }
        } else if cursor.goto_first_child() {
            walk_and_emit(cursor, source, lines, ext, relative_path, parent_name, config, out);
            cursor.goto_parent();
        }

        if !cursor.goto_next_sibling() {
            break;
        }
    }
}

fn text_has_export_marker(signature: &str, ext: &str) -> bool {
    match ext {
        "rs" => signature.trim_start().starts_with("pub "),
        "ts" | "tsx" | "js" | "jsx" => signature.contains("export "),
        _ => false,
    }
}

fn visibility_of(signature: &str, ext: &str) -> Option<String> {
    if ext == "rs" {
        if signature.trim_start().starts_with("pub(crate)") {
            return Some("pub(crate)".to_string());
        }
        if signature.trim_start().starts_with("pub ") || signature.trim_start().starts_with("pub(") {
            return Some("pub".to_string());
        }
        return Some("private".to_string());
    }
    None
}

fn module_chunk(relative_path: &str, text: &str) -> Chunk {
    let end_line = text.lines().count().max(1) as u32;
    Chunk::new(relative_path, 1, end_line, text, ChunkMetadata { kind: Some(ChunkKind::Module), ..Default::default() })
}

#[cfg(not(feature = "treesitter"))]
pub fn chunk(relative_path: &str, ext: &str, text: &str, config: &Config) -> Vec<Chunk> {
    super::heuristic::chunk(relative_path, ext, text, config)
}

#[cfg(all(test, feature = "treesitter"))]
mod tests {
    use super::*;

    #[test]
    fn rust_functions_become_separate_chunks_with_names() {
        let config = Config::default();
        let src = "/// adds two numbers\npub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n\nfn helper() {}\n";
        let chunks = chunk("math.rs", "rs", src, &config);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.name.as_deref(), Some("add"));
        assert_eq!(chunks[0].metadata.visibility.as_deref(), Some("pub"));
        assert!(chunks[0].metadata.docstring.as_deref().unwrap_or("").contains("adds two numbers"));
        assert_eq!(chunks[1].metadata.name.as_deref(), Some("helper"));
    }

    #[test]
    fn methods_get_parent_set_to_enclosing_struct() {
        let config = Config::default();
        let src = "struct Widget;\n\nimpl Widget {\n    fn one(&self) {}\n    fn two(&self) {}\n}\n";
        let chunks = chunk("widget.rs", "rs", src, &config);
        let methods: Vec<_> = chunks.iter().filter(|c| c.metadata.kind == Some(ChunkKind::Function)).collect();
        assert_eq!(methods.len(), 2);
        for m in methods {
            assert_eq!(m.metadata.parent.as_deref(), Some("Widget"));
        }
    }

    #[test]
    fn file_with_no_declarations_produces_one_module_chunk() {
        let config = Config::default();
        let src = "let x = 1;\nlet y = 2;\n";
        let chunks = chunk("script.rs", "rs", src, &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.kind, Some(ChunkKind::Module));
    }

    #[test]
    fn unknown_extension_falls_back_to_heuristic_chunking() {
        let config = Config::default();
        let chunks = chunk("data.xyz", "xyz", "some content\nmore content\n", &config);
        assert!(!chunks.is_empty());
    }
}
