//! Merkle DAG (spec §4.6, C6). Per-file node plus a root hash over sorted
//! `(path, file.hash)` pairs; diffing distinguishes "bytes changed" from
//! "bytes identical, chunking changed" the way spec.md's `diff` contract
//! requires. New — the donor has no equivalent structure (its `scan.rs`
//! re-walks the whole tree every time) — authored in the same
//! serde-persisted-JSON-blob idiom the rest of this crate's stores use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCode, Result};
use crate::hashing::hash_concat;
use crate::types::{Chunk, ChunkChange, FileNode, TreeDiff};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    pub version: u32,
    pub files: BTreeMap<String, FileNode>,
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self { version: Self::SCHEMA_VERSION, files: BTreeMap::new() }
    }
}

impl MerkleTree {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn add_file(&mut self, path: &str, chunks: &[Chunk], content_hash: String, size: u64, mtime: i64) {
        let node = FileNode::new(path.to_string(), content_hash, size, mtime, chunks);
        self.files.insert(path.to_string(), node);
    }

    pub fn remove_file(&mut self, path: &str) -> Option<FileNode> {
        self.files.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&FileNode> {
        self.files.get(path)
    }

    /// Deterministic over the set of `(path, file.hash)` pairs — independent
    /// of insertion order because `files` is a `BTreeMap` (sorted by path)
    /// and we fold over it in that order every time.
    pub fn root_hash(&self) -> String {
        let parts: Vec<String> = self.files.iter().map(|(path, node)| format!("{path}\u{1}{}", node.hash)).collect();
        hash_concat(&parts)
    }

    pub fn find_chunks_by_content_hash(&self, hash: &str) -> Vec<(String, uuid::Uuid)> {
        let mut out = Vec::new();
        for (path, node) in &self.files {
            for (id, h) in node.chunk_ids.iter().zip(node.chunk_hashes.iter()) {
                if h == hash {
                    out.push((path.clone(), *id));
                }
            }
        }
        out
    }

    /// `diff(other)`: classifies every file as added/modified/removed, or —
    /// when `content_hash` (raw bytes) is unchanged but `hash` (chunk set)
    /// differs — produces a chunk-level `ChunkChange` instead of a full
    /// "modified" classification.
    pub fn diff(&self, other: &MerkleTree) -> TreeDiff {
        let mut diff = TreeDiff::default();

        for (path, new_node) in &other.files {
            match self.files.get(path) {
                None => diff.added_files.push(path.clone()),
                Some(old_node) => {
                    if old_node.hash == new_node.hash {
                        continue;
                    }
                    if old_node.content_hash == new_node.content_hash {
                        let old_set: std::collections::HashSet<&String> = old_node.chunk_hashes.iter().collect();
                        let new_set: std::collections::HashSet<&String> = new_node.chunk_hashes.iter().collect();
                        let removed: Vec<uuid::Uuid> = old_node
                            .chunk_ids
                            .iter()
                            .zip(old_node.chunk_hashes.iter())
                            .filter(|(_, h)| !new_set.contains(h))
                            .map(|(id, _)| *id)
                            .collect();
                        let added_hashes: Vec<&String> = new_node.chunk_hashes.iter().filter(|h| !old_set.contains(h)).collect();
                        if removed.is_empty() && added_hashes.is_empty() {
                            // Same chunk hashes, different order/line ranges: a pure move.
                            diff.chunk_changes.push(ChunkChange {
                                file: path.clone(),
                                added_chunks: Vec::new(),
                                removed_chunk_ids: Vec::new(),
                                moved_chunk_ids: new_node.chunk_ids.clone(),
                            });
                        } else {
                            diff.chunk_changes.push(ChunkChange {
                                file: path.clone(),
                                added_chunks: Vec::new(),
                                removed_chunk_ids: removed,
                                moved_chunk_ids: Vec::new(),
                            });
                        }
                    } else {
                        diff.modified_files.push(path.clone());
                    }
                }
            }
        }

        for path in self.files.keys() {
            if !other.files.contains_key(path) {
                diff.removed_files.push(path.clone());
            }
        }

        diff
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        match crate::path_safety::safe_load_json::<MerkleTree>(path)? {
            Some(tree) => {
                validate_loaded(&tree)?;
                Ok(tree)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        crate::path_safety::write_json_atomic(path, self)
    }
}

pub fn validate_loaded(tree: &MerkleTree) -> Result<()> {
    if tree.version > MerkleTree::SCHEMA_VERSION {
        return Err(Error::new(ErrorCode::IndexCorrupt, "merkle tree was written by a newer schema version"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;

    fn mk_chunk(path: &str, text: &str) -> Chunk {
        Chunk::new(path, 1, 1, text, ChunkMetadata::default())
    }

    #[test]
    fn root_hash_is_order_independent() {
        let mut a = MerkleTree::default();
        a.add_file("b.rs", &[mk_chunk("b.rs", "b")], "h-b".into(), 1, 0);
        a.add_file("a.rs", &[mk_chunk("a.rs", "a")], "h-a".into(), 1, 0);

        let mut b = MerkleTree::default();
        b.add_file("a.rs", &[mk_chunk("a.rs", "a")], "h-a".into(), 1, 0);
        b.add_file("b.rs", &[mk_chunk("b.rs", "b")], "h-b".into(), 1, 0);

        assert_eq!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn diff_self_is_empty() {
        let mut tree = MerkleTree::default();
        tree.add_file("a.rs", &[mk_chunk("a.rs", "a")], "h".into(), 1, 0);
        let diff = tree.diff(&tree);
        assert!(diff.added_files.is_empty());
        assert!(diff.removed_files.is_empty());
        assert!(diff.modified_files.is_empty());
    }

    #[test]
    fn same_bytes_different_chunking_produces_chunk_change_not_modified() {
        let mut old = MerkleTree::default();
        old.add_file("a.rs", &[mk_chunk("a.rs", "one")], "same-bytes".into(), 3, 0);

        let mut new = MerkleTree::default();
        new.add_file("a.rs", &[mk_chunk("a.rs", "one"), mk_chunk("a.rs", "two")], "same-bytes".into(), 3, 0);

        let diff = old.diff(&new);
        assert!(diff.modified_files.is_empty());
        assert_eq!(diff.chunk_changes.len(), 1);
        assert_eq!(diff.chunk_changes[0].file, "a.rs");
    }

    #[test]
    fn different_bytes_is_classified_modified() {
        let mut old = MerkleTree::default();
        old.add_file("a.rs", &[mk_chunk("a.rs", "one")], "bytes-1".into(), 3, 0);
        let mut new = MerkleTree::default();
        new.add_file("a.rs", &[mk_chunk("a.rs", "one-edited")], "bytes-2".into(), 4, 1);

        let diff = old.diff(&new);
        assert_eq!(diff.modified_files, vec!["a.rs".to_string()]);
    }

    #[test]
    fn load_rejects_tree_from_a_newer_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merkle.json");
        let mut tree = MerkleTree::default();
        tree.version = MerkleTree::SCHEMA_VERSION + 1;
        tree.save(&path).unwrap();

        let err = MerkleTree::load(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::IndexCorrupt);
    }
}
