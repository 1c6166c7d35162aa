//! Core data model (spec §3). Grounded in the donor's `server/src/types.rs` /
//! `crates/core/src/types.rs` `ScannedFile`/`ChunkMeta`/`RepoState` shapes,
//! generalized to the chunk/file-node/Merkle model this system needs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which of the two independent stores a project file belongs to (spec §4.11
/// "Dual indexes"): `.md`/`.txt` route to `Docs`, everything else policy
/// still includes routes to `Code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Code,
    Docs,
}

impl IndexKind {
    pub fn matches_ext(&self, ext: &str) -> bool {
        let is_docs_ext = matches!(ext, "md" | "txt");
        match self {
            IndexKind::Docs => is_docs_ext,
            IndexKind::Code => !is_docs_ext,
        }
    }

    pub fn state_prefix(&self) -> &'static str {
        match self {
            IndexKind::Code => "",
            IndexKind::Docs => "docs-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Method,
    Interface,
    Struct,
    Enum,
    Trait,
    Property,
    Module,
    MarkdownSection,
    Fallback,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub kind: Option<ChunkKind>,
    pub name: Option<String>,
    pub signature: Option<String>,
    pub parent: Option<String>,
    pub docstring: Option<String>,
    #[serde(default)]
    pub decorators: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub visibility: Option<String>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_exported: bool,
    #[serde(default)]
    pub is_static: bool,
    /// Breadcrumb of ancestor markdown headers, outermost first.
    #[serde(default)]
    pub header_path: Vec<String>,
    /// Set when a declaration or section was split across multiple chunks.
    pub part: Option<u32>,
}

/// Smallest unit of retrieval (spec §3 Chunk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: uuid::Uuid,
    pub relative_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub text: String,
    /// 32-hex-char (or legacy 16) SHA-256 prefix of whitespace-normalized text.
    pub content_hash: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(
        relative_path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        text: impl Into<String>,
        metadata: ChunkMetadata,
    ) -> Self {
        let text = text.into();
        let content_hash = crate::hashing::chunk_content_hash(&text);
        Self {
            chunk_id: uuid::Uuid::new_v4(),
            relative_path: relative_path.into(),
            start_line,
            end_line,
            text,
            content_hash,
            metadata,
        }
    }
}

/// Per-indexed-file node of the Merkle tree (spec §3 FileNode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    pub relative_path: String,
    /// 16-hex-char (legacy) or 32-hex-char (new) SHA-256 prefix of file bytes.
    pub content_hash: String,
    pub size: u64,
    pub mtime: i64,
    pub chunk_ids: Vec<uuid::Uuid>,
    pub chunk_hashes: Vec<String>,
    /// Hash over the ordered `chunk_hashes`; changes whenever chunking changes
    /// even if `content_hash` (raw bytes) is unchanged.
    pub hash: String,
}

impl FileNode {
    pub fn new(relative_path: String, content_hash: String, size: u64, mtime: i64, chunks: &[Chunk]) -> Self {
        let chunk_ids: Vec<uuid::Uuid> = chunks.iter().map(|c| c.chunk_id).collect();
        let chunk_hashes: Vec<String> = chunks.iter().map(|c| c.content_hash.clone()).collect();
        let hash = crate::hashing::hash_concat(&chunk_hashes);
        Self { relative_path, content_hash, size, mtime, chunk_ids, chunk_hashes, hash }
    }
}

/// `{hash, size, mtime}` triple for fast drift detection (spec §3 Fingerprints).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: String,
    pub size: u64,
    pub mtime: i64,
}

pub type Fingerprints = BTreeMap<String, Fingerprint>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct IndexStats {
    pub total_files: u64,
    pub total_chunks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VectorIndexInfo {
    pub index_type: String,
    pub num_partitions: u32,
    pub num_sub_vectors: u32,
    pub distance_type: String,
    pub chunk_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub version: u32,
    pub project_path: String,
    pub created_at: i64,
    pub last_full_index: Option<i64>,
    pub last_incremental_update: Option<i64>,
    pub stats: IndexStats,
    pub vector_index_info: Option<VectorIndexInfo>,
}

impl IndexMetadata {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(project_path: String, now: i64) -> Self {
        Self {
            version: Self::SCHEMA_VERSION,
            project_path,
            created_at: now,
            last_full_index: None,
            last_incremental_update: None,
            stats: IndexStats::default(),
            vector_index_info: None,
        }
    }
}

/// Lazy-strategy dirty-file tracking (spec §3 DirtyFiles).
/// Invariant: `dirty ∩ deleted = ∅` — enforced by the mutators, never by callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirtyFiles {
    pub dirty: std::collections::BTreeSet<String>,
    pub deleted: std::collections::BTreeSet<String>,
}

impl DirtyFiles {
    pub fn mark_dirty(&mut self, path: &str) {
        self.deleted.remove(path);
        self.dirty.insert(path.to_string());
    }

    pub fn mark_deleted(&mut self, path: &str) {
        self.dirty.remove(path);
        self.deleted.insert(path.to_string());
    }

    pub fn clear(&mut self) {
        self.dirty.clear();
        self.deleted.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty() && self.deleted.is_empty()
    }
}

/// Diff between two chunk sets for a single file whose chunking changed while
/// its raw bytes did not.
#[derive(Debug, Clone, Default)]
pub struct ChunkChange {
    pub file: String,
    pub added_chunks: Vec<Chunk>,
    pub removed_chunk_ids: Vec<uuid::Uuid>,
    pub moved_chunk_ids: Vec<uuid::Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct TreeDiff {
    pub added_files: Vec<String>,
    pub modified_files: Vec<String>,
    pub removed_files: Vec<String>,
    pub chunk_changes: Vec<ChunkChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Document,
    Query,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchMode {
    Vector,
    Keyword,
    Hybrid,
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::Hybrid
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub path: String,
    pub text: String,
    pub score: f64,
    pub start_line: u32,
    pub end_line: u32,
    pub metadata: Option<ChunkMetadata>,
}
