//! Core indexing and hybrid search engine.
//!
//! Owns the full per-project lifecycle: AST-aware chunking, Merkle-DAG change
//! detection, the dual vector/FTS stores, hybrid ranking, pluggable indexing
//! strategies, and drift reconciliation. Callers typically go through
//! `codescope-index-facade` rather than this crate directly.

pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod fingerprints;
pub mod fts_store;
pub mod hashing;
pub mod index_manager;
pub mod integrity;
pub mod limits;
pub mod merkle;
pub mod path_safety;
pub mod policy;
pub mod query;
pub mod ranker;
pub mod strategies;
pub mod symbols;
pub mod types;
pub mod vector_store;

pub use config::Config;
pub use embedder::{Embedder, HashingEmbedder};
pub use error::{Error, ErrorCode, Result};
pub use index_manager::{Diagnostics, IndexManager, IndexPaths, IndexStats, Phase, Progress, ProgressSink, SearchParams};
pub use types::{Chunk, ChunkKind, ChunkMetadata, FileNode, SearchMode, SearchResult};

#[cfg(feature = "semantic")]
pub use embedder::FastEmbedEmbedder;
