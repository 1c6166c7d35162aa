//! Index manager (spec §4.11, C10). Orchestrates the full/incremental index
//! lifecycle across the vector store, FTS store, fingerprints, and Merkle
//! tree. Grounded in the donor's `scan.rs::scan_files` (bounded-depth walk,
//! `ScannedFile` shape) and `build_search_index` (insert-then-persist
//! sequencing), generalized from "rebuild everything every time" into the
//! surgical per-chunk update spec.md requires (§4.11 `update_file`).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::{Error, ErrorCode, Result};
use crate::fts_store::{FtsRecord, FtsStore};
use crate::limits::{MAX_DIRECTORY_DEPTH, MAX_GLOB_RESULTS};
use crate::merkle::MerkleTree;
use crate::policy::{Decision, Policy};
use crate::query::{detect_intent, expand_query};
use crate::ranker::{apply_boosts, dedupe_same_file, fuse, FusionCandidate};
use crate::types::{
    Chunk, EmbedKind, Fingerprint, Fingerprints, IndexKind, IndexMetadata, SearchMode, SearchResult,
};
use crate::vector_store::{VectorChunkRow, VectorRecord, VectorStore};

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub files_indexed: u64,
    pub chunks_created: u64,
    pub failed_chunk_count: u64,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub kind: IndexKind,
}

impl IndexPaths {
    pub fn metadata_json(&self) -> PathBuf {
        self.state_dir.join(format!("{}metadata.json", self.kind.state_prefix()))
    }
    /// Shared across both the code and docs index halves — not prefixed.
    pub fn config_json(&self) -> PathBuf {
        self.state_dir.join("config.json")
    }
    pub fn fingerprints_json(&self) -> PathBuf {
        self.state_dir.join(format!("{}fingerprints.json", self.kind.state_prefix()))
    }
    pub fn merkle_json(&self) -> PathBuf {
        self.state_dir.join(format!("{}merkle-tree.json", self.kind.state_prefix()))
    }
    pub fn vector_dir(&self) -> PathBuf {
        match self.kind {
            IndexKind::Code => self.state_dir.join("index.lancedb"),
            IndexKind::Docs => self.state_dir.join("docs.lancedb"),
        }
    }
    pub fn fts_dir(&self) -> PathBuf {
        self.state_dir.join(format!("{}fts", self.kind.state_prefix()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub mode: Option<SearchMode>,
    pub alpha: Option<f64>,
    pub top_k: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub fts_unavailable: bool,
}

/// `Phase` of a full index run, reported via the (optional) progress sink
/// (spec §4.11 "Progress is reported in phases").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Chunking,
    Embedding,
    Storing,
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    pub current_file: Option<String>,
}

pub type ProgressSink = Arc<dyn Fn(Progress) + Send + Sync>;

/// Owns the Stores, Fingerprints, Metadata, and Merkle tree for one project
/// index (spec §3 Ownership). Strategy components hold a shared reference
/// and mutate state only through this API (`update_file`/`delete_file`).
pub struct IndexManager {
    pub paths: IndexPaths,
    config: RwLock<Config>,
    policy: Policy,
    embedder: Arc<dyn Embedder>,
    vector_store: VectorStore,
    fts_store: Option<FtsStore>,
    merkle: RwLock<MerkleTree>,
    fingerprints: RwLock<Fingerprints>,
    metadata: RwLock<IndexMetadata>,
    indexing_lock: Mutex<()>,
    is_indexing_active: AtomicBool,
    cancelled: AtomicBool,
    now_fn: fn() -> i64,
    chunks_since_vector_index_check: AtomicU64,
    kind: IndexKind,
}

fn unix_now() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

impl IndexManager {
    pub async fn open(project_root: PathBuf, state_dir: PathBuf, config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::open_kind(project_root, state_dir, config, embedder, IndexKind::Code).await
    }

    /// Opens an `IndexManager` scoped to one half of the dual (code + docs)
    /// index (spec §4.11). `kind` gates which files `full_index` walks in and
    /// picks the `docs-`-prefixed state filenames spec.md names for the docs
    /// side.
    pub async fn open_kind(project_root: PathBuf, state_dir: PathBuf, config: Config, embedder: Arc<dyn Embedder>, kind: IndexKind) -> Result<Self> {
        let paths = IndexPaths { project_root: project_root.clone(), state_dir, kind };
        std::fs::create_dir_all(&paths.state_dir)
            .map_err(|e| Error::new(ErrorCode::PermissionDenied, "could not create index directory").with_developer(e.to_string()))?;

        let policy = Policy::load(&project_root)
            .map_err(|e| Error::new(ErrorCode::PermissionDenied, "could not load ignore policy").with_developer(e.to_string()))?;

        let vector_store = VectorStore::open(&paths.vector_dir(), embedder.dimension()).await?;
        let fts_store = FtsStore::open(&paths.fts_dir()).ok();
        let merkle = MerkleTree::load(&paths.merkle_json())?;
        let fingerprints = crate::fingerprints::load_fingerprints(&paths.fingerprints_json())?;
        let metadata = crate::fingerprints::load_metadata(&paths.metadata_json(), &project_root.to_string_lossy(), unix_now())?;

        Ok(Self {
            paths,
            config: RwLock::new(config),
            policy,
            embedder,
            vector_store,
            fts_store,
            merkle: RwLock::new(merkle),
            fingerprints: RwLock::new(fingerprints),
            metadata: RwLock::new(metadata),
            indexing_lock: Mutex::new(()),
            is_indexing_active: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            now_fn: unix_now,
            chunks_since_vector_index_check: AtomicU64::new(0),
            kind,
        })
    }

    pub fn is_indexing_active(&self) -> bool {
        self.is_indexing_active.load(Ordering::SeqCst)
    }

    /// Whether `rel_path` belongs to this manager's half of the dual (code +
    /// docs) index (spec §4.11 "policy routes `.md/.txt` to the docs
    /// manager, all other included files to the code manager").
    pub fn accepts(&self, rel_path: &str) -> bool {
        let ext = Path::new(rel_path).extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        self.kind.matches_ext(&ext)
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Full index (spec §4.11). Acquires `IndexingLock` for the duration, so a
    /// concurrent `create_index`/`reconcile` serializes behind it rather than
    /// racing the stores (spec §8 scenario 6).
    pub async fn full_index(&self, progress: Option<ProgressSink>) -> Result<IndexStats> {
        let _guard = self.indexing_lock.lock().await;
        self.is_indexing_active.store(true, Ordering::SeqCst);
        self.cancelled.store(false, Ordering::SeqCst);
        let result = self.full_index_locked(progress).await;
        self.is_indexing_active.store(false, Ordering::SeqCst);
        result
    }

    async fn full_index_locked(&self, progress: Option<ProgressSink>) -> Result<IndexStats> {
        let report = |phase: Phase, current: usize, total: usize, file: Option<String>| {
            if let Some(p) = &progress {
                p(Progress { phase, current, total, current_file: file });
            }
        };

        let deadline = Instant::now() + Duration::from_secs(crate::limits::GLOB_SCAN_TIMEOUT_SECS);
        let all_files = walk_project(&self.paths.project_root, &self.policy, deadline)?;
        let files: Vec<String> = all_files.into_iter().filter(|p| self.accepts(p)).collect();
        report(Phase::Scanning, files.len(), files.len(), None);

        let config = self.config.read().await.clone();
        let root = self.paths.project_root.clone();
        let files_to_chunk = files.clone();
        let chunked = tokio::task::spawn_blocking(move || chunk_files_parallel(&root, &files_to_chunk, &config))
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "chunking task panicked").with_developer(e.to_string()))?;
        report(Phase::Chunking, chunked.len(), files.len(), None);

        let mut new_merkle = MerkleTree::default();
        let mut new_fingerprints = Fingerprints::new();
        let mut stats = IndexStats::default();

        for (i, cf) in chunked.iter().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(Error::cancelled());
            }

            report(Phase::Embedding, i, chunked.len(), Some(cf.rel_path.clone()));
            let (records, failed) = self.embed_chunks(&cf.chunks).await;
            stats.failed_chunk_count += failed as u64;

            report(Phase::Storing, i, chunked.len(), Some(cf.rel_path.clone()));
            self.vector_store.insert_chunks(&records).await?;
            if let Some(fts) = &self.fts_store {
                let fts_records: Vec<FtsRecord> =
                    cf.chunks.iter().map(|c| FtsRecord { id: c.chunk_id.to_string(), path: c.relative_path.clone(), text: c.text.clone() }).collect();
                fts.add_chunks(&fts_records)?;
            }

            new_merkle.add_file(&cf.rel_path, &cf.chunks, cf.content_hash.clone(), cf.size, cf.mtime);
            new_fingerprints.insert(cf.rel_path.clone(), Fingerprint { hash: cf.content_hash.clone(), size: cf.size, mtime: cf.mtime });

            stats.files_indexed += 1;
            stats.chunks_created += cf.chunks.len() as u64;
        }

        *self.merkle.write().await = new_merkle;
        *self.fingerprints.write().await = new_fingerprints;

        {
            let mut metadata = self.metadata.write().await;
            metadata.last_full_index = Some((self.now_fn)());
            metadata.stats.total_files = stats.files_indexed;
            metadata.stats.total_chunks = stats.chunks_created;
        }

        self.maybe_build_vector_index().await?;
        self.persist_state().await?;
        Ok(stats)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> (Vec<VectorRecord>, usize) {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let results = self.embedder.embed_batch(&texts, EmbedKind::Document);
        let mut records = Vec::new();
        let mut failed = 0;
        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(vector) => records.push(VectorRecord {
                    id: chunk.chunk_id.to_string(),
                    vector,
                    path: chunk.relative_path.clone(),
                    text: chunk.text.clone(),
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    content_hash: chunk.content_hash.clone(),
                    chunk_type: chunk.metadata.kind.map(|k| format!("{k:?}").to_ascii_lowercase()),
                    chunk_name: chunk.metadata.name.clone(),
                    parent: chunk.metadata.parent.clone(),
                    tags: chunk.metadata.tags.clone(),
                }),
                Err(e) => {
                    tracing::warn!(path = %chunk.relative_path, error = %e, "embedding failed, chunk skipped");
                    failed += 1;
                }
            }
        }
        (records, failed)
    }

    async fn maybe_build_vector_index(&self) -> Result<()> {
        if let Some(cfg) = self.vector_store.maybe_create_vector_index().await? {
            let mut metadata = self.metadata.write().await;
            metadata.vector_index_info = Some(crate::types::VectorIndexInfo {
                index_type: "IVF_PQ".to_string(),
                num_partitions: cfg.num_partitions,
                num_sub_vectors: cfg.num_sub_vectors,
                distance_type: "l2".to_string(),
                chunk_count: self.vector_store.row_count().await? as u64,
            });
        }
        Ok(())
    }

    async fn persist_state(&self) -> Result<()> {
        self.merkle.read().await.save(&self.paths.merkle_json())?;
        crate::fingerprints::save_fingerprints(&self.paths.fingerprints_json(), &*self.fingerprints.read().await)?;
        crate::fingerprints::save_metadata(&self.paths.metadata_json(), &*self.metadata.read().await)?;
        if self.kind == IndexKind::Code {
            self.config.read().await.save(&self.paths.config_json())?;
        }
        Ok(())
    }

    /// Surgical incremental update (spec §4.11 `update_file`). Files with
    /// fewer than 3 existing chunks are delete-and-reindexed wholesale rather
    /// than diffed, since the surgical path's bookkeeping overhead isn't
    /// worth it below that size.
    pub async fn update_file(&self, rel_path: &str) -> Result<usize> {
        if !self.accepts(rel_path) {
            // Out of this manager's half of the dual (code/docs) index; the
            // sibling manager owns it. A no-op rather than an error since
            // strategy event loops fan the same path out to both managers
            // without knowing which one it belongs to.
            return Ok(0);
        }
        let config = self.config.read().await.clone();
        let bytes = crate::path_safety::safe_read(&self.paths.project_root, rel_path)?;
        let ext = Path::new(rel_path).extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let content_hash = crate::hashing::file_content_hash(&bytes);
        let new_chunks = crate::chunker::chunk_file(rel_path, &ext, &text, &config)?;

        let old_rows = self.vector_store.get_chunks_for_file(rel_path).await?;

        let chunks_updated = if old_rows.len() >= 3 {
            self.surgical_update(rel_path, &old_rows, &new_chunks).await?
        } else {
            self.vector_store.delete_chunks_by_path(rel_path).await?;
            if let Some(fts) = &self.fts_store {
                fts.remove_by_path(rel_path)?;
            }
            let (records, _) = self.embed_chunks(&new_chunks).await;
            self.vector_store.insert_chunks(&records).await?;
            if let Some(fts) = &self.fts_store {
                let fts_records: Vec<FtsRecord> =
                    new_chunks.iter().map(|c| FtsRecord { id: c.chunk_id.to_string(), path: c.relative_path.clone(), text: c.text.clone() }).collect();
                fts.add_chunks(&fts_records)?;
            }
            new_chunks.len()
        };

        let abs = crate::path_safety::to_absolute(rel_path, &self.paths.project_root);
        let meta = std::fs::metadata(&abs)
            .map_err(|e| Error::new(ErrorCode::FileNotFound, "file not found").with_developer(e.to_string()))?;
        let mtime = meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64).unwrap_or(0);

        {
            let mut merkle = self.merkle.write().await;
            merkle.add_file(rel_path, &new_chunks, content_hash.clone(), meta.len(), mtime);
        }
        {
            let mut fingerprints = self.fingerprints.write().await;
            fingerprints.insert(rel_path.to_string(), Fingerprint { hash: content_hash, size: meta.len(), mtime });
        }
        {
            let mut metadata = self.metadata.write().await;
            metadata.last_incremental_update = Some((self.now_fn)());
        }

        self.persist_state().await?;
        Ok(chunks_updated)
    }

    /// Diffs old vs. new chunks by content hash: removed ids are deleted,
    /// moved chunks (same hash, different range) get metadata-only updates
    /// (no re-embed), and genuinely new chunks are embedded and inserted
    /// (spec §4.11, §8 invariant: embedded + reused_unchanged + reused_moved
    /// == final chunk count).
    async fn surgical_update(&self, rel_path: &str, old_rows: &[VectorChunkRow], new_chunks: &[Chunk]) -> Result<usize> {
        let old_by_hash: std::collections::HashMap<&str, &VectorChunkRow> =
            old_rows.iter().map(|r| (r.content_hash.as_str(), r)).collect();
        let new_hashes: std::collections::HashSet<&str> = new_chunks.iter().map(|c| c.content_hash.as_str()).collect();

        let removed_ids: Vec<String> = old_rows.iter().filter(|r| !new_hashes.contains(r.content_hash.as_str())).map(|r| r.id.clone()).collect();
        if !removed_ids.is_empty() {
            self.vector_store.delete_chunks_by_ids(&removed_ids).await?;
        }

        let mut to_embed = Vec::new();
        let mut moved = 0usize;
        let mut unchanged = 0usize;

        for chunk in new_chunks {
            match old_by_hash.get(chunk.content_hash.as_str()) {
                Some(old) if old.start_line == chunk.start_line && old.end_line == chunk.end_line => {
                    unchanged += 1;
                }
                Some(old) => {
                    self.vector_store.update_chunk_metadata(&old.id, chunk.start_line, chunk.end_line).await?;
                    moved += 1;
                }
                None => to_embed.push(chunk.clone()),
            }
        }

        let embedded_count = to_embed.len();
        if !to_embed.is_empty() {
            let (records, _failed) = self.embed_chunks(&to_embed).await;
            self.vector_store.insert_chunks(&records).await?;
        }

        if let Some(fts) = &self.fts_store {
            // FTS doesn't support partial update; re-sync the whole file's
            // text documents against the final chunk set (spec §4.8).
            fts.remove_by_path(rel_path)?;
            let fts_records: Vec<FtsRecord> =
                new_chunks.iter().map(|c| FtsRecord { id: c.chunk_id.to_string(), path: c.relative_path.clone(), text: c.text.clone() }).collect();
            fts.add_chunks(&fts_records)?;
        }

        debug_assert_eq!(embedded_count + unchanged + moved, new_chunks.len());
        Ok(embedded_count + moved)
    }

    pub async fn delete_file(&self, rel_path: &str) -> Result<()> {
        self.vector_store.delete_chunks_by_path(rel_path).await?;
        if let Some(fts) = &self.fts_store {
            fts.remove_by_path(rel_path)?;
        }
        self.merkle.write().await.remove_file(rel_path);
        self.fingerprints.write().await.remove(rel_path);
        self.persist_state().await
    }

    /// `delete_index` (spec §6): drops every tracked file's chunks and resets
    /// the Merkle tree, fingerprints, and metadata to empty. Holds
    /// `IndexingLock` for the duration, same as `full_index` (spec §5).
    pub async fn delete_index(&self) -> Result<()> {
        let _guard = self.indexing_lock.lock().await;
        let paths: Vec<String> = self.merkle.read().await.files.keys().cloned().collect();
        for path in &paths {
            self.vector_store.delete_chunks_by_path(path).await?;
            if let Some(fts) = &self.fts_store {
                fts.remove_by_path(path)?;
            }
        }
        *self.merkle.write().await = MerkleTree::default();
        self.fingerprints.write().await.clear();
        {
            let mut metadata = self.metadata.write().await;
            *metadata = IndexMetadata::new(self.paths.project_root.to_string_lossy().into_owned(), (self.now_fn)());
        }
        self.persist_state().await
    }

    /// Hybrid search (spec §4.10).
    pub async fn search(&self, query: &str, params: SearchParams) -> Result<(Vec<SearchResult>, Diagnostics)> {
        if query.len() > crate::limits::MAX_QUERY_LENGTH {
            return Err(Error::invalid_input("query exceeds MAX_QUERY_LENGTH"));
        }
        let config = self.config.read().await.clone();
        let mode = params.mode.unwrap_or_else(|| config.hybrid_mode.mode.into());
        let alpha = params.alpha.unwrap_or(config.hybrid_mode.alpha).clamp(0.0, 1.0);
        let top_k = if params.top_k == 0 { 10 } else { params.top_k.min(50) };
        let oversampled_k = top_k * crate::ranker::OVERSAMPLE;

        let intents = detect_intent(query);
        let expanded = expand_query(query);

        let mut diagnostics = Diagnostics::default();

        let vector_hits = if matches!(mode, SearchMode::Vector | SearchMode::Hybrid) {
            let qvec = self.embedder.embed(&expanded, EmbedKind::Query)?;
            self.vector_store.search(&qvec, oversampled_k, None).await?
        } else {
            Vec::new()
        };

        let fts_hits = if matches!(mode, SearchMode::Keyword | SearchMode::Hybrid) {
            match &self.fts_store {
                Some(fts) => fts.search(&expanded, oversampled_k)?,
                None => {
                    diagnostics.fts_unavailable = true;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let fts_scores = crate::fts_store::normalize_scores(&fts_hits);

        let mut candidates: std::collections::HashMap<String, FusionCandidate> = std::collections::HashMap::new();
        for (rank, hit) in vector_hits.iter().enumerate() {
            candidates.insert(
                hit.id.clone(),
                FusionCandidate {
                    id: hit.id.clone(),
                    path: hit.path.clone(),
                    text: hit.text.clone(),
                    start_line: hit.start_line,
                    end_line: hit.end_line,
                    metadata: hit.metadata.clone(),
                    vector_rank: Some(rank),
                    vector_score: Some(hit.score),
                    fts_rank: None,
                    fts_score: None,
                },
            );
        }
        for (rank, (hit, norm_score)) in fts_hits.iter().zip(fts_scores.iter()).enumerate() {
            candidates
                .entry(hit.id.clone())
                .and_modify(|c| {
                    c.fts_rank = Some(rank);
                    c.fts_score = Some(*norm_score);
                })
                .or_insert_with(|| FusionCandidate {
                    id: hit.id.clone(),
                    path: hit.path.clone(),
                    text: String::new(),
                    start_line: 0,
                    end_line: 0,
                    metadata: Default::default(),
                    vector_rank: None,
                    vector_score: None,
                    fts_rank: Some(rank),
                    fts_score: Some(*norm_score),
                });
        }

        let ordered: Vec<FusionCandidate> = candidates.into_values().collect();
        let fused = fuse(&ordered, alpha);
        let weights = config.ranking_weights;

        let mut results: Vec<SearchResult> = ordered
            .iter()
            .map(|c| {
                let base = fused.get(&c.id).copied().unwrap_or(0.0);
                let score = apply_boosts(base, query, &intents, c, &weights);
                SearchResult {
                    path: c.path.clone(),
                    text: c.text.clone(),
                    score,
                    start_line: c.start_line,
                    end_line: c.end_line,
                    metadata: Some(c.metadata.clone()),
                }
            })
            .collect();

        results = dedupe_same_file(results);
        results.truncate(top_k);
        Ok((results, diagnostics))
    }

    pub async fn status(&self) -> IndexMetadata {
        self.metadata.read().await.clone()
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub fn project_root(&self) -> &Path {
        &self.paths.project_root
    }
}

struct ChunkedFile {
    rel_path: String,
    chunks: Vec<Chunk>,
    content_hash: String,
    size: u64,
    mtime: i64,
}

/// Reads and chunks every file concurrently across a rayon pool, the same
/// way the donor's `scan_files` parallelizes its own per-file work. Run via
/// `spawn_blocking` since rayon's pool is independent of the tokio runtime.
/// Unreadable or unchunkable files are logged and dropped, matching the
/// sequential path's prior behavior.
fn chunk_files_parallel(root: &Path, files: &[String], config: &Config) -> Vec<ChunkedFile> {
    use rayon::prelude::*;

    files
        .par_iter()
        .filter_map(|rel_path| {
            let bytes = match crate::path_safety::safe_read(root, rel_path) {
                Ok(b) => b,
                Err(_) => {
                    tracing::warn!(path = %rel_path, "skipping unreadable or symlinked file");
                    return None;
                }
            };
            let ext = Path::new(rel_path).extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let content_hash = crate::hashing::file_content_hash(&bytes);

            let chunks = match crate::chunker::chunk_file(rel_path, &ext, &text, config) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %rel_path, error = %e, "chunking failed, skipping file");
                    return None;
                }
            };

            let meta = std::fs::metadata(crate::path_safety::to_absolute(rel_path, root)).ok()?;
            let mtime = meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64).unwrap_or(0);

            Some(ChunkedFile { rel_path: rel_path.clone(), chunks, content_hash, size: meta.len(), mtime })
        })
        .collect()
}

/// Bounded-depth, bounded-count project walk under the given policy (spec
/// §4.11, §5 resource limits). Grounded in the donor's `scan_files`
/// depth-tracking walk, generalized to call `Policy::should_index` per
/// candidate instead of the donor's inline deny-list checks.
pub fn walk_project(root: &Path, policy: &Policy, deadline: Instant) -> Result<Vec<String>> {
    let mut out = Vec::new();
    walk_dir(root, root, policy, 0, &mut out, &deadline)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use std::sync::Arc as StdArc;

    async fn open_manager(root: &Path) -> IndexManager {
        let state_dir = root.join(".codescope-index");
        let embedder: StdArc<dyn Embedder> = StdArc::new(HashingEmbedder::new(32));
        IndexManager::open(root.to_path_buf(), state_dir, Config::default(), embedder).await.unwrap()
    }

    /// Spec §8 scenario 1: three files with multiple declarations each index
    /// into at least one chunk per declaration, and status reports `ready`.
    /// `README.md` routes to the docs half of the dual index (spec §4.11), so
    /// the scenario's combined `totalFiles=3` is asserted across both halves,
    /// the way `IndexFacade::create_index` sums `code` + `docs` stats.
    #[tokio::test]
    async fn full_index_counts_files_and_chunks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.ts"),
            "export function alpha() { return 1; }\nexport function beta() { return 2; }\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.py"),
            "class Widget:\n    def one(self):\n        return 1\n    def two(self):\n        return 2\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "# Title\n\n## Section A\n\nbody\n\n## Section B\n\nmore\n").unwrap();

        let code = open_manager(dir.path()).await;
        let code_stats = code.full_index(None).await.unwrap();
        assert_eq!(code_stats.files_indexed, 2, "README.md belongs to the docs half, not code");

        let state_dir = dir.path().join(".codescope-index");
        let docs_embedder: StdArc<dyn Embedder> = StdArc::new(HashingEmbedder::new(32));
        let docs = IndexManager::open_kind(dir.path().to_path_buf(), state_dir, Config::default(), docs_embedder, IndexKind::Docs).await.unwrap();
        let docs_stats = docs.full_index(None).await.unwrap();
        assert_eq!(docs_stats.files_indexed, 1);

        let combined_files = code_stats.files_indexed + docs_stats.files_indexed;
        let combined_chunks = code_stats.chunks_created + docs_stats.chunks_created;
        assert_eq!(combined_files, 3);
        assert!(combined_chunks >= 6, "expected >= 6 chunks, got {combined_chunks}");

        let metadata = code.status().await;
        assert_eq!(metadata.stats.total_files, 2);
        assert_eq!(metadata.stats.total_chunks, code_stats.chunks_created);
    }

    /// Spec §8 scenario 6: a second `full_index` serializes behind the first
    /// via `IndexingLock` rather than corrupting the store.
    #[tokio::test]
    async fn concurrent_full_index_calls_serialize_without_corruption() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn one() {}\nfn two() {}\n").unwrap();

        let manager = StdArc::new(open_manager(dir.path()).await);
        let m1 = StdArc::clone(&manager);
        let m2 = StdArc::clone(&manager);
        let (r1, r2) = tokio::join!(tokio::spawn(async move { m1.full_index(None).await }), tokio::spawn(async move { m2.full_index(None).await }));
        assert!(r1.unwrap().is_ok());
        assert!(r2.unwrap().is_ok());

        let metadata = manager.status().await;
        assert_eq!(metadata.stats.total_files, 1);
    }

    /// Spec §8 scenario 2 / §4.11 `update_file`: editing one function inside a
    /// many-function file re-embeds only the changed chunk(s) and leaves
    /// everything else's ids untouched.
    #[tokio::test]
    async fn update_file_reembeds_only_changed_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.rs");
        let mut src = String::new();
        for i in 0..20 {
            src.push_str(&format!("fn f{i}() {{ let x = {i}; let _ = x; }}\n"));
        }
        std::fs::write(&path, &src).unwrap();

        let manager = open_manager(dir.path()).await;
        manager.full_index(None).await.unwrap();
        let before = manager.vector_store.get_chunks_for_file("big.rs").await.unwrap();
        assert!(before.len() >= 10);

        // Edit the body of exactly one function.
        let edited = src.replace("let x = 5; let _ = x;", "let x = 555; let _ = x;");
        assert_ne!(src, edited);
        std::fs::write(&path, edited).unwrap();

        let chunks_updated = manager.update_file("big.rs").await.unwrap();
        assert!(chunks_updated <= 2, "expected at most 1-2 chunks touched, got {chunks_updated}");

        let after = manager.vector_store.get_chunks_for_file("big.rs").await.unwrap();
        assert_eq!(after.len(), before.len());

        let before_ids: std::collections::HashSet<_> = before.iter().map(|r| r.id.clone()).collect();
        let after_ids: std::collections::HashSet<_> = after.iter().map(|r| r.id.clone()).collect();
        let unchanged_ids = before_ids.intersection(&after_ids).count();
        assert!(unchanged_ids >= before.len() - 2, "most chunk ids should survive a single-line edit");
    }

    /// Spec §8 scenario 3: inserting a blank line at the top of the file
    /// shifts every chunk's line range but keeps the chunks recognized as
    /// moved rather than forcing a full re-embed.
    #[tokio::test]
    async fn update_file_detects_moved_chunks_after_leading_insert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.py");
        let src = "class Widget:\n    def one(self):\n        return 1\n    def two(self):\n        return 2\n    def three(self):\n        return 3\n";
        std::fs::write(&path, src).unwrap();

        let manager = open_manager(dir.path()).await;
        manager.full_index(None).await.unwrap();
        let before = manager.vector_store.get_chunks_for_file("mod.py").await.unwrap();

        std::fs::write(&path, format!("\n{src}")).unwrap();
        manager.update_file("mod.py").await.unwrap();

        let after = manager.vector_store.get_chunks_for_file("mod.py").await.unwrap();
        assert_eq!(after.len(), before.len());
        let before_ids: std::collections::HashSet<_> = before.iter().map(|r| r.id.clone()).collect();
        let after_ids: std::collections::HashSet<_> = after.iter().map(|r| r.id.clone()).collect();
        assert_eq!(before_ids, after_ids, "moved chunks must retain their ids");
    }

    #[tokio::test]
    async fn delete_file_removes_chunks_and_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn one() {}\n").unwrap();
        let manager = open_manager(dir.path()).await;
        manager.full_index(None).await.unwrap();

        manager.delete_file("a.rs").await.unwrap();
        let rows = manager.vector_store.get_chunks_for_file("a.rs").await.unwrap();
        assert!(rows.is_empty());
        assert!(!manager.fingerprints.read().await.contains_key("a.rs"));
    }

    #[tokio::test]
    async fn search_rejects_query_over_limit() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_manager(dir.path()).await;
        let err = manager
            .search(&"a".repeat(crate::limits::MAX_QUERY_LENGTH + 1), SearchParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}

fn walk_dir(root: &Path, dir: &Path, policy: &Policy, depth: usize, out: &mut Vec<String>, deadline: &Instant) -> Result<()> {
    if depth > MAX_DIRECTORY_DEPTH {
        tracing::warn!(dir = %dir.display(), "MAX_DIRECTORY_DEPTH exceeded, stopping traversal here");
        return Ok(());
    }
    if Instant::now() > *deadline {
        return Err(Error::new(ErrorCode::ResourceLimit, "project scan exceeded its time budget"));
    }
    let Ok(entries) = std::fs::read_dir(dir) else { return Ok(()) };

    for entry in entries.flatten() {
        if out.len() >= MAX_GLOB_RESULTS {
            return Ok(());
        }
        let path = entry.path();
        if crate::path_safety::is_symlink(&path) {
            tracing::warn!(path = %path.display(), "skipping symlink during indexing walk");
            continue;
        }
        let Some(rel) = crate::path_safety::to_relative(&path, root) else { continue };
        let decision = policy.should_index(&path, &rel);
        if decision.decision == Decision::Exclude {
            continue;
        }
        if path.is_dir() {
            walk_dir(root, &path, policy, depth + 1, out, deadline)?;
        } else if path.is_file() {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
            let is_text = crate::policy::is_text_file(&ext, || std::fs::read(&path).map(|b| b.into_iter().take(8192).collect()));
            if is_text {
                out.push(rel);
            }
        }
    }
    Ok(())
}
