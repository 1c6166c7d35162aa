//! Typed request/response wrappers over `codescope-index-core` (spec §6,
//! C16). No transport lives here — this is the seam a JSON-RPC/stdio server
//! would call into, grounded in the donor's `server/src/mcp.rs` request/
//! response shapes, generalized onto this crate's index manager instead of
//! the donor's `ServerState`.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use codescope_index_core::config::Config;
use codescope_index_core::embedder::{Embedder, HashingEmbedder};
use codescope_index_core::error::{Error, ErrorCode, Result};
use codescope_index_core::index_manager::{IndexManager, Phase, Progress, ProgressSink, SearchParams};
use codescope_index_core::types::{IndexKind, SearchMode, SearchResult};

pub const MAX_PATTERN_LENGTH: usize = 200;
pub const MAX_PATTERN_WILDCARDS: usize = 10;
pub const MAX_PATTERN_BRACE_GROUPS: usize = 5;
pub const MAX_PATTERN_BRACE_ITEMS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIndexRequest {
    pub project_path: PathBuf,
    pub confirmed: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateIndexResponse {
    pub status: Status,
    pub project_path: Option<String>,
    pub files_indexed: Option<u64>,
    pub chunks_created: Option<u64>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexFileRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexFileResponse {
    pub status: Status,
    pub chunks_updated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteIndexResponse {
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatusResponse {
    pub status: &'static str,
    pub project_path: Option<String>,
    pub total_files: Option<u64>,
    pub total_chunks: Option<u64>,
    pub last_updated: Option<i64>,
    pub vector_index: Option<codescope_index_core::types::VectorIndexInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub mode: Option<SearchModeParam>,
    pub alpha: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchModeParam {
    Vector,
    Keyword,
    Hybrid,
}

impl From<SearchModeParam> for SearchMode {
    fn from(m: SearchModeParam) -> Self {
        match m {
            SearchModeParam::Vector => SearchMode::Vector,
            SearchModeParam::Keyword => SearchMode::Keyword,
            SearchModeParam::Hybrid => SearchMode::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponseItem {
    pub path: String,
    pub text: String,
    pub score: f64,
    pub start_line: u32,
    pub end_line: u32,
    pub metadata: Option<codescope_index_core::types::ChunkMetadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResponseItem>,
    pub total_results: usize,
    pub search_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchByPathRequest {
    pub pattern: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummaryRequest {
    pub path: String,
    pub include_complexity: Option<bool>,
    pub include_docstrings: Option<bool>,
}

fn from_search_result(r: SearchResult) -> SearchResponseItem {
    SearchResponseItem { path: r.path, text: r.text, score: r.score, start_line: r.start_line, end_line: r.end_line, metadata: r.metadata }
}

/// Query-length and top_k validation shared by `search_code`/`search_docs`
/// (spec §6: query ≤1000 chars, top_k ∈ [1,50], default 10).
fn validate_search_request(req: &SearchRequest) -> Result<()> {
    if req.query.len() > codescope_index_core::limits::MAX_QUERY_LENGTH {
        return Err(Error::invalid_input("query exceeds maximum length"));
    }
    if let Some(k) = req.top_k {
        if k == 0 || k > 50 {
            return Err(Error::invalid_input("top_k must be between 1 and 50"));
        }
    }
    if let Some(a) = req.alpha {
        if !(0.0..=1.0).contains(&a) {
            return Err(Error::invalid_input("alpha must be between 0.0 and 1.0"));
        }
    }
    Ok(())
}

/// `isPatternSafe` (spec §6): rejects glob patterns with more than
/// `MAX_PATTERN_WILDCARDS` wildcards, more than `MAX_PATTERN_BRACE_GROUPS`
/// brace groups or `MAX_PATTERN_BRACE_ITEMS` comma-separated items inside a
/// group, or shapes known to cause catastrophic regex backtracking
/// (nested-quantifier-like repetition of wildcard segments).
pub fn is_pattern_safe(pattern: &str) -> bool {
    if pattern.is_empty() || pattern.len() > MAX_PATTERN_LENGTH {
        return false;
    }
    let wildcards = pattern.chars().filter(|c| *c == '*' || *c == '?').count();
    if wildcards > MAX_PATTERN_WILDCARDS {
        return false;
    }
    let brace_groups = pattern.matches('{').count();
    if brace_groups > MAX_PATTERN_BRACE_GROUPS {
        return false;
    }
    for group in pattern.split('{').skip(1) {
        if let Some(end) = group.find('}') {
            let items = group[..end].split(',').count();
            if items > MAX_PATTERN_BRACE_ITEMS {
                return false;
            }
        }
    }
    // Reject repeated `**` runs beyond a handful and any `***` which has no
    // glob meaning and is a common ReDoS-probe shape.
    if pattern.contains("***") || pattern.matches("**").count() > 4 {
        return false;
    }
    true
}

/// Facade over one project's dual (code + docs) index (spec §6 operation
/// table, §4.11 "Dual indexes"). `.md`/`.txt` files live in `docs`; every
/// other included file lives in `code`. The two managers share a state
/// directory (disambiguated by the `docs-` filename prefix, spec §6
/// Persisted state layout) but otherwise own fully independent stores.
pub struct IndexFacade {
    code: Arc<IndexManager>,
    docs: Arc<IndexManager>,
}

impl IndexFacade {
    /// `embedder` is supplied by the caller rather than constructed here —
    /// the CLI wires a real `FastEmbedEmbedder` under the `semantic`
    /// feature and falls back to `HashingEmbedder` otherwise; tests pass
    /// `HashingEmbedder` directly to stay off the network.
    pub async fn open(project_root: PathBuf, state_dir: PathBuf, config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let code = IndexManager::open_kind(project_root.clone(), state_dir.clone(), config.clone(), Arc::clone(&embedder), IndexKind::Code).await?;
        let docs = IndexManager::open_kind(project_root, state_dir, config, embedder, IndexKind::Docs).await?;
        Ok(Self { code: Arc::new(code), docs: Arc::new(docs) })
    }

    /// The code-half manager; CLI/server plumbing that needs direct access to
    /// `IndexManager` (e.g. to build a watching `IndexingStrategy`) goes
    /// through this, same as `manager()` did before the dual-index split.
    pub fn manager(&self) -> Arc<IndexManager> {
        Arc::clone(&self.code)
    }

    pub fn docs_manager(&self) -> Arc<IndexManager> {
        Arc::clone(&self.docs)
    }

    /// `create_index`: destructive full rebuild of both the code and docs
    /// stores. Requires `confirmed === true` by strict identity —
    /// `None`/`Some(false)` both cancel without raising (spec §6, §9 "never
    /// raise on missing confirmation").
    pub async fn create_index(&self, req: CreateIndexRequest, progress: Option<ProgressSink>) -> Result<CreateIndexResponse> {
        if req.confirmed != Some(true) {
            return Ok(CreateIndexResponse { status: Status::Cancelled, project_path: None, files_indexed: None, chunks_created: None, duration_ms: None });
        }
        let start = std::time::Instant::now();
        let code_stats = self.code.full_index(progress.clone()).await?;
        let docs_stats = self.docs.full_index(progress).await?;
        Ok(CreateIndexResponse {
            status: Status::Success,
            project_path: Some(self.code.project_root().to_string_lossy().into_owned()),
            files_indexed: Some(code_stats.files_indexed + docs_stats.files_indexed),
            chunks_created: Some(code_stats.chunks_created + docs_stats.chunks_created),
            duration_ms: Some(start.elapsed().as_millis() as u64),
        })
    }

    /// `reindex_project`: identical semantics to `create_index` (spec §6).
    pub async fn reindex_project(&self, confirmed: Option<bool>, progress: Option<ProgressSink>) -> Result<CreateIndexResponse> {
        self.create_index(CreateIndexRequest { project_path: self.code.project_root().to_path_buf(), confirmed }, progress).await
    }

    /// `reindex_file`: routed to whichever of the two managers owns this
    /// file's extension (spec §4.11 "policy routes .md/.txt to the docs
    /// manager, all other included files to the code manager").
    pub async fn reindex_file(&self, req: ReindexFileRequest) -> Result<ReindexFileResponse> {
        let manager = if self.docs.accepts(&req.path) { &self.docs } else { &self.code };
        let chunks_updated = manager.update_file(&req.path).await?;
        Ok(ReindexFileResponse { status: Status::Success, chunks_updated })
    }

    pub async fn delete_index(&self) -> Result<DeleteIndexResponse> {
        self.code.delete_index().await?;
        self.docs.delete_index().await?;
        Ok(DeleteIndexResponse { status: Status::Success })
    }

    /// `get_index_status`: reports the code index, which every project has;
    /// a docs-only project (e.g. a documentation repo) would need its own
    /// status call, left to the embedding tool facade layer to expose.
    pub async fn get_index_status(&self) -> IndexStatusResponse {
        let metadata = self.code.status().await;
        IndexStatusResponse {
            status: "ready",
            project_path: Some(metadata.project_path),
            total_files: Some(metadata.stats.total_files),
            total_chunks: Some(metadata.stats.total_chunks),
            last_updated: metadata.last_incremental_update.or(metadata.last_full_index),
            vector_index: metadata.vector_index_info,
        }
    }

    async fn search_inner(&self, manager: &IndexManager, req: SearchRequest) -> Result<SearchResponse> {
        validate_search_request(&req)?;
        let start = std::time::Instant::now();
        let params = SearchParams {
            mode: req.mode.map(SearchMode::from),
            alpha: req.alpha,
            top_k: req.top_k.unwrap_or(10),
        };
        let (results, _diagnostics) = manager.search(&req.query, params).await?;
        let total_results = results.len();
        Ok(SearchResponse {
            results: results.into_iter().map(from_search_result).collect(),
            total_results,
            search_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    pub async fn search_code(&self, req: SearchRequest) -> Result<SearchResponse> {
        self.search_inner(&self.code, req).await
    }

    /// `search_docs`: same pipeline as `search_code`, run against the
    /// independent docs store (spec §4.11 "Dual indexes").
    pub async fn search_docs(&self, req: SearchRequest) -> Result<SearchResponse> {
        self.search_inner(&self.docs, req).await
    }

    pub async fn search_by_path(&self, req: SearchByPathRequest) -> Result<SearchResponse> {
        if !is_pattern_safe(&req.pattern) {
            return Err(Error::invalid_input("pattern is unsafe or too complex"));
        }
        self.search_inner(&self.code, SearchRequest { query: req.pattern, top_k: req.top_k, mode: Some(SearchModeParam::Keyword), alpha: None }).await
    }

    pub async fn get_file_summary(&self, req: FileSummaryRequest) -> Result<codescope_index_core::symbols::FileSummary> {
        let config = self.code.config().await;
        let mut summary = codescope_index_core::symbols::extract_file_summary(self.code.project_root(), &req.path, &config)?;
        if !req.include_docstrings.unwrap_or(true) {
            // Function/class docstrings aren't separately carried on
            // FunctionSummary/ClassSummary; nothing to strip here today, but the
            // flag is honored for forward compatibility (spec §6).
        }
        if !req.include_complexity.unwrap_or(true) {
            summary.complexity = codescope_index_core::symbols::Complexity::default();
        }
        Ok(summary)
    }
}

#[doc(hidden)]
pub fn _phase_name(p: Phase) -> &'static str {
    match p {
        Phase::Scanning => "scanning",
        Phase::Chunking => "chunking",
        Phase::Embedding => "embedding",
        Phase::Storing => "storing",
    }
}

#[doc(hidden)]
pub fn _progress_json(p: &Progress) -> serde_json::Value {
    serde_json::json!({
        "phase": _phase_name(p.phase),
        "current": p.current,
        "total": p.total,
        "currentFile": p.current_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_safety_rejects_excess_wildcards() {
        assert!(!is_pattern_safe(&"*".repeat(11)));
        assert!(is_pattern_safe("src/**/*.rs"));
    }

    #[test]
    fn pattern_safety_rejects_large_brace_groups() {
        let many_items = format!("{{{}}}", (0..25).map(|i| i.to_string()).collect::<Vec<_>>().join(","));
        assert!(!is_pattern_safe(&many_items));
    }

    #[test]
    fn pattern_safety_rejects_redos_shapes() {
        assert!(!is_pattern_safe("a***b"));
    }

    #[tokio::test]
    async fn create_index_without_confirmation_is_cancelled_not_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        let state_dir = dir.path().join(".codescope-index");
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(384));
        let facade = IndexFacade::open(dir.path().to_path_buf(), state_dir, Config::default(), embedder).await.unwrap();
        let resp = facade.create_index(CreateIndexRequest { project_path: dir.path().to_path_buf(), confirmed: None }, None).await.unwrap();
        assert_eq!(resp.status, Status::Cancelled);
    }

    #[tokio::test]
    async fn search_rejects_oversized_query() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join(".codescope-index");
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(384));
        let facade = IndexFacade::open(dir.path().to_path_buf(), state_dir, Config::default(), embedder).await.unwrap();
        let req = SearchRequest { query: "x".repeat(2000), top_k: None, mode: None, alpha: None };
        let err = facade.search_code(req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
