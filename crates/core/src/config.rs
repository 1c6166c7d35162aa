//! User-tunable configuration (spec §3 Config), loaded from `config.json`
//! under the per-project state directory, or merged from a `.codescope-index.toml`
//! at project root — mirroring the donor's `toml::Table` parsing idiom in
//! `init.rs`/`main.rs` for the TOML side, and the donor's JSON-everywhere
//! persisted state for the canonical on-disk copy.

use serde::{Deserialize, Serialize};

use crate::limits::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, MAX_CHUNKS_PER_FILE};
use crate::types::SearchMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_chunks_per_file: usize,
    pub embedding_model: String,
    pub hybrid_mode: HybridModeConfig,
    pub ranking_weights: RankingWeights,
    pub gpu_preference: GpuPreference,
    pub indexing_strategy: IndexingStrategyKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_chunks_per_file: MAX_CHUNKS_PER_FILE,
            embedding_model: "minilm".to_string(),
            hybrid_mode: HybridModeConfig::default(),
            ranking_weights: RankingWeights::default(),
            gpu_preference: GpuPreference::Auto,
            indexing_strategy: IndexingStrategyKind::Realtime,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridModeConfig {
    pub mode: SearchModeConfig,
    pub alpha: f64,
}

impl Default for HybridModeConfig {
    fn default() -> Self {
        Self { mode: SearchModeConfig::Hybrid, alpha: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchModeConfig {
    Vector,
    Keyword,
    Hybrid,
}

impl From<SearchModeConfig> for SearchMode {
    fn from(m: SearchModeConfig) -> Self {
        match m {
            SearchModeConfig::Vector => SearchMode::Vector,
            SearchModeConfig::Keyword => SearchMode::Keyword,
            SearchModeConfig::Hybrid => SearchMode::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub chunk_type_min: f64,
    pub chunk_type_max: f64,
    pub name_match_min: f64,
    pub name_match_max: f64,
    pub path_relevance_min: f64,
    pub path_relevance_max: f64,
    pub tag_overlap_min: f64,
    pub tag_overlap_max: f64,
    pub docstring_min: f64,
    pub docstring_max: f64,
    pub complexity_min: f64,
    pub complexity_max: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            chunk_type_min: 0.92,
            chunk_type_max: 1.3,
            name_match_min: 1.0,
            name_match_max: 1.4,
            path_relevance_min: 1.0,
            path_relevance_max: 1.2,
            tag_overlap_min: 1.0,
            tag_overlap_max: 1.3,
            docstring_min: 1.0,
            docstring_max: 1.05,
            complexity_min: 0.95,
            complexity_max: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuPreference {
    Auto,
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingStrategyKind {
    Realtime,
    Lazy,
    Git,
}

impl Config {
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                crate::error::Error::new(crate::error::ErrorCode::IndexCorrupt, "config.json is corrupt")
                    .with_developer(e.to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(crate::error::Error::new(crate::error::ErrorCode::PermissionDenied, "could not read config")
                .with_developer(e.to_string())),
        }
    }

    /// Merge project-root `.codescope-index.toml` overrides on top of `self`,
    /// field by field, the way the donor's ecosystem detector layers TOML
    /// values over defaults in `init.rs`.
    pub fn merge_toml_overrides(mut self, project_root: &std::path::Path) -> Self {
        let toml_path = project_root.join(".codescope-index.toml");
        let Ok(raw) = std::fs::read_to_string(&toml_path) else {
            return self;
        };
        let Ok(table) = raw.parse::<toml::Table>() else {
            return self;
        };
        if let Some(v) = table.get("chunk_size").and_then(|v| v.as_integer()) {
            self.chunk_size = v.max(1) as usize;
        }
        if let Some(v) = table.get("chunk_overlap").and_then(|v| v.as_integer()) {
            self.chunk_overlap = v.max(0) as usize;
        }
        if let Some(v) = table.get("embedding_model").and_then(|v| v.as_str()) {
            self.embedding_model = v.to_string();
        }
        if let Some(v) = table.get("alpha").and_then(|v| v.as_float()) {
            self.hybrid_mode.alpha = v.clamp(0.0, 1.0);
        }
        self
    }

    pub fn save(&self, path: &std::path::Path) -> crate::error::Result<()> {
        crate::path_safety::write_json_atomic(path, self)
    }
}
