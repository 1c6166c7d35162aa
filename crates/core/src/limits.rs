//! Resource limit constants enforced throughout the crate (spec §5).

pub const MAX_QUERY_LENGTH: usize = 1000;
pub const MAX_GLOB_PATTERN_LENGTH: usize = 200;
pub const MAX_GLOB_PATTERN_WILDCARDS: usize = 10;
pub const MAX_GLOB_BRACE_GROUPS: usize = 5;
pub const MAX_GLOB_BRACE_ITEMS: usize = 20;
pub const MAX_DIRECTORY_DEPTH: usize = 20;
pub const MAX_GLOB_RESULTS: usize = 100_000;
pub const MAX_JSON_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const MAX_CHUNKS_PER_FILE: usize = 1000;
pub const CHUNKS_WARNING_THRESHOLD: f64 = 0.8;
pub const MAX_PENDING_FILE_EVENTS: usize = 1000;
pub const PENDING_FILE_EVENTS_WARNING: f64 = 0.8;

pub const DEFAULT_CHUNK_SIZE: usize = 8000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

pub const GLOB_SCAN_TIMEOUT_SECS: u64 = 30;
pub const REALTIME_DEBOUNCE_MS: u64 = 300;
pub const GIT_DEBOUNCE_MS: u64 = 2000;
pub const PERIODIC_RECONCILE_SECS: u64 = 24 * 60 * 60;

pub const VECTOR_INDEX_THRESHOLD: usize = 10_000;

#[cfg(unix)]
pub const MAX_PATH_LENGTH: usize = 4096;
#[cfg(windows)]
pub const MAX_PATH_LENGTH: usize = 260;
