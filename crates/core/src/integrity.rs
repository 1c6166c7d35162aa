//! Integrity/reconciliation engine (spec §4.13, C14). New — the donor has no
//! drift-detection pass (it just rescans unconditionally); authored fresh,
//! reusing `index_manager::walk_project` and `fingerprints::is_stale` rather
//! than duplicating the walk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::fingerprints::load_fingerprints;
use crate::hashing::file_content_hash;
use crate::index_manager::{walk_project, IndexManager};
use crate::limits::GLOB_SCAN_TIMEOUT_SECS;
use crate::policy::Policy;
use crate::types::Fingerprint;

#[derive(Debug, Clone, Default)]
pub struct Drift {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub in_sync: bool,
    pub last_checked: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub success: bool,
    pub files_added: usize,
    pub files_modified: usize,
    pub files_removed: usize,
    pub duration_ms: u64,
}

/// Shared flag the watcher polls to suppress event processing during a full
/// rebuild or reconciliation, and that reconciliation refuses to start under
/// if the watcher already holds it (spec §4.13/§5).
pub struct IndexingActiveFlag(AtomicBool);

impl IndexingActiveFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
    pub fn try_acquire(&self) -> bool {
        self.0.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }
    pub fn release(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for IndexingActiveFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub struct IntegrityEngine {
    manager: std::sync::Arc<IndexManager>,
    policy: Policy,
    flush_lock: tokio::sync::Mutex<()>,
    active_flag: std::sync::Arc<IndexingActiveFlag>,
}

impl IntegrityEngine {
    pub fn new(manager: std::sync::Arc<IndexManager>, active_flag: std::sync::Arc<IndexingActiveFlag>) -> Result<Self> {
        let policy = Policy::load(manager.project_root())
            .map_err(|e| crate::error::Error::new(crate::error::ErrorCode::PermissionDenied, "could not load policy").with_developer(e.to_string()))?;
        Ok(Self { manager, policy, flush_lock: tokio::sync::Mutex::new(()), active_flag })
    }

    /// `check_drift()`: scans current state vs stored fingerprints under the
    /// same bounded walk used by full indexing.
    pub fn check_drift(&self) -> Result<Drift> {
        let deadline = Instant::now() + Duration::from_secs(GLOB_SCAN_TIMEOUT_SECS);
        let files = walk_project(self.manager.project_root(), &self.policy, deadline)?;
        let fingerprints = load_fingerprints(&self.manager.paths.fingerprints_json())?;

        let mut added = Vec::new();
        let mut modified = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for rel in &files {
            seen.insert(rel.clone());
            let abs = crate::path_safety::to_absolute(rel, self.manager.project_root());
            let Ok(bytes) = std::fs::read(&abs) else { continue };
            let Ok(meta) = std::fs::metadata(&abs) else { continue };
            let mtime = meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64).unwrap_or(0);
            let current = Fingerprint { hash: file_content_hash(&bytes), size: meta.len(), mtime };

            match fingerprints.get(rel) {
                None => added.push(rel.clone()),
                Some(stored) if stored != &current => modified.push(rel.clone()),
                _ => {}
            }
        }

        let removed: Vec<String> = fingerprints.keys().filter(|p| !seen.contains(*p)).cloned().collect();
        let in_sync = added.is_empty() && modified.is_empty() && removed.is_empty();

        Ok(Drift { added, modified, removed, in_sync, last_checked: unix_now() })
    }

    /// `reconcile(drift)`: applies drift through the `IndexManager`. Refuses
    /// to run concurrently with itself (`flush_lock`) or while a full index
    /// holds `isIndexingActive` (spec §4.13/§5).
    pub async fn reconcile(&self, drift: &Drift) -> Result<ReconcileOutcome> {
        let _flush_guard = self.flush_lock.try_lock();
        let Ok(_flush_guard) = _flush_guard else {
            return Ok(ReconcileOutcome::default());
        };
        if !self.active_flag.try_acquire() {
            return Ok(ReconcileOutcome::default());
        }

        let start = Instant::now();
        let mut outcome = ReconcileOutcome { success: true, ..Default::default() };

        for path in &drift.removed {
            match self.manager.delete_file(path).await {
                Ok(()) => outcome.files_removed += 1,
                Err(e) => {
                    tracing::warn!(path, error = %e, "reconciliation failed to remove file, will retry next tick");
                    outcome.success = false;
                }
            }
        }
        for path in &drift.added {
            match self.manager.update_file(path).await {
                Ok(_) => outcome.files_added += 1,
                Err(e) => {
                    tracing::warn!(path, error = %e, "reconciliation failed to add file, will retry next tick");
                    outcome.success = false;
                }
            }
        }
        for path in &drift.modified {
            match self.manager.update_file(path).await {
                Ok(_) => outcome.files_modified += 1,
                Err(e) => {
                    tracing::warn!(path, error = %e, "reconciliation failed to update file, will retry next tick");
                    outcome.success = false;
                }
            }
        }

        self.active_flag.release();
        outcome.duration_ms = start.elapsed().as_millis() as u64;
        Ok(outcome)
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

pub fn periodic_interval() -> Duration {
    Duration::from_secs(crate::limits::PERIODIC_RECONCILE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_active_flag_is_exclusive() {
        let flag = IndexingActiveFlag::new();
        assert!(flag.try_acquire());
        assert!(!flag.try_acquire());
        flag.release();
        assert!(flag.try_acquire());
    }
}
