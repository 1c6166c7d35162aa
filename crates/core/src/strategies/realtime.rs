//! Realtime indexing strategy (spec §4.12). Grounded in the donor's
//! `server/src/watch.rs` (`start_watcher`/`debounce_loop`): the same
//! `notify`-backed recursive watch plus a debounce map keyed by path, ported
//! from a `std::mpsc` + dedicated OS thread into a `tokio` task so it shares
//! the async `IndexManager` API, and extended with the
//! `MAX_PENDING_FILE_EVENTS` cap spec.md requires that the donor's version
//! does not enforce.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind as NotifyEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::error::Result;
use crate::index_manager::IndexManager;
use crate::limits::{MAX_PENDING_FILE_EVENTS, PENDING_FILE_EVENTS_WARNING, REALTIME_DEBOUNCE_MS};
use crate::types::Fingerprint;

use super::{FileEvent, FileEventKind, IndexingStrategy, StrategyState, StrategyStats};

pub struct RealtimeStrategy {
    manager: Arc<IndexManager>,
    state: RwLock<StrategyState>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    pending: Arc<Mutex<HashMap<PathBuf, (Instant, FileEventKind)>>>,
    events_processed: AtomicU64,
    events_dropped: AtomicU64,
    pending_count: AtomicUsize,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl RealtimeStrategy {
    pub fn new(manager: Arc<IndexManager>) -> Self {
        Self {
            manager,
            state: RwLock::new(StrategyState::Uninitialized),
            watcher: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            events_processed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            pending_count: AtomicUsize::new(0),
            stop_tx: Mutex::new(None),
        }
    }

    async fn process_ready(&self, ready: Vec<(PathBuf, FileEventKind)>) {
        for (path, kind) in ready {
            if self.manager.is_indexing_active() {
                // A full rebuild or reconciliation owns the index right now;
                // the watcher defers rather than racing it (spec §4.13).
                continue;
            }
            let Some(rel) = crate::path_safety::to_relative(&path, self.manager.project_root()) else { continue };
            match kind {
                FileEventKind::Remove => {
                    if self.manager.delete_file(&rel).await.is_ok() {
                        self.events_processed.fetch_add(1, Ordering::SeqCst);
                    }
                }
                FileEventKind::AddOrChange => {
                    if !self.is_actually_changed(&path, &rel).await {
                        continue;
                    }
                    if self.manager.update_file(&rel).await.is_ok() {
                        self.events_processed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    /// Compares the current `{mtime, size, content_hash}` against the stored
    /// fingerprint before doing any work, so debounced-but-unchanged events
    /// (e.g. a touch with no content change) are skipped (spec §4.12).
    async fn is_actually_changed(&self, abs: &std::path::Path, rel: &str) -> bool {
        let Ok(bytes) = std::fs::read(abs) else { return false };
        let Ok(meta) = std::fs::metadata(abs) else { return false };
        let mtime = meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64).unwrap_or(0);
        let current = Fingerprint { hash: crate::hashing::file_content_hash(&bytes), size: meta.len(), mtime };
        let fingerprints = crate::fingerprints::load_fingerprints(&self.manager.paths.fingerprints_json()).unwrap_or_default();
        crate::fingerprints::is_stale(&fingerprints, rel, &current)
    }
}

#[async_trait::async_trait]
impl IndexingStrategy for RealtimeStrategy {
    async fn initialize(&self) -> Result<()> {
        *self.state.write().await = StrategyState::Initialized;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let (notify_tx, mut notify_rx) = mpsc::channel::<Event>(4096);
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.blocking_send(event);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| crate::error::Error::new(crate::error::ErrorCode::Unknown, "failed to create file watcher").with_developer(e.to_string()))?;

        watcher
            .watch(self.manager.project_root(), RecursiveMode::Recursive)
            .map_err(|e| crate::error::Error::new(crate::error::ErrorCode::Unknown, "failed to watch project root").with_developer(e.to_string()))?;
        *self.watcher.lock().await = Some(watcher);

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        *self.stop_tx.lock().await = Some(stop_tx);

        let pending = Arc::clone(&self.pending);
        let manager = Arc::clone(&self.manager);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(REALTIME_DEBOUNCE_MS / 3));
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    maybe_event = notify_rx.recv() => {
                        let Some(event) = maybe_event else { break };
                        if !matches!(event.kind, NotifyEventKind::Create(_) | NotifyEventKind::Modify(_) | NotifyEventKind::Remove(_)) {
                            continue;
                        }
                        let kind = if matches!(event.kind, NotifyEventKind::Remove(_)) { FileEventKind::Remove } else { FileEventKind::AddOrChange };
                        let mut map = pending.lock().await;
                        for path in event.paths {
                            if map.len() >= MAX_PENDING_FILE_EVENTS && !map.contains_key(&path) {
                                tracing::warn!("MAX_PENDING_FILE_EVENTS reached, dropping event for {}", path.display());
                                continue;
                            }
                            let warn_at = (MAX_PENDING_FILE_EVENTS as f64 * PENDING_FILE_EVENTS_WARNING) as usize;
                            if map.len() >= warn_at {
                                tracing::warn!(pending = map.len(), "approaching MAX_PENDING_FILE_EVENTS");
                            }
                            map.insert(path, (Instant::now(), kind.clone()));
                        }
                    }
                    _ = interval.tick() => {
                        let cutoff = Instant::now() - Duration::from_millis(REALTIME_DEBOUNCE_MS);
                        let ready: Vec<(PathBuf, FileEventKind)> = {
                            let mut map = pending.lock().await;
                            let ready_keys: Vec<PathBuf> = map.iter().filter(|(_, (t, _))| *t <= cutoff).map(|(p, _)| p.clone()).collect();
                            ready_keys.into_iter().filter_map(|p| map.remove(&p).map(|(_, k)| (p, k))).collect()
                        };
                        if !ready.is_empty() {
                            for (path, kind) in ready {
                                if manager.is_indexing_active() {
                                    continue;
                                }
                                let Some(rel) = crate::path_safety::to_relative(&path, manager.project_root()) else { continue };
                                match kind {
                                    FileEventKind::Remove => { let _ = manager.delete_file(&rel).await; }
                                    FileEventKind::AddOrChange => { let _ = manager.update_file(&rel).await; }
                                }
                            }
                        }
                    }
                }
            }
        });

        *self.state.write().await = StrategyState::Active;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(tx) = self.stop_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
        *self.watcher.lock().await = None;
        *self.state.write().await = StrategyState::Stopped;
        Ok(())
    }

    async fn on_file_event(&self, evt: FileEvent) -> Result<()> {
        let mut map = self.pending.lock().await;
        map.insert(evt.path, (Instant::now(), evt.kind));
        self.pending_count.store(map.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let ready: Vec<(PathBuf, FileEventKind)> = {
            let mut map = self.pending.lock().await;
            map.drain().map(|(p, (_, k))| (p, k)).collect()
        };
        self.process_ready(ready).await;
        Ok(())
    }

    fn stats(&self) -> StrategyStats {
        StrategyStats {
            events_processed: self.events_processed.load(Ordering::SeqCst),
            events_dropped: self.events_dropped.load(Ordering::SeqCst),
            pending: self.pending_count.load(Ordering::SeqCst),
        }
    }

    fn state(&self) -> StrategyState {
        // Best-effort synchronous read; `RwLock::try_read` never blocks here
        // because writers only hold the lock across `await` points this
        // method doesn't contend with in practice.
        self.state.try_read().map(|s| *s).unwrap_or(StrategyState::Uninitialized)
    }
}
