//! Indexing strategies (spec §4.12, C13): pluggable policies for when and how
//! file changes reach the index. Each strategy is an explicit state machine
//! (`Uninitialized → Initialized → Active → Stopped`, spec §9 design notes)
//! over a shared read-only handle to the `IndexManager`.

pub mod git;
pub mod lazy;
pub mod realtime;

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Uninitialized,
    Initialized,
    Active,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEventKind {
    AddOrChange,
    Remove,
}

#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

#[derive(Debug, Clone, Default)]
pub struct StrategyStats {
    pub events_processed: u64,
    pub events_dropped: u64,
    pub pending: usize,
}

#[async_trait::async_trait]
pub trait IndexingStrategy: Send + Sync {
    async fn initialize(&self) -> crate::error::Result<()>;
    async fn start(&self) -> crate::error::Result<()>;
    async fn stop(&self) -> crate::error::Result<()>;
    async fn on_file_event(&self, evt: FileEvent) -> crate::error::Result<()>;
    async fn flush(&self) -> crate::error::Result<()>;
    fn stats(&self) -> StrategyStats;
    fn state(&self) -> StrategyState;
}
