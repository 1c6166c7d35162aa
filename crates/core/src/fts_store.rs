//! Full-text store (spec §4.8, C8). BM25 over chunk text via `tantivy`. New —
//! the donor has no keyword index (its `fuzzy.rs` does in-memory FZF scoring
//! over file/module names, not chunk text); authored fresh, but in the same
//! "own a single long-lived handle, expose a narrow method surface" idiom the
//! donor's `semantic.rs` uses for its embedding model.

use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{Schema, SchemaBuilder, Value, FAST, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use crate::error::{Error, ErrorCode, Result};

pub struct FtsRecord {
    pub id: String,
    pub path: String,
    pub text: String,
}

pub struct FtsHit {
    pub id: String,
    pub path: String,
    /// Raw BM25 score; callers should run these through `normalize_scores`.
    pub score: f64,
}

#[derive(Default, Clone, Copy)]
pub struct FtsStats {
    pub num_docs: u64,
    pub tombstones: u64,
}

struct Fields {
    id: tantivy::schema::Field,
    path: tantivy::schema::Field,
    text: tantivy::schema::Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = SchemaBuilder::default();
    let id = builder.add_text_field("id", STRING | STORED | FAST);
    let path = builder.add_text_field("path", STRING | STORED | FAST);
    let text = builder.add_text_field("text", TEXT | STORED);
    (builder.build(), Fields { id, path, text })
}

/// BM25 full-text index over chunk text, persisted to `dir`. Tantivy does not
/// support in-place document update, only delete-by-term followed by a fresh
/// add, so `add_chunks` for a path already indexed first tombstones the old
/// documents via `remove_by_path`.
pub struct FtsStore {
    index: Index,
    fields: Fields,
    reader: IndexReader,
    writer: RwLock<IndexWriter>,
    /// Paths removed since the writer's last `commit`/`reload`, so `search`
    /// can filter out documents the reader hasn't caught up on yet.
    tombstoned_paths: RwLock<HashSet<String>>,
}

impl FtsStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::new(ErrorCode::PermissionDenied, "could not create fts directory").with_developer(e.to_string()))?;

        let (schema, fields) = build_schema();
        let mmap_dir = MmapDirectory::open(dir)
            .map_err(|e| Error::new(ErrorCode::IndexCorrupt, "failed to open fts directory").with_developer(e.to_string()))?;

        let index = if Index::exists(&mmap_dir).unwrap_or(false) {
            Index::open(mmap_dir).map_err(|e| {
                Error::new(ErrorCode::IndexCorrupt, "failed to open fts index").with_developer(e.to_string())
            })?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default()).map_err(|e| {
                Error::new(ErrorCode::Unknown, "failed to create fts index").with_developer(e.to_string())
            })?
        };

        let writer = index
            .writer(50_000_000)
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to open fts writer").with_developer(e.to_string()))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: tantivy::TantivyError| Error::new(ErrorCode::Unknown, "failed to open fts reader").with_developer(e.to_string()))?;

        Ok(Self { index, fields, reader, writer: RwLock::new(writer), tombstoned_paths: RwLock::new(HashSet::new()) })
    }

    pub fn add_chunks(&self, records: &[FtsRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.write().unwrap();
        for r in records {
            writer
                .add_document(doc!(
                    self.fields.id => r.id.clone(),
                    self.fields.path => r.path.clone(),
                    self.fields.text => r.text.clone(),
                ))
                .map_err(|e| Error::new(ErrorCode::Unknown, "failed to add fts document").with_developer(e.to_string()))?;
        }
        writer
            .commit()
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to commit fts writer").with_developer(e.to_string()))?;
        drop(writer);
        self.tombstoned_paths.write().unwrap().clear();
        self.reader
            .reload()
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to reload fts reader").with_developer(e.to_string()))
    }

    /// Removes every document for `path`. Tantivy deletes are term-based and
    /// only visible to readers after commit/reload; until that happens the
    /// path is kept in an in-memory tombstone set that `search` consults, so
    /// callers observe the deletion immediately even if the index segment
    /// merge lags (spec §4.8 "maintain a deletion-tombstone set").
    pub fn remove_by_path(&self, path: &str) -> Result<()> {
        let mut writer = self.writer.write().unwrap();
        let term = tantivy::Term::from_field_text(self.fields.path, path);
        writer.delete_term(term);
        writer
            .commit()
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to commit fts delete").with_developer(e.to_string()))?;
        drop(writer);
        self.tombstoned_paths.write().unwrap().insert(path.to_string());
        self.reader
            .reload()
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to reload fts reader after delete").with_developer(e.to_string()))?;
        self.tombstoned_paths.write().unwrap().remove(path);
        Ok(())
    }

    pub fn search(&self, query_text: &str, k: usize) -> Result<Vec<FtsHit>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
        let query = parser
            .parse_query(&sanitize_query_text(query_text))
            .map_err(|e| Error::new(ErrorCode::InvalidInput, "invalid search query").with_developer(e.to_string()))?;

        let tombstoned = self.tombstoned_paths.read().unwrap();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(k + tombstoned.len()))
            .map_err(|e| Error::new(ErrorCode::Unknown, "fts search failed").with_developer(e.to_string()))?;

        let mut hits = Vec::new();
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| Error::new(ErrorCode::Unknown, "failed to fetch fts document").with_developer(e.to_string()))?;
            let id = doc.get_first(self.fields.id).and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let path = doc.get_first(self.fields.path).and_then(|v| v.as_str()).unwrap_or_default().to_string();
            if tombstoned.contains(&path) {
                continue;
            }
            hits.push(FtsHit { id, path, score: score as f64 });
            if hits.len() >= k {
                break;
            }
        }
        Ok(hits)
    }

    pub fn get_stats(&self) -> FtsStats {
        let searcher = self.reader.searcher();
        FtsStats { num_docs: searcher.num_docs(), tombstones: self.tombstoned_paths.read().unwrap().len() as u64 }
    }

    pub fn close(self) {
        drop(self);
    }
}

/// Normalizes raw BM25 scores to `[0,1]` via min-max (spec §4.8).
pub fn normalize_scores(hits: &[FtsHit]) -> Vec<f64> {
    if hits.is_empty() {
        return Vec::new();
    }
    let max = hits.iter().map(|h| h.score).fold(f64::MIN, f64::max);
    let min = hits.iter().map(|h| h.score).fold(f64::MAX, f64::min);
    let range = (max - min).max(f64::EPSILON);
    hits.iter().map(|h| (h.score - min) / range).collect()
}

fn sanitize_query_text(q: &str) -> String {
    // QueryParser treats `:`, `"`, `(`, `)`, `*`, `^`, `~`, `-`, `+` as syntax.
    // A raw keyword query should not let a user's arbitrary string parse as a
    // field query or boolean operator, so strip everything but
    // alphanumerics/whitespace before handing it to the parser.
    q.chars().map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_search_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FtsStore::open(dir.path()).unwrap();
        store
            .add_chunks(&[
                FtsRecord { id: "1".into(), path: "a.rs".into(), text: "fn authenticate user login".into() },
                FtsRecord { id: "2".into(), path: "b.rs".into(), text: "fn render widget".into() },
            ])
            .unwrap();

        let hits = store.search("authenticate", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "a.rs");
    }

    #[test]
    fn remove_by_path_hides_results_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = FtsStore::open(dir.path()).unwrap();
        store.add_chunks(&[FtsRecord { id: "1".into(), path: "a.rs".into(), text: "login handler".into() }]).unwrap();
        assert_eq!(store.search("login", 10).unwrap().len(), 1);
        store.remove_by_path("a.rs").unwrap();
        assert_eq!(store.search("login", 10).unwrap().len(), 0);
    }

    #[test]
    fn normalize_scores_maps_into_unit_interval() {
        let hits = vec![
            FtsHit { id: "1".into(), path: "a".into(), score: 1.0 },
            FtsHit { id: "2".into(), path: "b".into(), score: 3.0 },
        ];
        let norm = normalize_scores(&hits);
        assert_eq!(norm[0], 0.0);
        assert_eq!(norm[1], 1.0);
    }
}
