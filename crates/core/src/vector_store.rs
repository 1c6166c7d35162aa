//! Persistent vector store (spec §4.7, C7). New — the donor holds its search
//! index as an in-memory `Vec` rebuilt on every scan (`scan.rs::build_search_index`);
//! this generalizes that shape into a durable columnar table keyed by chunk id,
//! built on the `lancedb`/`arrow-array` stack the donor's own `Cargo.toml`
//! already declares (the donor just never got around to wiring it up).

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use futures::TryStreamExt;

use crate::error::{Error, ErrorCode, Result};
use crate::limits::VECTOR_INDEX_THRESHOLD;
use crate::types::ChunkMetadata;

const TABLE_NAME: &str = "chunks";

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub path: String,
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content_hash: String,
    pub chunk_type: Option<String>,
    pub chunk_name: Option<String>,
    pub parent: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VectorChunkRow {
    pub id: String,
    pub content_hash: String,
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct VectorSearchHit {
    pub id: String,
    pub path: String,
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
    pub metadata: ChunkMetadata,
    /// Distance normalized to `[0, 1]` — higher is more similar (spec §4.7).
    pub score: f64,
}

#[derive(Debug, Clone, Copy)]
pub enum DistanceType {
    L2,
    Cosine,
}

#[derive(Debug, Clone)]
pub struct IvfPqConfig {
    pub num_partitions: u32,
    pub num_sub_vectors: u32,
    pub distance_type: DistanceType,
}

impl IvfPqConfig {
    /// `numPartitions = clamp(sqrt(N), 1, 256)`; `numSubVectors = D/16`
    /// falling back to `D/8` when that would be zero (spec §4.7).
    pub fn derive(row_count: u64, dimension: usize) -> Self {
        let num_partitions = (row_count as f64).sqrt().round().clamp(1.0, 256.0) as u32;
        let num_sub_vectors = if dimension >= 16 {
            (dimension / 16) as u32
        } else {
            (dimension / 8).max(1) as u32
        };
        Self { num_partitions, num_sub_vectors, distance_type: DistanceType::L2 }
    }
}

fn schema(dimension: i32) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension),
            false,
        ),
        Field::new("path", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("start_line", DataType::UInt32, false),
        Field::new("end_line", DataType::UInt32, false),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("chunk_type", DataType::Utf8, true),
        Field::new("chunk_name", DataType::Utf8, true),
        Field::new("parent", DataType::Utf8, true),
        Field::new("tags", DataType::Utf8, true),
    ]))
}

fn records_to_batch(records: &[VectorRecord], dimension: usize, sch: SchemaRef) -> Result<RecordBatch> {
    let ids: StringArray = records.iter().map(|r| Some(r.id.as_str())).collect();
    let paths: StringArray = records.iter().map(|r| Some(r.path.as_str())).collect();
    let texts: StringArray = records.iter().map(|r| Some(r.text.as_str())).collect();
    let starts: UInt32Array = records.iter().map(|r| Some(r.start_line)).collect();
    let ends: UInt32Array = records.iter().map(|r| Some(r.end_line)).collect();
    let hashes: StringArray = records.iter().map(|r| Some(r.content_hash.as_str())).collect();
    let chunk_types: StringArray = records.iter().map(|r| r.chunk_type.as_deref()).collect();
    let chunk_names: StringArray = records.iter().map(|r| r.chunk_name.as_deref()).collect();
    let parents: StringArray = records.iter().map(|r| r.parent.as_deref()).collect();
    let tags: StringArray = records.iter().map(|r| Some(r.tags.join(","))).collect();

    let flat: Vec<Option<f32>> =
        records.iter().flat_map(|r| r.vector.iter().copied().map(Some)).collect();
    let values = Float32Array::from(flat);
    let vector_field = Arc::new(Field::new("item", DataType::Float32, true));
    let vectors = FixedSizeListArray::try_new(vector_field, dimension as i32, Arc::new(values), None)
        .map_err(|e| Error::new(ErrorCode::Unknown, "failed to build vector column").with_developer(e.to_string()))?;

    RecordBatch::try_new(
        sch,
        vec![
            Arc::new(ids),
            Arc::new(vectors),
            Arc::new(paths),
            Arc::new(texts),
            Arc::new(starts),
            Arc::new(ends),
            Arc::new(hashes),
            Arc::new(chunk_types),
            Arc::new(chunk_names),
            Arc::new(parents),
            Arc::new(tags),
        ],
    )
    .map_err(|e| Error::new(ErrorCode::Unknown, "failed to build record batch").with_developer(e.to_string()))
}

fn row_to_hit(batch: &RecordBatch, row: usize, distance: Option<f64>, distance_type: DistanceType) -> VectorSearchHit {
    let col = |name: &str| -> Option<String> {
        let idx = batch.schema().index_of(name).ok()?;
        let arr = batch.column(idx).as_any().downcast_ref::<StringArray>()?;
        if arr.is_null(row) {
            None
        } else {
            Some(arr.value(row).to_string())
        }
    };
    let u32_col = |name: &str| -> u32 {
        let idx = batch.schema().index_of(name).unwrap();
        batch.column(idx).as_any().downcast_ref::<UInt32Array>().unwrap().value(row)
    };

    let metadata = ChunkMetadata {
        kind: col("chunk_type").and_then(|s| serde_json::from_str(&format!("\"{s}\"")).ok()),
        name: col("chunk_name"),
        parent: col("parent"),
        tags: col("tags").map(|s| s.split(',').filter(|t| !t.is_empty()).map(str::to_string).collect()).unwrap_or_default(),
        ..Default::default()
    };

    let score = match distance {
        Some(d) => match distance_type {
            DistanceType::L2 => 1.0 / (1.0 + d),
            DistanceType::Cosine => (1.0 - d / 2.0).clamp(0.0, 1.0),
        },
        None => 1.0,
    };

    VectorSearchHit {
        id: col("id").unwrap_or_default(),
        path: col("path").unwrap_or_default(),
        text: col("text").unwrap_or_default(),
        start_line: u32_col("start_line"),
        end_line: u32_col("end_line"),
        metadata,
        score,
    }
}

pub struct VectorStore {
    connection: lancedb::connection::Connection,
    table: tokio::sync::Mutex<lancedb::Table>,
    dimension: usize,
    distance_type: DistanceType,
}

impl VectorStore {
    /// `open(path, dimension)`: opens the `chunks` table if present, creates
    /// an empty one with the fixed-width vector schema otherwise.
    pub async fn open(path: &std::path::Path, dimension: usize) -> Result<Self> {
        let uri = path.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| Error::new(ErrorCode::IndexCorrupt, "failed to open vector store").with_developer(e.to_string()))?;

        let names = connection.table_names().execute().await.unwrap_or_default();
        let table = if names.iter().any(|n| n == TABLE_NAME) {
            connection
                .open_table(TABLE_NAME)
                .execute()
                .await
                .map_err(|e| Error::new(ErrorCode::IndexCorrupt, "failed to open chunks table").with_developer(e.to_string()))?
        } else {
            let sch = schema(dimension as i32);
            let empty = RecordBatch::new_empty(sch.clone());
            let batches = RecordBatchIterator::new(vec![Ok(empty)], sch);
            connection
                .create_table(TABLE_NAME, Box::new(batches))
                .execute()
                .await
                .map_err(|e| Error::new(ErrorCode::Unknown, "failed to create chunks table").with_developer(e.to_string()))?
        };

        Ok(Self { connection, table: tokio::sync::Mutex::new(table), dimension, distance_type: DistanceType::L2 })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn insert_chunks(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        for r in records {
            if r.vector.len() != self.dimension {
                return Err(Error::new(ErrorCode::EmbeddingDimensionMismatch, "vector dimension mismatch on insert")
                    .with_developer(format!("expected {} got {}", self.dimension, r.vector.len())));
            }
        }
        let sch = schema(self.dimension as i32);
        let batch = records_to_batch(records, self.dimension, sch.clone())?;
        let table = self.table.lock().await;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], sch);
        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to insert chunks").with_developer(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_chunks_by_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let list = ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(",");
        let table = self.table.lock().await;
        table
            .delete(&format!("id IN ({list})"))
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to delete chunks by id").with_developer(e.to_string()))
    }

    pub async fn delete_chunks_by_path(&self, path: &str) -> Result<()> {
        let table = self.table.lock().await;
        table
            .delete(&format!("path = '{}'", path.replace('\'', "''")))
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to delete chunks by path").with_developer(e.to_string()))
    }

    pub async fn get_chunks_for_file(&self, path: &str) -> Result<Vec<VectorChunkRow>> {
        let table = self.table.lock().await;
        let stream = table
            .query()
            .only_if(format!("path = '{}'", path.replace('\'', "''")))
            .execute()
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to query chunks for file").with_developer(e.to_string()))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to collect chunk rows").with_developer(e.to_string()))?;

        let mut rows = Vec::new();
        for batch in &batches {
            let hashes = content_hash_column(batch);
            for row in 0..batch.num_rows() {
                let hit = row_to_hit(batch, row, None, self.distance_type);
                rows.push(VectorChunkRow {
                    id: hit.id,
                    content_hash: hashes.get(&row).cloned().unwrap_or_default(),
                    text: hit.text,
                    start_line: hit.start_line,
                    end_line: hit.end_line,
                    metadata: hit.metadata,
                });
            }
        }
        Ok(rows)
    }

    pub async fn update_chunk_metadata(&self, id: &str, start_line: u32, end_line: u32) -> Result<()> {
        let table = self.table.lock().await;
        table
            .update()
            .only_if(format!("id = '{}'", id.replace('\'', "''")))
            .column("start_line", start_line.to_string())
            .column("end_line", end_line.to_string())
            .execute()
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to update chunk metadata").with_developer(e.to_string()))?;
        Ok(())
    }

    pub async fn search(&self, query_vec: &[f32], k: usize, filter: Option<&str>) -> Result<Vec<VectorSearchHit>> {
        if query_vec.len() != self.dimension {
            return Err(Error::new(ErrorCode::EmbeddingDimensionMismatch, "query vector dimension mismatch"));
        }
        let table = self.table.lock().await;
        let mut query = table.query().nearest_to(query_vec.to_vec()).map_err(|e| {
            Error::new(ErrorCode::Unknown, "failed to build vector query").with_developer(e.to_string())
        })?;
        if let Some(f) = filter {
            query = query.only_if(f.to_string());
        }
        let stream = query
            .limit(k)
            .execute()
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "vector search failed").with_developer(e.to_string()))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to collect search results").with_developer(e.to_string()))?;

        let mut hits = Vec::new();
        for batch in &batches {
            let dist_idx = batch.schema().index_of("_distance").ok();
            for row in 0..batch.num_rows() {
                let distance = dist_idx.and_then(|idx| {
                    batch.column(idx).as_any().downcast_ref::<Float32Array>().map(|a| a.value(row) as f64)
                });
                hits.push(row_to_hit(batch, row, distance, self.distance_type));
            }
        }
        Ok(hits)
    }

    /// Creates an IVF-PQ index once row count crosses `VECTOR_INDEX_THRESHOLD`
    /// (spec §4.7). No-op (returns `Ok(None)`) below the threshold.
    pub async fn maybe_create_vector_index(&self) -> Result<Option<IvfPqConfig>> {
        let table = self.table.lock().await;
        let row_count = table
            .count_rows(None)
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to count rows").with_developer(e.to_string()))?;
        if (row_count as usize) < VECTOR_INDEX_THRESHOLD {
            return Ok(None);
        }
        let cfg = IvfPqConfig::derive(row_count as u64, self.dimension);
        table
            .create_index(&["vector"], lancedb::index::Index::Auto)
            .execute()
            .await
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to create vector index").with_developer(e.to_string()))?;
        Ok(Some(cfg))
    }

    pub async fn row_count(&self) -> Result<usize> {
        let table = self.table.lock().await;
        table
            .count_rows(None)
            .await
            .map(|n| n as usize)
            .map_err(|e| Error::new(ErrorCode::Unknown, "failed to count rows").with_developer(e.to_string()))
    }

    pub fn connection(&self) -> &lancedb::connection::Connection {
        &self.connection
    }
}

/// Map of row index metadata kept around only for `get_chunks_for_file`'s
/// content_hash column (arrow's `StringArray` column lookup is cheap but
/// named so this stays grep-able); kept as a free function rather than
/// duplicating it in `row_to_hit` since only this call site needs it.
pub fn content_hash_column(batch: &RecordBatch) -> HashMap<usize, String> {
    let mut out = HashMap::new();
    if let Ok(idx) = batch.schema().index_of("content_hash") {
        if let Some(arr) = batch.column(idx).as_any().downcast_ref::<StringArray>() {
            for row in 0..batch.num_rows() {
                if !arr.is_null(row) {
                    out.insert(row, arr.value(row).to_string());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, path: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            path: path.to_string(),
            text: format!("text for {id}"),
            start_line: 1,
            end_line: 5,
            content_hash: format!("hash-{id}"),
            chunk_type: Some("function".to_string()),
            chunk_name: Some(id.to_string()),
            parent: None,
            tags: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[tokio::test]
    async fn insert_then_search_finds_nearest_neighbor() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&dir.path().join("vectors.lancedb"), 4).await.unwrap();

        store
            .insert_chunks(&[record("c1", "a.rs", vec![1.0, 0.0, 0.0, 0.0]), record("c2", "b.rs", vec![0.0, 1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c1");
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
    }

    #[tokio::test]
    async fn insert_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&dir.path().join("vectors.lancedb"), 4).await.unwrap();
        let err = store.insert_chunks(&[record("c1", "a.rs", vec![1.0, 0.0])]).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EmbeddingDimensionMismatch);
    }

    #[tokio::test]
    async fn delete_by_path_removes_all_chunks_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&dir.path().join("vectors.lancedb"), 4).await.unwrap();
        store
            .insert_chunks(&[record("c1", "a.rs", vec![1.0, 0.0, 0.0, 0.0]), record("c2", "a.rs", vec![0.0, 1.0, 0.0, 0.0])])
            .await
            .unwrap();
        store.delete_chunks_by_path("a.rs").await.unwrap();
        let rows = store.get_chunks_for_file("a.rs").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn update_chunk_metadata_changes_line_range_without_reinserting() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&dir.path().join("vectors.lancedb"), 4).await.unwrap();
        store.insert_chunks(&[record("c1", "a.rs", vec![1.0, 0.0, 0.0, 0.0])]).await.unwrap();

        store.update_chunk_metadata("c1", 10, 20).await.unwrap();
        let rows = store.get_chunks_for_file("a.rs").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_line, 10);
        assert_eq!(rows[0].end_line, 20);
    }

    #[test]
    fn ivf_pq_config_derives_clamped_partitions_and_subvectors() {
        let cfg = IvfPqConfig::derive(10_000, 384);
        assert_eq!(cfg.num_partitions, 100);
        assert_eq!(cfg.num_sub_vectors, 24);

        let clamped = IvfPqConfig::derive(1_000_000, 384);
        assert_eq!(clamped.num_partitions, 256);
    }
}
