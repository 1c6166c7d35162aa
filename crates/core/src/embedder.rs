//! Embedder interface and fastembed-backed implementation (spec §4.5, C5).
//! Architecturally grounded in the donor's `server/src/semantic.rs`
//! (`ModelConfig`/`resolve_model`, multi-worker batch embedding, device
//! selection) but re-targeted onto the `fastembed`+`ort` stack the donor's
//! own `Cargo.toml` declares for the `semantic` feature, rather than the
//! `candle`/`hf_hub` stack that file happened to use.

use crate::error::{Error, ErrorCode, Result};
use crate::types::EmbedKind;

/// `embed`/`embed_batch` contract (spec §4.5). A failed individual embedding
/// must never become a zero vector — callers skip it and count it in
/// `failedChunkCount`.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;

    fn embed(&self, text: &str, kind: EmbedKind) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()], kind);
        results.pop().unwrap_or_else(|| Err(Error::new(ErrorCode::EmbeddingFailed, "empty batch result")))
    }

    fn embed_batch(&self, texts: &[String], kind: EmbedKind) -> Vec<Result<Vec<f32>>>;
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: &'static str,
    pub dimension: usize,
    pub passage_prefix: &'static str,
    pub query_prefix: &'static str,
}

/// Mirrors the donor's `resolve_model`: a small code-oriented default plus
/// larger docs-oriented alternatives, each with fixed output dimension.
pub fn resolve_model(name: &str) -> ModelSpec {
    match name {
        "codebert" => ModelSpec { name: "codebert", dimension: 768, passage_prefix: "", query_prefix: "" },
        "starencoder" => ModelSpec { name: "starencoder", dimension: 768, passage_prefix: "", query_prefix: "" },
        _ => ModelSpec { name: "minilm", dimension: 384, passage_prefix: "passage: ", query_prefix: "query: " },
    }
}

fn validate_dimension(spec: &ModelSpec, vec: &[f32]) -> Result<()> {
    if vec.len() != spec.dimension {
        return Err(Error::new(
            ErrorCode::EmbeddingDimensionMismatch,
            "embedding dimension mismatch",
        )
        .with_developer(format!("model {} expected {} got {}", spec.name, spec.dimension, vec.len())));
    }
    if vec.iter().any(|v| !v.is_finite()) {
        return Err(Error::new(ErrorCode::EmbeddingFailed, "embedding contained NaN or infinite values"));
    }
    Ok(())
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[cfg(feature = "semantic")]
pub struct FastEmbedEmbedder {
    spec: ModelSpec,
    model: std::sync::Mutex<fastembed::TextEmbedding>,
}

/// The `fastembed::EmbeddingModel` backing each preset in `resolve_model`,
/// keyed off `spec.name` rather than the caller's raw input so a name that
/// collapses to the `minilm` preset also gets the `minilm` backend — the
/// dimension `resolve_model` advertises and the vectors the model actually
/// produces can never drift apart.
#[cfg(feature = "semantic")]
fn backend_for(spec_name: &str) -> fastembed::EmbeddingModel {
    match spec_name {
        "codebert" | "starencoder" => fastembed::EmbeddingModel::NomicEmbedTextV15,
        _ => fastembed::EmbeddingModel::AllMiniLML6V2,
    }
}

#[cfg(feature = "semantic")]
impl FastEmbedEmbedder {
    pub fn load(model_name: &str) -> Result<Self> {
        let spec = resolve_model(model_name);
        let init_options = fastembed::InitOptions::new(backend_for(spec.name)).with_show_download_progress(false);
        let model = fastembed::TextEmbedding::try_new(init_options).map_err(|e| {
            Error::new(ErrorCode::EmbeddingFailed, "failed to load embedding model").with_developer(e.to_string())
        })?;
        Ok(Self { spec, model: std::sync::Mutex::new(model) })
    }
}

#[cfg(feature = "semantic")]
impl Embedder for FastEmbedEmbedder {
    fn dimension(&self) -> usize {
        self.spec.dimension
    }

    fn model_name(&self) -> &str {
        self.spec.name
    }

    fn embed_batch(&self, texts: &[String], kind: EmbedKind) -> Vec<Result<Vec<f32>>> {
        let prefix = match kind {
            EmbedKind::Document => self.spec.passage_prefix,
            EmbedKind::Query => self.spec.query_prefix,
        };
        let prefixed: Vec<String> = texts.iter().map(|t| format!("{prefix}{t}")).collect();

        let model = match self.model.lock() {
            Ok(m) => m,
            Err(_) => {
                return texts
                    .iter()
                    .map(|_| Err(Error::new(ErrorCode::EmbeddingFailed, "embedder lock poisoned")))
                    .collect()
            }
        };

        match model.embed(prefixed, None) {
            Ok(vectors) => vectors
                .into_iter()
                .map(|v| {
                    let v = l2_normalize(v);
                    validate_dimension(&self.spec, &v)?;
                    Ok(v)
                })
                .collect(),
            Err(e) => {
                let msg = e.to_string();
                texts.iter().map(|_| Err(Error::new(ErrorCode::EmbeddingFailed, "embedding failed").with_developer(msg.clone()))).collect()
            }
        }
    }
}

/// Deterministic embedder used in tests and as a last-resort fallback when
/// no model backend is compiled in: hashes tokens into a fixed-width vector.
/// Never used for real search quality, only to keep the rest of the pipeline
/// exercisable without downloading model weights.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing-fallback"
    }

    fn embed_batch(&self, texts: &[String], _kind: EmbedKind) -> Vec<Result<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                let mut v = vec![0f32; self.dimension];
                for (i, token) in text.split_whitespace().enumerate() {
                    let mut hasher = std::collections::hash_map::DefaultHasher::new();
                    use std::hash::{Hash, Hasher};
                    token.hash(&mut hasher);
                    i.hash(&mut hasher);
                    let h = hasher.finish();
                    v[(h as usize) % self.dimension] += 1.0;
                }
                Ok(l2_normalize(v))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_embedder_produces_correct_dimension_and_no_zero_vector_for_nonempty_text() {
        let e = HashingEmbedder::new(32);
        let v = e.embed("fn authenticate() {}", EmbedKind::Document).unwrap();
        assert_eq!(v.len(), 32);
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn embed_batch_never_silently_drops_failures() {
        let e = HashingEmbedder::new(8);
        let results = e.embed_batch(&["a".into(), "b".into()], EmbedKind::Document);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
