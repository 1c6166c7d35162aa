//! Hybrid search fusion + multi-factor ranker (spec §4.10, C12). New — the
//! donor's only ranking is `fuzzy.rs`'s FZF score; this generalizes "one
//! score, one pass" into RRF fusion across two modalities plus the
//! metadata-driven boost chain spec.md requires, in the same small-pure-
//! function style `fuzzy.rs` scores candidates with.

use std::collections::HashMap;

use crate::config::RankingWeights;
use crate::query::{IntentCategory, IntentMatch};
use crate::types::{ChunkKind, ChunkMetadata, SearchResult};

pub const RRF_K: f64 = 60.0;
pub const OVERSAMPLE: usize = 3;

#[derive(Debug, Clone)]
pub struct FusionCandidate {
    pub id: String,
    pub path: String,
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
    pub metadata: ChunkMetadata,
    pub vector_rank: Option<usize>,
    pub vector_score: Option<f64>,
    pub fts_rank: Option<usize>,
    pub fts_score: Option<f64>,
}

/// Reciprocal Rank Fusion, weighted by `alpha` (vector) / `1-alpha` (keyword).
/// When one modality returned nothing for this query, the other modality's
/// scores pass through unweighted rather than being scaled by a zero-result
/// side's implicit zero (spec §9 Open Question, resolved in DESIGN.md).
pub fn fuse(candidates: &[FusionCandidate], alpha: f64) -> HashMap<String, f64> {
    let any_vector = candidates.iter().any(|c| c.vector_rank.is_some());
    let any_fts = candidates.iter().any(|c| c.fts_rank.is_some());

    let (w_vec, w_fts) = match (any_vector, any_fts) {
        (true, true) => (alpha, 1.0 - alpha),
        (true, false) => (1.0, 0.0),
        (false, true) => (0.0, 1.0),
        (false, false) => (0.0, 0.0),
    };

    candidates
        .iter()
        .map(|c| {
            let vec_term = c.vector_rank.map(|r| w_vec / (RRF_K + r as f64)).unwrap_or(0.0);
            let fts_term = c.fts_rank.map(|r| w_fts / (RRF_K + r as f64)).unwrap_or(0.0);
            (c.id.clone(), vec_term + fts_term)
        })
        .collect()
}

fn tokenize_name(s: &str) -> Vec<String> {
    crate::query::tokenize(s)
}

/// `name_match_boost`: CamelCase/snake_case token overlap between the query
/// and the chunk's symbol name.
fn name_match_boost(query_tokens: &[String], metadata: &ChunkMetadata, weights: &RankingWeights) -> f64 {
    let Some(name) = &metadata.name else { return 1.0 };
    let name_tokens = tokenize_name(name);
    if name_tokens.is_empty() || query_tokens.is_empty() {
        return 1.0;
    }
    let overlap = name_tokens.iter().filter(|t| query_tokens.contains(t)).count();
    let ratio = overlap as f64 / name_tokens.len() as f64;
    weights.name_match_min + ratio * (weights.name_match_max - weights.name_match_min)
}

/// `path_relevance`: query tokens appearing in the path's own components.
fn path_relevance_boost(query_tokens: &[String], path: &str, weights: &RankingWeights) -> f64 {
    if query_tokens.is_empty() {
        return 1.0;
    }
    let path_tokens: Vec<String> = path.split(['/', '\\', '.', '_', '-']).map(|s| s.to_ascii_lowercase()).collect();
    let hits = query_tokens.iter().filter(|t| path_tokens.iter().any(|p| p == *t)).count();
    if hits == 0 {
        return weights.path_relevance_min;
    }
    let ratio = (hits as f64 / query_tokens.len() as f64).min(1.0);
    weights.path_relevance_min + ratio * (weights.path_relevance_max - weights.path_relevance_min)
}

/// `tag_overlap`: overlap between detected intents and the chunk's tags.
fn tag_overlap_boost(intents: &[IntentMatch], metadata: &ChunkMetadata, weights: &RankingWeights) -> f64 {
    if intents.is_empty() || metadata.tags.is_empty() {
        return 1.0;
    }
    let intent_names: Vec<&str> = intents.iter().map(|i| i.category.as_str()).collect();
    let hits = metadata.tags.iter().filter(|t| intent_names.iter().any(|n| n.eq_ignore_ascii_case(t))).count();
    if hits == 0 {
        return 1.0;
    }
    let ratio = (hits as f64 / metadata.tags.len() as f64).min(1.0);
    weights.tag_overlap_min + ratio * (weights.tag_overlap_max - weights.tag_overlap_min)
}

fn docstring_bonus(metadata: &ChunkMetadata, weights: &RankingWeights) -> f64 {
    if metadata.docstring.as_ref().is_some_and(|d| !d.trim().is_empty()) {
        weights.docstring_max
    } else {
        weights.docstring_min
    }
}

/// `complexity_penalty`: chunks split into multiple `part`s (i.e. originally
/// oversized) are penalized slightly, since they are less likely to be a
/// single coherent answer.
fn complexity_penalty(metadata: &ChunkMetadata, weights: &RankingWeights) -> f64 {
    if metadata.part.is_some() {
        weights.complexity_min
    } else {
        weights.complexity_max
    }
}

/// `chunk_type_boost`: intents matching `FUNCTION`/`CLASS` favor the
/// corresponding chunk kind.
fn chunk_type_boost(intents: &[IntentMatch], metadata: &ChunkMetadata, weights: &RankingWeights) -> f64 {
    let Some(kind) = metadata.kind else { return 1.0 };
    let wants = |cat: IntentCategory| intents.iter().any(|i| i.category == cat);

    let matches = match kind {
        ChunkKind::Function | ChunkKind::Method => wants(IntentCategory::Function),
        ChunkKind::Class | ChunkKind::Struct | ChunkKind::Interface | ChunkKind::Trait => wants(IntentCategory::Class),
        _ => false,
    };
    if intents.is_empty() {
        1.0
    } else if matches {
        weights.chunk_type_max
    } else {
        weights.chunk_type_min
    }
}

/// Applies every multi-factor boost to a base fused score. Boosts default to
/// 1.0 whenever the relevant metadata is missing (spec §4.10).
pub fn apply_boosts(base: f64, query: &str, intents: &[IntentMatch], candidate: &FusionCandidate, weights: &RankingWeights) -> f64 {
    let query_tokens = tokenize_name(query);
    base * chunk_type_boost(intents, &candidate.metadata, weights)
        * name_match_boost(&query_tokens, &candidate.metadata, weights)
        * path_relevance_boost(&query_tokens, &candidate.path, weights)
        * tag_overlap_boost(intents, &candidate.metadata, weights)
        * docstring_bonus(&candidate.metadata, weights)
        * complexity_penalty(&candidate.metadata, weights)
}

/// Merges same-file results whose line ranges are adjacent or overlapping,
/// keeping the best score and the union of line ranges (spec §4.10 step 6).
pub fn dedupe_same_file(mut results: Vec<SearchResult>) -> Vec<SearchResult> {
    results.sort_by(|a, b| a.path.cmp(&b.path).then(a.start_line.cmp(&b.start_line)));

    let mut merged: Vec<SearchResult> = Vec::new();
    for r in results {
        if let Some(last) = merged.last_mut() {
            let overlaps_or_adjacent = last.path == r.path && r.start_line <= last.end_line.saturating_add(1);
            if overlaps_or_adjacent {
                last.end_line = last.end_line.max(r.end_line);
                last.start_line = last.start_line.min(r.start_line);
                if r.score > last.score {
                    last.score = r.score;
                    last.text = r.text;
                    last.metadata = r.metadata;
                }
                continue;
            }
        }
        merged.push(r);
    }
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, path: &str, vr: Option<usize>, fr: Option<usize>) -> FusionCandidate {
        FusionCandidate {
            id: id.into(),
            path: path.into(),
            text: String::new(),
            start_line: 1,
            end_line: 1,
            metadata: ChunkMetadata::default(),
            vector_rank: vr,
            vector_score: None,
            fts_rank: fr,
            fts_score: None,
        }
    }

    #[test]
    fn fuse_passes_through_unweighted_when_one_side_empty() {
        let candidates = vec![candidate("a", "a.rs", Some(0), None), candidate("b", "b.rs", Some(1), None)];
        let scores = fuse(&candidates, 0.3);
        assert!(scores["a"] > scores["b"]);
        assert!(scores["a"] > 0.0);
    }

    #[test]
    fn fuse_blends_both_modalities_by_alpha() {
        let candidates = vec![candidate("a", "a.rs", Some(0), Some(5)), candidate("b", "b.rs", Some(5), Some(0))];
        let scores = fuse(&candidates, 0.9);
        assert!(scores["a"] > scores["b"]);
    }

    #[test]
    fn dedupe_merges_adjacent_same_file_hits() {
        let results = vec![
            SearchResult { path: "a.rs".into(), text: "x".into(), score: 0.5, start_line: 1, end_line: 10, metadata: None },
            SearchResult { path: "a.rs".into(), text: "y".into(), score: 0.9, start_line: 8, end_line: 20, metadata: None },
        ];
        let merged = dedupe_same_file(results);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start_line, 1);
        assert_eq!(merged[0].end_line, 20);
        assert_eq!(merged[0].score, 0.9);
    }

    #[test]
    fn boosts_default_to_one_without_metadata() {
        let c = candidate("a", "a.rs", Some(0), None);
        let weights = RankingWeights::default();
        let boosted = apply_boosts(0.5, "query", &[], &c, &weights);
        assert!((boosted - 0.5).abs() < 1e-9);
    }
}
