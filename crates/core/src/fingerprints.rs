//! Fingerprints + index-wide metadata persistence (spec §3/§4.11, C9).
//! `Fingerprints`/`IndexMetadata` are defined in `types.rs`; this module owns
//! their on-disk load/save, mirroring the Merkle tree's
//! write-temp-then-rename JSON idiom (spec §6).

use std::path::Path;

use crate::error::Result;
use crate::types::{Fingerprint, Fingerprints, IndexMetadata};

pub fn load_fingerprints(path: &Path) -> Result<Fingerprints> {
    Ok(crate::path_safety::safe_load_json::<Fingerprints>(path)?.unwrap_or_default())
}

pub fn save_fingerprints(path: &Path, fp: &Fingerprints) -> Result<()> {
    crate::path_safety::write_json_atomic(path, fp)
}

pub fn load_metadata(path: &Path, project_path: &str, now: i64) -> Result<IndexMetadata> {
    Ok(crate::path_safety::safe_load_json::<IndexMetadata>(path)?
        .unwrap_or_else(|| IndexMetadata::new(project_path.to_string(), now)))
}

pub fn save_metadata(path: &Path, metadata: &IndexMetadata) -> Result<()> {
    crate::path_safety::write_json_atomic(path, metadata)
}

/// `true` when `current` differs from the stored fingerprint for `path`
/// (drift detection fast-path used before reading/chunking a file).
pub fn is_stale(fingerprints: &Fingerprints, path: &str, current: &Fingerprint) -> bool {
    match fingerprints.get(path) {
        Some(stored) => stored != current,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprints.json");
        let mut fp = Fingerprints::new();
        fp.insert("a.rs".into(), Fingerprint { hash: "h".into(), size: 10, mtime: 1 });
        save_fingerprints(&path, &fp).unwrap();
        let loaded = load_fingerprints(&path).unwrap();
        assert_eq!(loaded, fp);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(load_fingerprints(&path).unwrap().is_empty());
    }

    #[test]
    fn is_stale_detects_changes() {
        let mut fp = Fingerprints::new();
        let cur = Fingerprint { hash: "h1".into(), size: 1, mtime: 0 };
        fp.insert("a.rs".into(), cur.clone());
        assert!(!is_stale(&fp, "a.rs", &cur));
        let changed = Fingerprint { hash: "h2".into(), size: 1, mtime: 0 };
        assert!(is_stale(&fp, "a.rs", &changed));
        assert!(is_stale(&fp, "b.rs", &cur));
    }
}
