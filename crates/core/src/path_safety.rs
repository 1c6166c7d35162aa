//! Path normalization and traversal/symlink safety (spec §4.1, C1).
//!
//! Grounded in the donor's `validate_path` (`crates/core/src/types.rs`),
//! generalized from "reject `..`/absolute" into the full `normalize`/
//! `to_relative`/`to_absolute`/`safe_join`/`safe_read` surface the spec asks
//! for, plus the bounded JSON loader used by every persisted-state read.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, ErrorCode, Result};
use crate::limits::{MAX_JSON_FILE_SIZE, MAX_PATH_LENGTH};

/// Normalize `.`/`..`/redundant separators without touching the filesystem,
/// always producing forward-slash-separated output.
pub fn normalize(p: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for comp in p.split(['/', '\\']) {
        match comp {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            c => out.push(c),
        }
    }
    out.join("/")
}

pub fn to_relative(abs: &Path, base: &Path) -> Option<String> {
    let rel = abs.strip_prefix(base).ok()?;
    Some(rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/"))
}

pub fn to_absolute(rel: &str, base: &Path) -> PathBuf {
    base.join(rel)
}

fn has_windows_drive_letter(rel: &str) -> bool {
    let bytes = rel.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Joins `rel` onto `base`, rejecting anything that could escape `base`.
/// Returns `None` rather than erroring so callers decide how to report it.
pub fn safe_join(base: &Path, rel: &str) -> Option<PathBuf> {
    if rel.is_empty() {
        return None;
    }
    if rel.contains('\0') {
        return None;
    }
    if rel.starts_with('/') || rel.starts_with('\\') || has_windows_drive_letter(rel) {
        return None;
    }
    if Path::new(rel).components().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }
    if rel.len() > MAX_PATH_LENGTH {
        return None;
    }
    let joined = base.join(rel);
    // Defense in depth: re-walk the lexically-joined path and confirm it still
    // resolves under `base` even though we already rejected literal `..`.
    let mut depth: i64 = 0;
    for comp in joined.strip_prefix(base).ok()?.components() {
        match comp {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            Component::Normal(_) => depth += 1,
            _ => {}
        }
    }
    Some(joined)
}

/// Validates `rel` against `project_root` and returns the joined absolute
/// path, producing the spec's stable error kinds on rejection.
pub fn validate_path(project_root: &Path, rel: &str) -> Result<PathBuf> {
    if rel.is_empty() {
        return Err(Error::new(ErrorCode::InvalidPath, "path must not be empty"));
    }
    safe_join(project_root, rel).ok_or_else(|| {
        Error::new(ErrorCode::PathTraversal, "path escapes the project root")
            .with_developer(format!("rejected relative path: {rel}"))
    })
}

/// `lstat`s the final path component and refuses symlinks (spec §4.1).
/// Indexing callers should treat `Err` as "skip with warning"; explicit
/// single-file operations should propagate the error.
pub fn safe_read(project_root: &Path, rel: &str) -> Result<Vec<u8>> {
    let abs = validate_path(project_root, rel)?;
    let meta = std::fs::symlink_metadata(&abs).map_err(|e| {
        Error::new(ErrorCode::FileNotFound, "file not found").with_developer(e.to_string())
    })?;
    if meta.file_type().is_symlink() {
        return Err(Error::new(ErrorCode::SymlinkNotAllowed, "symlinks are not indexed"));
    }
    std::fs::read(&abs).map_err(|e| {
        Error::new(ErrorCode::PermissionDenied, "could not read file").with_developer(e.to_string())
    })
}

pub fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path).map(|m| m.file_type().is_symlink()).unwrap_or(false)
}

/// Loads and deserializes a JSON file, rejecting anything over
/// `MAX_JSON_FILE_SIZE` before ever allocating a buffer for its contents.
pub fn safe_load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::new(ErrorCode::PermissionDenied, "could not stat file").with_developer(e.to_string()))
        }
    };
    if meta.len() > MAX_JSON_FILE_SIZE {
        return Err(Error::resource_limit("MAX_JSON_FILE_SIZE"));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::new(ErrorCode::PermissionDenied, "could not read file").with_developer(e.to_string()))?;
    let value = serde_json::from_str(&raw)
        .map_err(|e| Error::new(ErrorCode::IndexCorrupt, "stored state is corrupt").with_developer(e.to_string()))?;
    Ok(Some(value))
}

/// Write-temp-then-rename JSON write for atomicity (spec §6).
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().ok_or_else(|| Error::new(ErrorCode::InvalidPath, "invalid path"))?;
    std::fs::create_dir_all(parent)
        .map_err(|e| Error::new(ErrorCode::PermissionDenied, "could not create directory").with_developer(e.to_string()))?;
    let tmp = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("state"),
        std::process::id()
    ));
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::new(ErrorCode::Unknown, "serialization failed").with_developer(e.to_string()))?;
    std::fs::write(&tmp, &body)
        .map_err(|e| Error::new(ErrorCode::PermissionDenied, "could not write file").with_developer(e.to_string()))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| Error::new(ErrorCode::PermissionDenied, "could not rename file").with_developer(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal() {
        let base = Path::new("/project");
        assert!(safe_join(base, "../etc/passwd").is_none());
        assert!(safe_join(base, "a/../../b").is_none());
    }

    #[test]
    fn rejects_absolute_and_drive_letters() {
        let base = Path::new("/project");
        assert!(safe_join(base, "/etc/passwd").is_none());
        assert!(safe_join(base, "C:\\Windows").is_none());
    }

    #[test]
    fn rejects_nul_and_empty() {
        let base = Path::new("/project");
        assert!(safe_join(base, "").is_none());
        assert!(safe_join(base, "foo\0bar").is_none());
    }

    #[test]
    fn accepts_valid_relative() {
        let base = Path::new("/project");
        let joined = safe_join(base, "src/main.rs").unwrap();
        assert_eq!(joined, Path::new("/project/src/main.rs"));
    }

    #[test]
    fn normalize_collapses_dot_segments() {
        assert_eq!(normalize("./a//b/../c"), "a/c");
    }
}
