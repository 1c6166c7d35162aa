//! Content hashing (spec §4.2, C2). SHA-256 throughout; truncation length is
//! the only thing schema version controls. New writes always use the 32-hex
//! prefix; readers accept both 32 and legacy 16.

use sha2::{Digest, Sha256};

pub const LEGACY_HEX_LEN: usize = 16;
pub const CURRENT_HEX_LEN: usize = 32;

fn hex_prefix(bytes: &[u8], hex_len: usize) -> String {
    let full = hex::encode(bytes);
    full[..hex_len.min(full.len())].to_string()
}

/// SHA-256 over raw file bytes, truncated to the current (32-hex-char) schema.
pub fn file_content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_prefix(&digest, CURRENT_HEX_LEN)
}

/// `true` if `hash` looks like a value this module could have produced
/// (either truncation length), used by readers that must accept both.
pub fn is_plausible_hash(hash: &str) -> bool {
    let len = hash.len();
    (len == LEGACY_HEX_LEN || len == CURRENT_HEX_LEN) && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Whitespace-normalize then hash: trims the string and collapses every run
/// of whitespace to a single space, so trailing-newline / reindent edits
/// don't change a chunk's identity (spec §4.2, §8 round-trip law).
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// Chunk content hash: SHA-256 of whitespace-normalized text, 16-hex prefix
/// (spec §4.2 — "16-hex-char prefix is sufficient" for chunks).
pub fn chunk_content_hash(text: &str) -> String {
    let normalized = normalize_whitespace(text);
    let digest = Sha256::digest(normalized.as_bytes());
    hex_prefix(&digest, LEGACY_HEX_LEN)
}

/// Hash of an ordered list of already-hashed strings, used for FileNode.hash
/// (hash of ordered chunk hashes) and for the Merkle root (hash of sorted
/// `(path, file.hash)` pairs, built by the caller into a single joined string).
pub fn hash_concat<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("\u{0}");
    let digest = Sha256::digest(joined.as_bytes());
    hex_prefix(&digest, CURRENT_HEX_LEN)
}

/// SHA-256 of an absolute path, used to derive `<projectHash>` for the
/// per-project state directory (spec §6).
pub fn project_hash(absolute_path: &str) -> String {
    let digest = Sha256::digest(absolute_path.as_bytes());
    hex_prefix(&digest, CURRENT_HEX_LEN)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_normalization_is_idempotent_for_hashing() {
        let a = chunk_content_hash("fn foo() {\n    bar();\n}");
        let b = chunk_content_hash("fn foo() {   bar();   }  \n\n");
        assert_eq!(a, b);
    }

    #[test]
    fn file_hash_is_deterministic() {
        let a = file_content_hash(b"hello world");
        let b = file_content_hash(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), CURRENT_HEX_LEN);
    }

    #[test]
    fn hash_concat_is_order_sensitive() {
        let a = hash_concat(&["a", "b"]);
        let b = hash_concat(&["b", "a"]);
        assert_ne!(a, b);
    }

    #[test]
    fn accepts_both_legacy_and_current_lengths() {
        assert!(is_plausible_hash(&"a".repeat(16)));
        assert!(is_plausible_hash(&"a".repeat(32)));
        assert!(!is_plausible_hash(&"a".repeat(20)));
    }
}
