//! Deny/allow policy (spec §4.3, C3). Grounded in the donor's
//! `ignore::WalkBuilder`-based walk in `scan.rs` (`walk_files_parallel`,
//! `is_text_file`), generalized into an explicit `should_index` decision with
//! recursive nested-gitignore scoping, Unicode normalization, and
//! content-based binary detection, since the donor inlines all of this into
//! its walker rather than exposing it as a standalone policy object.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use unicode_normalization::UnicodeNormalization;

const HARDCODED_DENY_DIRS: &[&str] = &[
    ".git", "node_modules", "target", "dist", "build", "out", ".next", ".nuxt", "vendor", "__pycache__",
    ".venv", "venv", ".tox", ".mypy_cache", ".pytest_cache", ".idea", ".vscode", "bin", "obj",
];

const HARDCODED_DENY_FILE_PREFIXES: &[&str] = &[".env"];
const HARDCODED_DENY_FILENAMES: &[&str] =
    &["id_rsa", "id_ed25519", ".npmrc", ".pypirc", "credentials.json", "secrets.yaml", "secrets.yml"];

const KNOWN_TEXT_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "pyi", "go", "java", "kt", "scala", "swift", "c", "h",
    "cc", "cpp", "cxx", "hpp", "hxx", "cs", "rb", "php", "md", "mdx", "rst", "txt", "toml", "yaml", "yml",
    "json", "xml", "html", "css", "scss", "sh", "bash", "zsh", "sql", "proto", "graphql", "lock", "cfg", "ini",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub reason: &'static str,
}

/// Recursive nested-`.gitignore` policy: loads `.gitignore` from `root` and
/// every ancestor directory between `root` and a candidate path, so a rule
/// written in `foo/.gitignore` scopes to `foo/` and everything beneath it
/// (`foo/*.k` matches `foo/*.k` and `foo/**/*.k`, per spec §4.3).
pub struct Policy {
    root: PathBuf,
    /// One compiled matcher per directory that held a `.gitignore`, keyed by
    /// the directory's path relative to `root` (`""` for the root itself).
    matchers: Vec<(PathBuf, Gitignore)>,
}

impl Policy {
    pub fn load(root: &Path) -> std::io::Result<Self> {
        let mut matchers = Vec::new();
        Self::collect_gitignores(root, root, &mut matchers)?;
        Ok(Self { root: root.to_path_buf(), matchers })
    }

    fn collect_gitignores(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, Gitignore)>) -> std::io::Result<()> {
        let gi_path = dir.join(".gitignore");
        if gi_path.is_file() {
            let mut builder = GitignoreBuilder::new(dir);
            builder.add(&gi_path);
            if let Ok(gi) = builder.build() {
                out.push((dir.to_path_buf(), gi));
            }
        }
        let Ok(entries) = std::fs::read_dir(dir) else { return Ok(()) };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && !is_hardcoded_deny_dir(&path) {
                let _ = Self::collect_gitignores(root, &path, out);
            }
        }
        let _ = root;
        Ok(())
    }

    /// `should_index(abs, rel) → {include|exclude, reason}`.
    pub fn should_index(&self, abs: &Path, rel: &str) -> PolicyDecision {
        let normalized = normalize_unicode_path(rel);

        for comp in Path::new(&normalized).components() {
            let s = comp.as_os_str().to_string_lossy();
            if HARDCODED_DENY_DIRS.iter().any(|d| s.eq_ignore_ascii_case(d)) {
                return PolicyDecision { decision: Decision::Exclude, reason: "hardcoded_deny_dir" };
            }
        }

        if let Some(filename) = Path::new(&normalized).file_name().and_then(|f| f.to_str()) {
            if HARDCODED_DENY_FILE_PREFIXES.iter().any(|p| filename.starts_with(p))
                || HARDCODED_DENY_FILENAMES.iter().any(|n| filename.eq_ignore_ascii_case(n))
            {
                return PolicyDecision { decision: Decision::Exclude, reason: "hardcoded_deny_file" };
            }
        }

        // Apply every scoping .gitignore whose directory is an ancestor of `abs`,
        // root-most first, so deeper (more specific) files win — matching git's
        // own precedence, last match wins including negation.
        let mut matched_exclude = false;
        for (dir, gi) in &self.matchers {
            if !abs.starts_with(dir) {
                continue;
            }
            let is_dir = abs.is_dir();
            match gi.matched(abs, is_dir) {
                ignore::Match::Ignore(_) => matched_exclude = true,
                ignore::Match::Whitelist(_) => matched_exclude = false,
                ignore::Match::None => {}
            }
        }
        if matched_exclude {
            return PolicyDecision { decision: Decision::Exclude, reason: "gitignore" };
        }

        PolicyDecision { decision: Decision::Include, reason: "included" }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_hardcoded_deny_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| HARDCODED_DENY_DIRS.iter().any(|d| n.eq_ignore_ascii_case(d)))
        .unwrap_or(false)
}

/// Unicode NFC normalization with bidi-override and zero-width stripping
/// (spec §4.3). Stripped characters are not logged here — the caller (the
/// walker) logs when a path actually changed under normalization.
pub fn normalize_unicode_path(rel: &str) -> String {
    const ZERO_WIDTH_AND_BIDI: &[char] = &[
        '\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}', '\u{202A}', '\u{202B}', '\u{202C}', '\u{202D}',
        '\u{202E}', '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}',
    ];
    let stripped: String = rel.chars().filter(|c| !ZERO_WIDTH_AND_BIDI.contains(c)).collect();
    stripped.nfc().collect()
}

/// Content-based binary detection for files whose extension isn't in the
/// known-text set: reads the first 8 KiB and rejects on any NUL byte.
pub fn is_binary_content(bytes: &[u8]) -> bool {
    let probe = &bytes[..bytes.len().min(8192)];
    probe.contains(&0u8)
}

pub fn is_known_text_extension(ext: &str) -> bool {
    KNOWN_TEXT_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

/// Full binary-detection decision for a file: known-text extensions are
/// trusted without reading; everything else is sniffed (spec §4.3).
pub fn is_text_file(ext: &str, sniff_first_8kib: impl FnOnce() -> std::io::Result<Vec<u8>>) -> bool {
    if is_known_text_extension(ext) {
        return true;
    }
    match sniff_first_8kib() {
        Ok(bytes) => !is_binary_content(&bytes),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn nested_gitignore_scopes_to_subtree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs/secrets")).unwrap();
        fs::write(dir.path().join("docs/.gitignore"), "secrets/*.key\n").unwrap();
        fs::write(dir.path().join("docs/secrets/key.key"), b"secret").unwrap();
        fs::write(dir.path().join("docs/readme.md"), b"hi").unwrap();

        let policy = Policy::load(dir.path()).unwrap();
        let key_abs = dir.path().join("docs/secrets/key.key");
        let readme_abs = dir.path().join("docs/readme.md");

        assert_eq!(policy.should_index(&key_abs, "docs/secrets/key.key").decision, Decision::Exclude);
        assert_eq!(policy.should_index(&readme_abs, "docs/readme.md").decision, Decision::Include);
    }

    #[test]
    fn hardcoded_deny_dirs_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let policy = Policy::load(dir.path()).unwrap();
        let abs = dir.path().join("node_modules/pkg/index.js");
        assert_eq!(policy.should_index(&abs, "node_modules/pkg/index.js").decision, Decision::Exclude);
    }

    #[test]
    fn nfd_and_nfc_equivalent_paths_normalize_identically() {
        let nfc = "caf\u{e9}.rs";
        let nfd = "cafe\u{301}.rs";
        assert_eq!(normalize_unicode_path(nfc), normalize_unicode_path(nfd));
    }

    #[test]
    fn binary_detection_flags_nul_bytes() {
        assert!(is_binary_content(&[0x50, 0x4B, 0x00, 0x03]));
        assert!(!is_binary_content(b"fn main() {}"));
    }
}
