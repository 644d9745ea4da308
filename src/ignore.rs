//! `.obsidianignore` loading and glob-style path matching.

use std::path::Path;

/// Ignore patterns installed when `.obsidianignore` is absent or empty.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[".*", "node_modules", "vendor", "bin", ".git"];

/// Ordered list of glob-like patterns loaded from `.obsidianignore`, or the documented defaults.
#[derive(Debug, Clone)]
pub struct IgnoreList {
    patterns: Vec<String>,
}

impl IgnoreList {
    /// Loads `.obsidianignore` from `vault_root`, falling back to [`DEFAULT_IGNORE_PATTERNS`] when
    /// the file is absent or contains no usable entries.
    ///
    /// Blank lines and `#`-prefixed comments are ignored. Hot-reload is not supported by design —
    /// callers reload this at crawl/resync time, never mid-refresh.
    pub fn load(vault_root: &Path) -> Self {
        let path = vault_root.join(".obsidianignore");
        let patterns = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let parsed: Vec<String> = contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string)
                    .collect();
                if parsed.is_empty() {
                    default_patterns()
                } else {
                    parsed
                }
            }
            Err(_) => default_patterns(),
        };
        Self { patterns }
    }

    /// Builds an ignore list directly from patterns, bypassing disk. Used by tests and by callers
    /// that manage `.obsidianignore` contents themselves.
    pub fn from_patterns(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `abs_path` (under `vault_root`) matches any pattern.
    ///
    /// A pattern matches if it equals any path component, or if it contains a glob character
    /// (`*`/`?`) and matches a component via simple glob semantics, or if it matches the
    /// vault-relative path as a whole.
    pub fn is_ignored(&self, vault_root: &Path, abs_path: &Path) -> bool {
        let relative = match abs_path.strip_prefix(vault_root) {
            Ok(rel) => rel,
            Err(_) => abs_path,
        };

        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let relative_str = components.join("/");

        self.patterns.iter().any(|pattern| {
            components.iter().any(|c| glob_match(pattern, c))
                || glob_match(pattern, &relative_str)
        })
    }
}

fn default_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect()
}

/// Minimal glob matcher supporting `*` (any run of characters) and `?` (any single character).
///
/// Vault ignore files are small and checked per path component, so a backtracking matcher over
/// bytes is plenty fast and avoids pulling in a dedicated glob crate for two wildcard classes.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn helper(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => helper(&p[1..], t) || (!t.is_empty() && helper(p, &t[1..])),
            (Some(b'?'), Some(_)) => helper(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => helper(&p[1..], &t[1..]),
            _ => false,
        }
    }
    helper(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_obsidianignore_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".obsidianignore"), "\n# just a comment\n").unwrap();

        let list = IgnoreList::load(dir.path());
        assert!(list.is_ignored(dir.path(), &dir.path().join(".git")));
        assert!(!list.is_ignored(dir.path(), &dir.path().join("Note.md")));
    }

    #[test]
    fn missing_obsidianignore_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let list = IgnoreList::load(dir.path());
        assert!(list.is_ignored(dir.path(), &dir.path().join("node_modules")));
    }

    #[test]
    fn explicit_patterns_override_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".obsidianignore"), "Ignored.md\n").unwrap();

        let list = IgnoreList::load(dir.path());
        assert!(list.is_ignored(dir.path(), &dir.path().join("Ignored.md")));
        assert!(!list.is_ignored(dir.path(), &dir.path().join("node_modules")));
    }

    #[test]
    fn glob_star_matches_any_suffix() {
        let list = IgnoreList::from_patterns(["*.tmp"]);
        assert!(list.is_ignored(Path::new("/vault"), Path::new("/vault/draft.tmp")));
        assert!(!list.is_ignored(Path::new("/vault"), Path::new("/vault/draft.md")));
    }

    #[test]
    fn nested_path_matches_directory_component() {
        let list = IgnoreList::from_patterns(["vendor"]);
        assert!(list.is_ignored(Path::new("/vault"), Path::new("/vault/vendor/lib.md")));
    }
}
