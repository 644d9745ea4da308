//! `FileIndex`, `TagIndex`, and `DirIndex`: the indices the Cache Service keeps consistent.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use super::entry::Entry;

/// Mapping from vault-relative path to the owning [`Entry`].
///
/// The Cache Service exclusively owns all entries stored here; callers only ever see clones.
#[derive(Debug, Default)]
pub struct FileIndex {
    entries: BTreeMap<String, Entry>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, entry: Entry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        self.entries.remove(path)
    }

    /// Removes `path` and every entry whose path has `path` as a `/`-separated prefix directory.
    ///
    /// Used when a directory (or a file, trivially) is deleted or renamed away; returns the
    /// removed paths so callers can drop the matching tag relations.
    pub fn remove_tree(&mut self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|p| *p == path || p.starts_with(&prefix))
            .cloned()
            .collect();
        for p in &doomed {
            self.entries.remove(p);
        }
        doomed
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Mapping from normalized tag to the set of paths bearing it.
///
/// Kept consistent with [`FileIndex`] via rebuilt-per-path semantics: before an entry is
/// (re)installed, every tag relation for its path is dropped, then the entry's current tags are
/// re-added. This keeps invariant (b) of the data model — `p ∈ tag_index[t] ⇔ t ∈ entry(p).tags`
/// — true after every mutation.
#[derive(Debug, Default)]
pub struct TagIndex {
    tags: BTreeMap<String, BTreeSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every tag relation currently recorded for `path`.
    pub fn remove_path(&mut self, path: &str) {
        self.tags.retain(|_, paths| {
            paths.remove(path);
            !paths.is_empty()
        });
    }

    /// Records that `path` bears `tag`.
    pub fn add(&mut self, tag: &str, path: &str) {
        self.tags
            .entry(tag.to_string())
            .or_default()
            .insert(path.to_string());
    }

    pub fn paths_for(&self, tag: &str) -> BTreeSet<String> {
        self.tags.get(tag).cloned().unwrap_or_default()
    }

    pub fn contains(&self, tag: &str, path: &str) -> bool {
        self.tags.get(tag).is_some_and(|paths| paths.contains(path))
    }

    pub fn clear(&mut self) {
        self.tags.clear();
    }
}

/// Set of absolute directory paths currently registered with the filesystem watcher.
///
/// A directory is added at most once; the set is consulted before issuing a redundant `watch`
/// call and is used to drop watches on delete/rename.
#[derive(Debug, Default)]
pub struct DirIndex {
    dirs: BTreeSet<PathBuf>,
}

impl DirIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `dir`, returning `true` if it was not already registered.
    pub fn insert(&mut self, dir: PathBuf) -> bool {
        self.dirs.insert(dir)
    }

    pub fn remove(&mut self, dir: &PathBuf) -> bool {
        self.dirs.remove(dir)
    }

    pub fn contains(&self, dir: &PathBuf) -> bool {
        self.dirs.contains(dir)
    }

    pub fn clear(&mut self) {
        self.dirs.clear();
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;
    use std::time::SystemTime;

    fn entry(path: &str, tags: &[&str]) -> Entry {
        Entry {
            path: path.to_string(),
            mod_time: SystemTime::UNIX_EPOCH,
            size: 0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            frontmatter: None,
            inline_props: Map::new(),
            content: String::new(),
            content_time: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn remove_tree_removes_path_and_descendants() {
        let mut idx = FileIndex::new();
        idx.insert(entry("Folder/A.md", &[]));
        idx.insert(entry("Folder/Sub/B.md", &[]));
        idx.insert(entry("Folder2/C.md", &[]));

        let removed = idx.remove_tree("Folder");
        assert_eq!(removed.len(), 2);
        assert!(idx.get("Folder/A.md").is_none());
        assert!(idx.get("Folder/Sub/B.md").is_none());
        assert!(idx.get("Folder2/C.md").is_some());
    }

    #[test]
    fn remove_tree_on_bare_file_removes_only_that_file() {
        let mut idx = FileIndex::new();
        idx.insert(entry("Note.md", &[]));
        idx.insert(entry("Notebook.md", &[]));

        let removed = idx.remove_tree("Note.md");
        assert_eq!(removed, vec!["Note.md".to_string()]);
        assert!(idx.get("Notebook.md").is_some());
    }

    #[test]
    fn tag_index_rebuild_per_path_drops_stale_relations() {
        let mut tags = TagIndex::new();
        tags.add("old", "Note.md");
        assert!(tags.contains("old", "Note.md"));

        tags.remove_path("Note.md");
        tags.add("new", "Note.md");

        assert!(!tags.contains("old", "Note.md"));
        assert!(tags.contains("new", "Note.md"));
    }

    #[test]
    fn dir_index_add_at_most_once() {
        let mut dirs = DirIndex::new();
        assert!(dirs.insert(PathBuf::from("/vault")));
        assert!(!dirs.insert(PathBuf::from("/vault")));
        assert_eq!(dirs.len(), 1);
    }
}
