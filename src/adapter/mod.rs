//! The `NoteReader` adapter: the small note-access interface expected by the `derived`
//! computations, backed by a [`crate::cache::CacheService`].
//!
//! `NoteReader` itself is a trait rather than a concrete type so that `derived` and
//! [`crate::analysis::AnalysisCache`] can be exercised against a test double without a real
//! vault on disk.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheService;
use crate::error::{CacheError, CacheResult};
use crate::extract;

/// Read (and, nominally, mutation) access to notes, as consumed by the `derived` backlink and
/// graph computations.
///
/// `vault_path` is accepted on every method for parity with the original multi-vault interface
/// this was adapted from, but a [`CacheNoteReader`] is always bound to a single
/// [`CacheService`]'s root and ignores it beyond that.
#[async_trait]
pub trait NoteReader: Send + Sync {
    /// Returns the contents of `name`, refreshing the cache first so the read reflects every
    /// change observed before the call. Falls back to a direct filesystem read if the name is
    /// not (yet) present in the cache.
    async fn get_contents(&self, vault_path: &str, name: &str) -> CacheResult<String>;

    /// Returns every cached path, ensuring the cache is ready first.
    async fn get_notes_list(&self, vault_path: &str) -> CacheResult<Vec<String>>;

    /// Pass-through stub. Note mutation is an out-of-scope collaborator's job.
    async fn move_note(&self, vault_path: &str, from: &str, to: &str) -> CacheResult<()>;

    /// Pass-through stub. Note mutation is an out-of-scope collaborator's job.
    async fn delete_note(&self, vault_path: &str, name: &str) -> CacheResult<()>;

    /// Pass-through stub. Note mutation is an out-of-scope collaborator's job.
    async fn update_links(&self, vault_path: &str, from: &str, to: &str) -> CacheResult<()>;
}

/// Wraps a [`CacheService`] to implement [`NoteReader`].
#[derive(Clone)]
pub struct CacheNoteReader {
    cache: CacheService,
}

impl CacheNoteReader {
    pub fn new(cache: CacheService) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }
}

#[async_trait]
impl NoteReader for CacheNoteReader {
    async fn get_contents(&self, _vault_path: &str, name: &str) -> CacheResult<String> {
        let cancel = CancellationToken::new();
        self.cache.refresh(&cancel).await?;

        if let Some(entry) = self.cache.entry(name).await {
            return Ok(entry.content);
        }

        let normalized = extract::normalize_path(name);
        let abs = self.cache.root().join(normalized);
        let contents = tokio::fs::read_to_string(&abs).await?;
        Ok(contents)
    }

    async fn get_notes_list(&self, _vault_path: &str) -> CacheResult<Vec<String>> {
        let cancel = CancellationToken::new();
        self.cache.ensure_ready(&cancel).await?;
        Ok(self.cache.paths().await)
    }

    async fn move_note(&self, _vault_path: &str, _from: &str, _to: &str) -> CacheResult<()> {
        Err(CacheError::Unsupported("move_note"))
    }

    async fn delete_note(&self, _vault_path: &str, _name: &str) -> CacheResult<()> {
        Err(CacheError::Unsupported("delete_note"))
    }

    async fn update_links(&self, _vault_path: &str, _from: &str, _to: &str) -> CacheResult<()> {
        Err(CacheError::Unsupported("update_links"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheOptions;
    use tempfile::TempDir;

    #[tokio::test]
    async fn get_contents_reads_cached_entry() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Note.md"), "hello #world").unwrap();

        let cache = CacheService::new(dir.path(), CacheOptions::disabled_watcher()).unwrap();
        cache
            .ensure_ready(&CancellationToken::new())
            .await
            .unwrap();

        let reader = CacheNoteReader::new(cache);
        let contents = reader.get_contents("ignored", "Note.md").await.unwrap();
        assert_eq!(contents, "hello #world");
    }

    #[tokio::test]
    async fn get_notes_list_ensures_ready_first() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("A.md"), "a").unwrap();
        std::fs::write(dir.path().join("B.md"), "b").unwrap();

        let cache = CacheService::new(dir.path(), CacheOptions::disabled_watcher()).unwrap();
        let reader = CacheNoteReader::new(cache);

        let mut paths = reader.get_notes_list("ignored").await.unwrap();
        paths.sort();
        assert_eq!(paths, vec!["A.md".to_string(), "B.md".to_string()]);
    }

    #[tokio::test]
    async fn mutating_methods_are_unsupported_stubs() {
        let dir = TempDir::new().unwrap();
        let cache = CacheService::new(dir.path(), CacheOptions::disabled_watcher()).unwrap();
        let reader = CacheNoteReader::new(cache);

        assert!(matches!(
            reader.move_note("v", "A.md", "B.md").await,
            Err(CacheError::Unsupported("move_note"))
        ));
        assert!(matches!(
            reader.delete_note("v", "A.md").await,
            Err(CacheError::Unsupported("delete_note"))
        ));
        assert!(matches!(
            reader.update_links("v", "A.md", "B.md").await,
            Err(CacheError::Unsupported("update_links"))
        ));
    }
}
