//! The Analysis Cache: memoizes the two expensive derived computations — backlink collection
//! and link-graph analysis — keyed by (version, normalized options), invalidating everything
//! when the bound [`SnapshotProvider`] reports a new version.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::adapter::NoteReader;
use crate::cache::CacheService;
use crate::derived::{self, Backlink, BacklinkOptions, GraphAnalysis, GraphOptions};
use crate::error::CacheResult;
use crate::model::Version;

/// Number of backlink-query results retained before the oldest is evicted.
pub const DEFAULT_BACKLINK_CAPACITY: usize = 64;
/// Number of graph-analysis results retained before the oldest is evicted.
pub const DEFAULT_GRAPH_CAPACITY: usize = 32;

/// The read-only surface the Analysis Cache needs from whatever owns the underlying index.
///
/// Implemented by [`CacheService`]; tests bind an [`AnalysisCache`] to a stub to exercise the
/// version-invalidation contract without touching a filesystem.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn version(&self) -> Version;
}

#[async_trait]
impl SnapshotProvider for CacheService {
    async fn version(&self) -> Version {
        CacheService::version(self).await
    }
}

/// Cache key for a backlink query: sorted/normalized target paths, the anchor/embed flags, and
/// the normalized suppressed-tag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BacklinkKey {
    targets: Vec<String>,
    options: BacklinkOptions,
    suppressed_tags: Vec<String>,
}

fn normalize_backlink_key(
    targets: &[String],
    options: &BacklinkOptions,
    suppressed_tags: &[String],
) -> BacklinkKey {
    let mut targets: Vec<String> = targets
        .iter()
        .map(|t| crate::extract::normalize_path(t))
        .collect();
    targets.sort();
    targets.dedup();

    let mut suppressed: Vec<String> = suppressed_tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    suppressed.sort();
    suppressed.dedup();

    BacklinkKey {
        targets,
        options: options.clone(),
        suppressed_tags: suppressed,
    }
}

/// Cache key for a graph-analysis query: every option that affects output, with path sets
/// sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GraphKey {
    options: GraphOptions,
}

fn normalize_graph_key(options: &GraphOptions) -> GraphKey {
    let mut normalized = options.clone();
    normalized.include_paths = normalized
        .include_paths
        .iter()
        .map(|p| crate::extract::normalize_path(p))
        .collect();
    normalized.include_paths.sort();
    normalized.include_paths.dedup();
    normalized.exclude_paths = normalized
        .exclude_paths
        .iter()
        .map(|p| crate::extract::normalize_path(p))
        .collect();
    normalized.exclude_paths.sort();
    normalized.exclude_paths.dedup();
    GraphKey { options: normalized }
}

/// Strict FIFO eviction, as opposed to a recency-based LRU: insertion order alone determines
/// what gets evicted when the bound is exceeded, matching the data model's "bounded FIFOs".
struct Fifo<K, V> {
    order: VecDeque<K>,
    entries: FxHashMap<K, V>,
    capacity: usize,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> Fifo<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            entries: FxHashMap::default(),
            capacity,
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: K, value: V) {
        if !self.entries.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, value);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

/// Version-gated state protected by a single lock, per the design's "all inserts and evictions
/// are protected by a single mutex" — computation itself always runs outside this lock.
struct State {
    version: Version,
    backlinks: Fifo<BacklinkKey, BTreeMap<String, Vec<Backlink>>>,
    graphs: Fifo<GraphKey, GraphAnalysis>,
}

/// Memoizes [`derived::collect_backlinks`] and [`derived::compute_graph_analysis`] against a
/// [`SnapshotProvider`]'s version counter.
pub struct AnalysisCache {
    provider: Arc<dyn SnapshotProvider>,
    note_reader: Arc<dyn NoteReader>,
    vault_path: String,
    state: Mutex<State>,
}

impl AnalysisCache {
    /// Binds a new, empty `AnalysisCache` to `provider` (for version gating) and `note_reader`
    /// (for the computations themselves), using the default FIFO bounds.
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        note_reader: Arc<dyn NoteReader>,
        vault_path: impl Into<String>,
    ) -> Self {
        Self::with_capacities(
            provider,
            note_reader,
            vault_path,
            DEFAULT_BACKLINK_CAPACITY,
            DEFAULT_GRAPH_CAPACITY,
        )
    }

    pub fn with_capacities(
        provider: Arc<dyn SnapshotProvider>,
        note_reader: Arc<dyn NoteReader>,
        vault_path: impl Into<String>,
        backlink_capacity: usize,
        graph_capacity: usize,
    ) -> Self {
        Self {
            provider,
            note_reader,
            vault_path: vault_path.into(),
            state: Mutex::new(State {
                version: 0,
                backlinks: Fifo::new(backlink_capacity),
                graphs: Fifo::new(graph_capacity),
            }),
        }
    }

    /// Clears both FIFOs and records `version` if the provider has advanced since the cache was
    /// last populated. A fresh cache (`version == 0` with nothing inserted yet) is never cleared
    /// spuriously because version `0` only occurs before any crawl has completed.
    async fn sync_version(&self) {
        let current = self.provider.version().await;
        let mut state = self.state.lock();
        if state.version != current {
            state.backlinks.clear();
            state.graphs.clear();
            state.version = current;
        }
    }

    /// Returns backlinks to `targets`, computing and memoizing on a cache miss.
    pub async fn backlinks(
        &self,
        targets: &[String],
        options: &BacklinkOptions,
        suppressed_tags: &[String],
    ) -> CacheResult<BTreeMap<String, Vec<Backlink>>> {
        self.sync_version().await;

        let key = normalize_backlink_key(targets, options, suppressed_tags);
        if let Some(hit) = self.state.lock().backlinks.get(&key) {
            return Ok(hit);
        }

        let computed = derived::collect_backlinks(
            &self.vault_path,
            self.note_reader.as_ref(),
            &key.targets,
            options,
            &key.suppressed_tags,
        )
        .await?;

        self.state.lock().backlinks.insert(key, computed.clone());
        Ok(computed)
    }

    /// Returns the graph analysis for `options`, computing and memoizing on a cache miss.
    pub async fn graph_analysis(&self, options: &GraphOptions) -> CacheResult<GraphAnalysis> {
        self.sync_version().await;

        let key = normalize_graph_key(options);
        if let Some(hit) = self.state.lock().graphs.get(&key) {
            return Ok(hit);
        }

        let computed =
            derived::compute_graph_analysis(&self.vault_path, self.note_reader.as_ref(), options)
                .await?;

        self.state.lock().graphs.insert(key, computed.clone());
        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    struct StubProvider {
        version: AtomicU64,
    }

    #[async_trait]
    impl SnapshotProvider for StubProvider {
        async fn version(&self) -> Version {
            self.version.load(Ordering::SeqCst)
        }
    }

    struct CountingReader {
        notes: StdMutex<HashMap<String, String>>,
        reads: AtomicU64,
    }

    impl CountingReader {
        fn new(notes: &[(&str, &str)]) -> Self {
            Self {
                notes: StdMutex::new(
                    notes.iter().map(|(p, c)| (p.to_string(), c.to_string())).collect(),
                ),
                reads: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl NoteReader for CountingReader {
        async fn get_contents(&self, _vault_path: &str, name: &str) -> CacheResult<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.notes.lock().unwrap().get(name).cloned().unwrap_or_default())
        }

        async fn get_notes_list(&self, _vault_path: &str) -> CacheResult<Vec<String>> {
            let mut paths: Vec<String> = self.notes.lock().unwrap().keys().cloned().collect();
            paths.sort();
            Ok(paths)
        }

        async fn move_note(&self, _: &str, _: &str, _: &str) -> CacheResult<()> {
            unimplemented!()
        }
        async fn delete_note(&self, _: &str, _: &str) -> CacheResult<()> {
            unimplemented!()
        }
        async fn update_links(&self, _: &str, _: &str, _: &str) -> CacheResult<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn repeated_call_at_same_version_does_not_recompute() {
        let provider = Arc::new(StubProvider {
            version: AtomicU64::new(1),
        });
        let reader = Arc::new(CountingReader::new(&[("A.md", "[[B]]")]));
        let cache = AnalysisCache::new(provider, reader.clone(), "vault");

        let targets = vec!["B.md".to_string()];
        let options = BacklinkOptions::default();

        cache.backlinks(&targets, &options, &[]).await.unwrap();
        let reads_after_first = reader.reads.load(Ordering::SeqCst);

        cache.backlinks(&targets, &options, &[]).await.unwrap();
        let reads_after_second = reader.reads.load(Ordering::SeqCst);

        assert_eq!(reads_after_first, reads_after_second);
    }

    #[tokio::test]
    async fn version_bump_invalidates_and_recomputes() {
        let provider = Arc::new(StubProvider {
            version: AtomicU64::new(1),
        });
        let reader = Arc::new(CountingReader::new(&[("A.md", "[[B]]")]));
        let cache = AnalysisCache::new(provider.clone(), reader.clone(), "vault");

        let targets = vec!["B.md".to_string()];
        let options = BacklinkOptions::default();

        cache.backlinks(&targets, &options, &[]).await.unwrap();
        let reads_before = reader.reads.load(Ordering::SeqCst);

        provider.version.store(2, Ordering::SeqCst);
        cache.backlinks(&targets, &options, &[]).await.unwrap();
        let reads_after = reader.reads.load(Ordering::SeqCst);

        assert!(reads_after > reads_before);
    }

    #[tokio::test]
    async fn fifo_evicts_oldest_entry_past_capacity() {
        let provider = Arc::new(StubProvider {
            version: AtomicU64::new(1),
        });
        let reader = Arc::new(CountingReader::new(&[("A.md", ""), ("B.md", ""), ("C.md", "")]));
        let cache =
            AnalysisCache::with_capacities(provider, reader.clone(), "vault", 2, 2);

        for target in ["A.md", "B.md", "C.md"] {
            cache
                .backlinks(&[target.to_string()], &BacklinkOptions::default(), &[])
                .await
                .unwrap();
        }

        let reads_before = reader.reads.load(Ordering::SeqCst);
        // A.md was evicted when C.md's entry pushed the FIFO past capacity 2.
        cache
            .backlinks(&["A.md".to_string()], &BacklinkOptions::default(), &[])
            .await
            .unwrap();
        let reads_after = reader.reads.load(Ordering::SeqCst);

        assert!(reads_after > reads_before);
    }

    #[tokio::test]
    async fn graph_analysis_is_memoized_independently_of_backlinks() {
        let provider = Arc::new(StubProvider {
            version: AtomicU64::new(1),
        });
        let reader = Arc::new(CountingReader::new(&[("A.md", "[[B]]"), ("B.md", "")]));
        let cache = AnalysisCache::new(provider, reader.clone(), "vault");

        let options = GraphOptions::default();
        cache.graph_analysis(&options).await.unwrap();
        let reads_after_first = reader.reads.load(Ordering::SeqCst);

        cache.graph_analysis(&options).await.unwrap();
        let reads_after_second = reader.reads.load(Ordering::SeqCst);

        assert_eq!(reads_after_first, reads_after_second);
    }
}
