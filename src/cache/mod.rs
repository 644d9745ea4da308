//! The Cache Service: the live, in-memory metadata cache for a vault.

mod crawl;
mod workers;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{CacheOptions, DEFAULT_DEGRADED_STALE_INTERVAL};
use crate::error::{CacheError, CacheResult};
use crate::ignore::IgnoreList;
use crate::model::{DirIndex, DirtyMap, Entry, FileIndex, TagIndex, Version};
use crate::watcher::{FsWatcher, SharedWatcherFactory};

/// Capacity of the hand-off channel between the watch loop and the directory-registration
/// worker. See the design note on the watcher-registration deadlock hazard.
const PENDING_WATCHES_CAPACITY: usize = 100;

/// Everything protected by the primary lock: the indices, dirty map, and service flags.
pub(crate) struct State {
    pub(crate) files: FileIndex,
    pub(crate) tags: TagIndex,
    pub(crate) dirs: DirIndex,
    pub(crate) dirty: DirtyMap,
    pub(crate) stale: bool,
    pub(crate) version: Version,
    pub(crate) ready: bool,
    pub(crate) ignore: IgnoreList,
}

impl State {
    fn cold(root: &Path) -> Self {
        Self {
            files: FileIndex::new(),
            tags: TagIndex::new(),
            dirs: DirIndex::new(),
            dirty: DirtyMap::new(),
            stale: false,
            version: 0,
            ready: false,
            ignore: IgnoreList::load(root),
        }
    }

    fn reset(&mut self, root: &Path) {
        self.files.clear();
        self.tags.clear();
        self.dirs.clear();
        self.dirty.drain();
        self.stale = false;
        self.ready = false;
        self.ignore = IgnoreList::load(root);
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// Background-task handles and the watcher itself, guarded by a lock distinct from `State` so
/// lifecycle transitions never contend with index reads/writes.
#[derive(Default)]
pub(crate) struct Lifecycle {
    pub(crate) watcher: Option<Box<dyn FsWatcher>>,
    watch_loop: Option<JoinHandle<()>>,
    pending_worker: Option<JoinHandle<()>>,
    stale_ticker: Option<JoinHandle<()>>,
}

impl Lifecycle {
    fn teardown(&mut self) {
        if let Some(h) = self.watch_loop.take() {
            h.abort();
        }
        if let Some(h) = self.pending_worker.take() {
            h.abort();
        }
        if let Some(h) = self.stale_ticker.take() {
            h.abort();
        }
        if let Some(mut w) = self.watcher.take() {
            w.close();
        }
    }
}

/// Live, in-memory metadata cache for a directory tree of Markdown notes.
///
/// Cheaply `Clone`-able (all shared state lives behind `Arc`); every clone refers to the same
/// underlying vault and background workers.
#[derive(Clone)]
pub struct CacheService {
    root: PathBuf,
    pub(crate) state: Arc<RwLock<State>>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    /// Serializes concurrent `ensure_ready`/resync crawls; not the same lock as `lifecycle`
    /// because a crawl holds this for its whole duration while still needing to take `state`'s
    /// write lock per file.
    crawl_lock: Arc<Mutex<()>>,
    watcher_factory: Option<SharedWatcherFactory>,
    stale_interval: Duration,
    pending: Arc<std::sync::Mutex<PendingChannel>>,
}

/// The pending-watches hand-off channel, replaced wholesale on every resync since the old
/// receiver is consumed by the aborted registrar task.
struct PendingChannel {
    tx: mpsc::Sender<PathBuf>,
    rx: Option<mpsc::Receiver<PathBuf>>,
}

impl PendingChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(PENDING_WATCHES_CAPACITY);
        Self { tx, rx: Some(rx) }
    }
}

impl CacheService {
    /// Creates a cold service over `root`. No I/O happens until [`CacheService::ensure_ready`].
    pub fn new(root: impl Into<PathBuf>, mut options: CacheOptions) -> CacheResult<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(CacheError::Configuration(root));
        }

        let watcher = options.watcher.take();

        Ok(Self {
            state: Arc::new(RwLock::new(State::cold(&root))),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                watcher,
                ..Lifecycle::default()
            })),
            crawl_lock: Arc::new(Mutex::new(())),
            watcher_factory: options.watcher_factory.map(Arc::from),
            stale_interval: options.stale_interval,
            pending: Arc::new(std::sync::Mutex::new(PendingChannel::new())),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn is_ready(&self) -> bool {
        self.state.read().await.ready
    }

    /// Performs the initial crawl and starts background workers if not already ready. Safe to
    /// call concurrently: exactly one caller performs the crawl, others wait for it and then
    /// catch up with a `refresh`.
    pub async fn ensure_ready(&self, cancel: &CancellationToken) -> CacheResult<()> {
        if self.is_ready().await {
            return Ok(());
        }
        match self.crawl_lock.try_lock() {
            Ok(_guard) => {
                if self.is_ready().await {
                    return Ok(());
                }
                self.start_background_workers().await;
                crawl::run_initial_crawl(self, cancel).await
            }
            Err(_) => {
                let _guard = self.crawl_lock.lock().await;
                drop(_guard);
                self.refresh(cancel).await
            }
        }
    }

    /// Drains pending dirty markers (or performs a full resync if stale), bumping `version` if
    /// anything changed.
    pub async fn refresh(&self, cancel: &CancellationToken) -> CacheResult<()> {
        let (stale, dirty) = {
            let mut state = self.state.write().await;
            let stale = std::mem::replace(&mut state.stale, false);
            (stale, state.dirty.drain())
        };

        if stale {
            info!("cache stale, performing full resync");
            return workers::resync(self, cancel).await;
        }

        if dirty.is_empty() {
            return Ok(());
        }

        crawl::apply_dirty(self, dirty, cancel).await
    }

    /// Snapshot of currently indexed paths. Does not refresh first.
    pub async fn paths(&self) -> Vec<String> {
        self.state.read().await.files.paths()
    }

    /// Deep-copied entry for `path` (normalized internally), or `None` if absent. Does not
    /// refresh first.
    pub async fn entry(&self, path: &str) -> Option<Entry> {
        let normalized = crate::extract::normalize_path(path);
        self.state.read().await.files.get(&normalized).cloned()
    }

    /// Deep-copied snapshot of every entry, refreshed first.
    pub async fn entries_snapshot(&self, cancel: &CancellationToken) -> CacheResult<Vec<Entry>> {
        self.ensure_ready(cancel).await?;
        self.refresh(cancel).await?;
        Ok(self.state.read().await.files.values().cloned().collect())
    }

    /// Current monotonic version.
    pub async fn version(&self) -> Version {
        self.state.read().await.version
    }

    /// Releases the watcher and cancels all background work. Idempotent.
    pub async fn close(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.teardown();
    }

    pub(crate) fn watcher_factory(&self) -> Option<&SharedWatcherFactory> {
        self.watcher_factory.as_ref()
    }

    pub(crate) fn stale_interval(&self) -> Duration {
        self.stale_interval
    }

    pub(crate) async fn lifecycle(&self) -> tokio::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().await
    }

    pub(crate) fn pending_tx(&self) -> mpsc::Sender<PathBuf> {
        self.pending.lock().unwrap().tx.clone()
    }

    pub(crate) fn take_pending_rx(&self) -> Option<mpsc::Receiver<PathBuf>> {
        self.pending.lock().unwrap().rx.take()
    }

    /// Replaces the pending-watches channel with a fresh pair. Called during resync since the
    /// previous receiver was owned by the just-aborted registrar task.
    pub(crate) fn reset_pending_channel(&self) {
        *self.pending.lock().unwrap() = PendingChannel::new();
    }

    /// Starts the watch loop, pending-watches registrar, and stale ticker, unless they are
    /// already running. Called once from the first `ensure_ready` and again after every resync.
    async fn start_background_workers(&self) {
        let mut lifecycle = self.lifecycle().await;

        if lifecycle.watcher.is_none() {
            if let Some(factory) = &self.watcher_factory {
                match factory() {
                    Ok(w) => lifecycle.watcher = Some(w),
                    Err(e) => {
                        warn!(error = %e, "watcher construction failed, degrading to polling");
                    }
                }
            }
        }

        let degraded = lifecycle.watcher.is_none();
        let effective_stale_interval = if degraded {
            DEFAULT_DEGRADED_STALE_INTERVAL
        } else {
            self.stale_interval
        };

        if lifecycle.watch_loop.is_none() {
            if let Some(watcher) = lifecycle.watcher.as_mut() {
                if let (Some(events), Some(errors)) =
                    (watcher.take_events(), watcher.take_errors())
                {
                    lifecycle.watch_loop =
                        Some(workers::spawn_watch_loop(self.clone(), events, errors));
                }
            }
        }

        if lifecycle.pending_worker.is_none() {
            if let Some(rx) = self.take_pending_rx() {
                lifecycle.pending_worker = Some(workers::spawn_pending_registrar(self.clone(), rx));
            }
        }

        if lifecycle.stale_ticker.is_none() && !effective_stale_interval.is_zero() {
            lifecycle.stale_ticker =
                Some(workers::spawn_stale_ticker(self.clone(), effective_stale_interval));
        }
    }
}
