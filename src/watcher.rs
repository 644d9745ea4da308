//! The injectable filesystem-watcher capability.
//!
//! The Cache Service never talks to `notify` directly; it talks to [`FsWatcher`], so tests can
//! inject a channel-backed fake and production code gets [`NotifyWatcher`], a thin wrapper over
//! `notify::RecommendedWatcher`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

/// The filesystem operations a watch event may represent. A single event's `ops` may intersect
/// more than one of these (mirroring `notify`'s own `EventKind` granularity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOp {
    Create,
    Write,
    Remove,
    Rename,
}

/// A single filesystem change notification.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub ops: Vec<WatchOp>,
}

impl WatchEvent {
    pub fn has(&self, op: WatchOp) -> bool {
        self.ops.contains(&op)
    }
}

/// An error surfaced on the watcher's error channel.
#[derive(Debug, Clone)]
pub struct WatchError(pub String);

/// Capability set a filesystem watcher must provide.
///
/// Implementors hand out event/error receivers once; the Cache Service owns them for the
/// lifetime of the watcher and never re-requests them.
pub trait FsWatcher: Send {
    /// Registers `dir` for watching. Called non-recursively — the watch loop itself recurses by
    /// registering every directory it discovers, so implementations need not watch subtrees.
    fn watch_dir(&mut self, dir: &Path) -> std::io::Result<()>;

    /// Releases the watcher and any OS resources it holds. Idempotent.
    fn close(&mut self);

    /// Takes the event receiver. Returns `None` if already taken.
    fn take_events(&mut self) -> Option<mpsc::Receiver<WatchEvent>>;

    /// Takes the error receiver. Returns `None` if already taken.
    fn take_errors(&mut self) -> Option<mpsc::Receiver<WatchError>>;
}

/// Builds a fresh watcher, used to rebuild after a resync or when no watcher was injected at
/// construction.
pub type WatcherFactory = Box<dyn Fn() -> std::io::Result<Box<dyn FsWatcher>> + Send + Sync>;

/// An `Arc`-shared factory, used once a [`CacheOptions`](crate::config::CacheOptions)'s owned
/// [`WatcherFactory`] is installed on a [`crate::cache::CacheService`] and must be called again
/// after every resync.
pub type SharedWatcherFactory = Arc<dyn Fn() -> std::io::Result<Box<dyn FsWatcher>> + Send + Sync>;

/// Default [`FsWatcher`] backed by `notify::RecommendedWatcher`.
///
/// `notify`'s callback runs on its own internal thread; events and errors are forwarded onto
/// bounded `tokio::mpsc` channels so the rest of the cache only ever deals in async-friendly
/// receivers.
pub struct NotifyWatcher {
    inner: Option<notify::RecommendedWatcher>,
    events_rx: Option<mpsc::Receiver<WatchEvent>>,
    errors_rx: Option<mpsc::Receiver<WatchError>>,
}

impl NotifyWatcher {
    pub fn new() -> std::io::Result<Self> {
        use notify::Watcher;

        let (events_tx, events_rx) = mpsc::channel(256);
        let (errors_tx, errors_rx) = mpsc::channel(64);

        let watcher = notify::RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let ops = classify(&event.kind);
                    if ops.is_empty() {
                        return;
                    }
                    for path in event.paths {
                        let _ = events_tx.blocking_send(WatchEvent {
                            path,
                            ops: ops.clone(),
                        });
                    }
                }
                Err(e) => {
                    let _ = errors_tx.blocking_send(WatchError(e.to_string()));
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| std::io::Error::other(e.to_string()))?;

        Ok(Self {
            inner: Some(watcher),
            events_rx: Some(events_rx),
            errors_rx: Some(errors_rx),
        })
    }
}

fn classify(kind: &notify::EventKind) -> Vec<WatchOp> {
    use notify::EventKind;
    match kind {
        EventKind::Create(_) => vec![WatchOp::Create],
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => vec![WatchOp::Rename],
        EventKind::Modify(_) => vec![WatchOp::Write],
        EventKind::Remove(_) => vec![WatchOp::Remove],
        _ => vec![],
    }
}

impl FsWatcher for NotifyWatcher {
    fn watch_dir(&mut self, dir: &Path) -> std::io::Result<()> {
        use notify::Watcher;
        match self.inner.as_mut() {
            Some(w) => w
                .watch(dir, notify::RecursiveMode::NonRecursive)
                .map_err(|e| std::io::Error::other(e.to_string())),
            None => Err(std::io::Error::other("watcher closed")),
        }
    }

    fn close(&mut self) {
        self.inner = None;
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<WatchEvent>> {
        self.events_rx.take()
    }

    fn take_errors(&mut self) -> Option<mpsc::Receiver<WatchError>> {
        self.errors_rx.take()
    }
}

/// A channel-backed fake used by tests to drive the watch loop without touching a real
/// filesystem watcher.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Handle retained by a test to push events/errors and inspect registered directories.
    #[derive(Clone)]
    pub struct FakeWatcherHandle {
        events_tx: mpsc::Sender<WatchEvent>,
        errors_tx: mpsc::Sender<WatchError>,
        watched: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl FakeWatcherHandle {
        pub async fn send_event(&self, event: WatchEvent) {
            let _ = self.events_tx.send(event).await;
        }

        pub async fn send_error(&self, message: impl Into<String>) {
            let _ = self.errors_tx.send(WatchError(message.into())).await;
        }

        pub fn watched_dirs(&self) -> Vec<PathBuf> {
            self.watched.lock().unwrap().clone()
        }
    }

    pub struct FakeWatcher {
        events_rx: Option<mpsc::Receiver<WatchEvent>>,
        errors_rx: Option<mpsc::Receiver<WatchError>>,
        watched: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl FakeWatcher {
        pub fn new() -> (Box<dyn FsWatcher>, FakeWatcherHandle) {
            let (events_tx, events_rx) = mpsc::channel(256);
            let (errors_tx, errors_rx) = mpsc::channel(64);
            let watched = Arc::new(Mutex::new(Vec::new()));
            let handle = FakeWatcherHandle {
                events_tx,
                errors_tx,
                watched: watched.clone(),
            };
            let watcher = FakeWatcher {
                events_rx: Some(events_rx),
                errors_rx: Some(errors_rx),
                watched,
            };
            (Box::new(watcher), handle)
        }
    }

    impl FsWatcher for FakeWatcher {
        fn watch_dir(&mut self, dir: &Path) -> std::io::Result<()> {
            self.watched.lock().unwrap().push(dir.to_path_buf());
            Ok(())
        }

        fn close(&mut self) {}

        fn take_events(&mut self) -> Option<mpsc::Receiver<WatchEvent>> {
            self.events_rx.take()
        }

        fn take_errors(&mut self) -> Option<mpsc::Receiver<WatchError>> {
            self.errors_rx.take()
        }
    }
}
