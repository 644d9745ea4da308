//! Configuration for a [`crate::cache::CacheService`].

use std::time::Duration;

use crate::watcher::{FsWatcher, WatcherFactory};

/// Stale interval installed automatically when watcher construction fails and the caller did not
/// request one of their own.
pub const DEFAULT_DEGRADED_STALE_INTERVAL: Duration = Duration::from_secs(30);

/// Construction-time options for a [`crate::cache::CacheService`].
///
/// There is no external file format for these beyond the vault's own `.obsidianignore`; every
/// field is an explicit struct value set by the caller.
pub struct CacheOptions {
    /// A prebuilt watcher to use instead of constructing one from `watcher_factory`. Consumed on
    /// the first `ensure_ready` call.
    pub watcher: Option<Box<dyn FsWatcher>>,
    /// Builds a fresh watcher, used for the initial watcher when `watcher` is absent and to
    /// rebuild one after a resync.
    pub watcher_factory: Option<WatcherFactory>,
    /// Interval at which the stale ticker fires. `Duration::ZERO` disables it, unless watcher
    /// construction failed, in which case [`DEFAULT_DEGRADED_STALE_INTERVAL`] is used regardless.
    pub stale_interval: Duration,
}

impl CacheOptions {
    /// No injected watcher or factory, stale ticker disabled. Suitable only when the caller will
    /// drive `refresh` explicitly (e.g. most tests).
    pub fn disabled_watcher() -> Self {
        Self {
            watcher: None,
            watcher_factory: None,
            stale_interval: Duration::ZERO,
        }
    }

    /// Uses the default `notify`-backed watcher, rebuildable after a resync, with no stale ticker
    /// beyond the degraded fallback.
    pub fn with_default_watcher() -> Self {
        Self {
            watcher: None,
            watcher_factory: Some(Box::new(|| {
                crate::watcher::NotifyWatcher::new()
                    .map(|w| Box::new(w) as Box<dyn FsWatcher>)
            })),
            stale_interval: Duration::ZERO,
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::with_default_watcher()
    }
}

impl std::fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOptions")
            .field("watcher", &self.watcher.is_some())
            .field("watcher_factory", &self.watcher_factory.is_some())
            .field("stale_interval", &self.stale_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_watcher_has_no_ticker() {
        let opts = CacheOptions::disabled_watcher();
        assert!(opts.watcher.is_none());
        assert!(opts.watcher_factory.is_none());
        assert_eq!(opts.stale_interval, Duration::ZERO);
    }

    #[test]
    fn default_installs_a_factory() {
        let opts = CacheOptions::default();
        assert!(opts.watcher_factory.is_some());
    }
}
