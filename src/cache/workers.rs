//! Background tasks: the watch loop, the pending-watches registrar, the stale ticker, and resync.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CacheResult;
use crate::model::DirtyKind;
use crate::watcher::{WatchEvent, WatchOp};

use super::crawl;
use super::CacheService;

async fn mark_dirty(service: &CacheService, path: &str, kind: DirtyKind) {
    service.state.write().await.dirty.mark(path, kind);
}

async fn mark_stale(service: &CacheService) {
    service.state.write().await.stale = true;
}

fn vault_relative(service: &CacheService, abs_path: &std::path::Path) -> String {
    crate::extract::vault_relative(service.root(), abs_path)
}

async fn handle_event(service: &CacheService, event: WatchEvent) {
    let path = vault_relative(service, &event.path);

    if event.has(WatchOp::Remove) {
        mark_dirty(service, &path, DirtyKind::Removed).await;
        service.state.write().await.dirs.remove(&event.path);
        return;
    }
    if event.has(WatchOp::Rename) {
        mark_dirty(service, &path, DirtyKind::Renamed).await;
        service.state.write().await.dirs.remove(&event.path);
        return;
    }
    if event.has(WatchOp::Create) {
        mark_dirty(service, &path, DirtyKind::Created).await;
        if tokio::fs::metadata(&event.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            let tx = service.pending_tx();
            if tx.try_send(event.path.clone()).is_err() {
                warn!(
                    dir = %event.path.display(),
                    "pending-watches channel full, directory will be picked up on next rescan"
                );
            }
        }
        return;
    }
    if event.has(WatchOp::Write) {
        mark_dirty(service, &path, DirtyKind::Modified).await;
    }
}

pub(crate) fn spawn_watch_loop(
    service: CacheService,
    mut events: mpsc::Receiver<WatchEvent>,
    mut errors: mpsc::Receiver<crate::watcher::WatchError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => handle_event(&service, event).await,
                    None => {
                        warn!("watcher event channel closed, marking cache stale");
                        mark_stale(&service).await;
                        break;
                    }
                },
                error = errors.recv() => match error {
                    Some(err) => {
                        warn!(error = %err.0, "watcher reported an error, marking cache stale");
                        mark_stale(&service).await;
                    }
                    None => {
                        break;
                    }
                },
            }
        }
    })
}

pub(crate) fn spawn_pending_registrar(
    service: CacheService,
    mut rx: mpsc::Receiver<PathBuf>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(dir) = rx.recv().await {
            let newly_registered = {
                let mut state = service.state.write().await;
                state.dirs.insert(dir.clone())
            };
            if !newly_registered {
                continue;
            }
            let mut lifecycle = service.lifecycle().await;
            if let Some(watcher) = lifecycle.watcher.as_mut() {
                if let Err(e) = watcher.watch_dir(&dir) {
                    warn!(dir = %dir.display(), error = %e, "failed to register directory with watcher");
                }
            }
        }
    })
}

pub(crate) fn spawn_stale_ticker(service: CacheService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // interval's first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            mark_stale(&service).await;
        }
    })
}

/// Tears down the watcher and all background tasks, rebuilds a watcher from the factory if one
/// is available, resets every index, and performs a fresh initial crawl.
pub(crate) async fn resync(service: &CacheService, cancel: &CancellationToken) -> CacheResult<()> {
    {
        let mut lifecycle = service.lifecycle().await;
        lifecycle.teardown();
    }
    service.reset_pending_channel();

    {
        let mut state = service.state.write().await;
        state.reset(service.root());
    }

    if let Some(factory) = service.watcher_factory() {
        match factory() {
            Ok(watcher) => {
                let mut lifecycle = service.lifecycle().await;
                lifecycle.watcher = Some(watcher);
            }
            Err(e) => {
                warn!(error = %e, "watcher rebuild failed during resync, staying in polling mode");
            }
        }
    }

    service.start_background_workers().await;
    crawl::run_initial_crawl(service, cancel).await?;
    info!("resync complete");
    Ok(())
}
