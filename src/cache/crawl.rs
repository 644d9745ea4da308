//! The two-phase initial crawl, per-file refresh, and dirty-map application.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{CacheError, CacheResult};
use crate::extract;
use crate::ignore::IgnoreList;
use crate::model::{DirtyKind, Entry};

use super::CacheService;

/// Walks `base`, registering every retained directory with the watcher and indexing every
/// retained Markdown file. Used both for the initial crawl (`base` = vault root) and for
/// rescanning a subtree after a directory-level `Created`/`Renamed` event.
async fn index_subtree(
    service: &CacheService,
    base: &Path,
    cancel: &CancellationToken,
) -> CacheResult<()> {
    let root = service.root().to_path_buf();
    let ignore = { service.state.read().await.ignore.clone() };

    let mut work_list: Vec<PathBuf> = Vec::new();
    let walker = WalkDir::new(base).into_iter().filter_entry(|entry| {
        let path = entry.path();
        if path == base {
            return true;
        }
        !ignore.is_ignored(&root, path)
    });

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        let entry = match entry {
            Ok(e) => e,
            Err(err) if err.depth() == 0 => {
                // The walk couldn't even read `base` itself (e.g. the vault root is
                // unreadable) — this isn't a per-file fault, so it's surfaced rather than
                // recovered from on the next refresh.
                let io_err = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("vault root unreadable"));
                return Err(CacheError::FatalCrawl {
                    path: base.to_path_buf(),
                    source: io_err,
                });
            }
            Err(err) => {
                warn!(error = %err, "crawl walk error, skipping entry");
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            register_dir(service, path).await;
            continue;
        }

        if !is_candidate_file(path, &ignore, &root) {
            continue;
        }
        work_list.push(path.to_path_buf());
    }

    for path in work_list {
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        if let Err(e) = refresh_path(service, &path).await {
            warn!(path = %path.display(), error = %e, "crawl read failed, marking dirty for retry");
            re_dirty(service, &path, DirtyKind::Modified).await;
        }
    }

    Ok(())
}

/// Hidden-file, extension, and ignore-list filtering for a single candidate file.
fn is_candidate_file(path: &Path, ignore: &IgnoreList, root: &Path) -> bool {
    let is_hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    if is_hidden {
        return false;
    }
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        return false;
    }
    !ignore.is_ignored(root, path)
}

async fn register_dir(service: &CacheService, dir: &Path) {
    let newly_registered = {
        let mut state = service.state.write().await;
        state.dirs.insert(dir.to_path_buf())
    };
    if !newly_registered {
        return;
    }
    let mut lifecycle = service.lifecycle().await;
    if let Some(watcher) = lifecycle.watcher.as_mut() {
        if let Err(e) = watcher.watch_dir(dir) {
            warn!(dir = %dir.display(), error = %e, "failed to register directory with watcher");
        }
    }
}

async fn re_dirty(service: &CacheService, abs_path: &Path, kind: DirtyKind) {
    let root = service.root();
    let normalized = extract::vault_relative(root, abs_path);
    service.state.write().await.dirty.mark(&normalized, kind);
}

/// Reads, extracts, and indexes a single file; removes it from the index if it no longer exists.
///
/// Returns an I/O error only for failures reading an existing file — a missing file is not an
/// error, it is observed as a deletion.
pub(crate) async fn refresh_path(service: &CacheService, abs_path: &Path) -> std::io::Result<()> {
    let root = service.root().to_path_buf();
    let normalized = extract::vault_relative(&root, abs_path);

    let meta = match tokio::fs::metadata(abs_path).await {
        Ok(m) => m,
        Err(_) => {
            remove_path(service, &normalized).await;
            return Ok(());
        }
    };

    if meta.is_dir() {
        return Ok(());
    }

    let ignored = {
        let state = service.state.read().await;
        state.ignore.is_ignored(&root, abs_path)
    };
    if ignored {
        remove_path(service, &normalized).await;
        return Ok(());
    }

    let content = tokio::fs::read_to_string(abs_path).await?;
    let (frontmatter, body) = extract::parse_frontmatter(&content);

    let mut tags = extract::extract_hashtags(body);
    if let Some(fm) = &frontmatter {
        tags.extend(extract::frontmatter_tags(fm));
    }
    let inline_props = extract::extract_inline_props(body);

    let mod_time = meta.modified().unwrap_or(std::time::SystemTime::now());
    let file_stem = abs_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let content_time =
        extract::derive_content_time(frontmatter.as_ref(), file_stem, body, mod_time);

    let entry = Entry {
        path: normalized.clone(),
        mod_time,
        size: meta.len(),
        tags,
        frontmatter,
        inline_props,
        content,
        content_time,
    };

    let mut state = service.state.write().await;
    state.tags.remove_path(&normalized);
    for tag in &entry.tags {
        state.tags.add(tag, &normalized);
    }
    state.files.insert(entry);

    Ok(())
}

async fn remove_path(service: &CacheService, normalized: &str) {
    let mut state = service.state.write().await;
    state.files.remove(normalized);
    state.tags.remove_path(normalized);
}

async fn remove_tree(service: &CacheService, normalized: &str) {
    let mut state = service.state.write().await;
    let removed = state.files.remove_tree(normalized);
    for path in removed {
        state.tags.remove_path(&path);
    }
}

/// Performs the two-phase initial crawl over the whole vault and marks the service ready.
pub(crate) async fn run_initial_crawl(
    service: &CacheService,
    cancel: &CancellationToken,
) -> CacheResult<()> {
    let root = service.root().to_path_buf();
    index_subtree(service, &root, cancel).await?;

    let mut state = service.state.write().await;
    state.ready = true;
    state.bump_version();
    Ok(())
}

/// Applies a drained dirty map per the refresh action table, returning once every path has been
/// reconciled. Bumps the version if at least one path changed.
pub(crate) async fn apply_dirty(
    service: &CacheService,
    dirty: BTreeMap<String, DirtyKind>,
    cancel: &CancellationToken,
) -> CacheResult<()> {
    let root = service.root().to_path_buf();
    let mut changed = false;

    for (path, kind) in dirty {
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        let abs = root.join(&path);

        match kind {
            DirtyKind::Removed | DirtyKind::Renamed => {
                remove_tree(service, &path).await;
                if kind == DirtyKind::Renamed {
                    let parent = abs.parent().unwrap_or(&root).to_path_buf();
                    index_subtree(service, &parent, cancel).await?;
                }
                changed = true;
            }
            DirtyKind::Recreated => {
                remove_tree(service, &path).await;
                match refresh_path(service, &abs).await {
                    Ok(()) => changed = true,
                    Err(e) => {
                        warn!(path = %abs.display(), error = %e, "recreate refresh failed, re-marking dirty");
                        re_dirty(service, &abs, DirtyKind::Modified).await;
                    }
                }
            }
            DirtyKind::Created | DirtyKind::Modified => {
                let is_dir = tokio::fs::metadata(&abs)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    index_subtree(service, &abs, cancel).await?;
                    changed = true;
                } else {
                    match refresh_path(service, &abs).await {
                        Ok(()) => changed = true,
                        Err(e) => {
                            warn!(path = %abs.display(), error = %e, "refresh failed, re-marking dirty");
                            re_dirty(service, &abs, DirtyKind::Modified).await;
                        }
                    }
                }
            }
        }
    }

    if changed {
        service.state.write().await.bump_version();
    }
    Ok(())
}
