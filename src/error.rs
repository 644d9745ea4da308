//! Error taxonomy for the cache subsystem.
//!
//! Mirrors the propagation policy: per-file I/O and watcher faults recover locally (they never
//! appear here), while configuration, cancellation, and whole-crawl failures are surfaced to
//! callers.

use std::path::PathBuf;

/// Errors surfaced by public [`crate::cache::CacheService`] and [`crate::analysis::AnalysisCache`]
/// operations.
///
/// `TransientIo` and `WatcherFault` are deliberately absent: per the propagation policy in the
/// design, both are recovered locally (the former by re-dirtying a path, the latter by resync on
/// the next refresh) and never escape to a caller.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The vault root supplied at construction was empty or not a usable path.
    #[error("vault root is empty or invalid: {0:?}")]
    Configuration(PathBuf),

    /// The requested operation was cancelled before it could complete.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O failure during the initial crawl that is not attributable to a single file (e.g. the
    /// vault root itself could not be read).
    #[error("crawl of {path:?} failed: {source}")]
    FatalCrawl {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `NoteReader` mutating method was called. These are pass-through stubs only — real
    /// mutation against the filesystem is an out-of-scope collaborator's job.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A direct filesystem read failed, e.g. the `NoteReader` fallback path for a name not yet
    /// present in the cache.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the cache crate.
pub type CacheResult<T> = Result<T, CacheError>;
