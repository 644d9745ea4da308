//! Live, in-memory metadata cache for a directory tree of Markdown notes.
//!
//! [`cache::CacheService`] maintains a consistent, queryable snapshot of every Markdown file's
//! parsed metadata and keeps it synchronized with the filesystem via a watcher, with a polling
//! fallback when watching is degraded or unavailable. [`analysis::AnalysisCache`] memoizes the
//! two expensive derived computations — backlink collection and link-graph analysis — against
//! the Cache Service's monotonic version counter, so they are recomputed only when the
//! underlying cache has actually changed.
//!
//! Markdown syntax parsing (wikilinks, hashtags, frontmatter), vault-configuration discovery,
//! note mutation against the filesystem, and vector search are out of scope — see [`adapter`]
//! for the seam where those collaborators plug in.

pub mod adapter;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod derived;
pub mod error;
pub mod extract;
pub mod ignore;
pub mod logging;
pub mod model;
pub mod watcher;

pub use adapter::{CacheNoteReader, NoteReader};
pub use analysis::{AnalysisCache, SnapshotProvider};
pub use cache::CacheService;
pub use config::CacheOptions;
pub use error::{CacheError, CacheResult};
pub use model::{DirtyKind, Entry, Version};
