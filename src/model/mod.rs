//! Core data types shared by the cache and analysis layers.

mod dirty;
mod entry;
mod index;

pub use dirty::{DirtyKind, DirtyMap};
pub use entry::{Entry, Frontmatter, InlineProps};
pub use index::{DirIndex, FileIndex, TagIndex};

/// Monotonic, non-decreasing counter identifying the logical state of a [`crate::cache::CacheService`].
///
/// Used as a cache key by the [`crate::analysis::AnalysisCache`].
pub type Version = u64;
