//! The `Entry` record: cached metadata for one Markdown note.

use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use serde_json::Value;

/// Inline Dataview-style properties (`Key:: Value`), preserving insertion order per key.
pub type InlineProps = BTreeMap<String, Vec<String>>;

/// Frontmatter mapping from YAML key to JSON-decoded value.
///
/// Values are stored as [`serde_json::Value`] rather than a YAML-specific type so that `Entry`
/// stays `Send + Sync + Clone` without pulling a YAML value type into the public API; conversion
/// happens once in [`crate::extract::parse_frontmatter`].
pub type Frontmatter = BTreeMap<String, Value>;

/// Immutable-by-contract record describing one Markdown file.
///
/// Every field is owned data; the cache hands out a deep clone of an `Entry` on every read so
/// that mutating a returned value can never corrupt the cache (invariant (c) of the data model).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Vault-relative, forward-slash-normalized path with a `.md` suffix. Primary key.
    pub path: String,
    /// Filesystem modification time as last observed.
    pub mod_time: SystemTime,
    /// Filesystem size in bytes as last observed.
    pub size: u64,
    /// Normalized tags (lowercase, no leading `#`), deduplicated across frontmatter and inline
    /// sources.
    pub tags: BTreeSet<String>,
    /// Parsed YAML frontmatter, or `None` if the file has none.
    pub frontmatter: Option<Frontmatter>,
    /// Inline `Key:: Value` properties in file order.
    pub inline_props: InlineProps,
    /// Full file body.
    pub content: String,
    /// Best-effort content timestamp: frontmatter date, filename date, heading date, else
    /// `mod_time`.
    pub content_time: SystemTime,
}

impl Entry {
    /// Returns `true` if this entry carries the given normalized tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
