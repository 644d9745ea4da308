//! `DirtyMap` and the dirty-marker coalescing state machine.

use std::collections::BTreeMap;

/// The kind of change a dirty marker represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyKind {
    Created,
    Modified,
    Removed,
    Renamed,
    /// A path was removed and then created again before the next refresh drained it.
    Recreated,
}

/// Mapping from normalized, vault-relative path to its pending [`DirtyKind`].
///
/// Populated by the watch loop via [`DirtyMap::mark`]; drained wholesale by `refresh`.
#[derive(Debug, Default)]
pub struct DirtyMap {
    marks: BTreeMap<String, DirtyKind>,
}

impl DirtyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the coalescing state machine for a new `kind` observed on `path`.
    ///
    /// Transitions (left-to-right fold over a sequence of marks on the same path):
    /// - (absent, k) → k
    /// - (Removed, Created|Modified) → Recreated
    /// - (Recreated, Removed) → Removed
    /// - (Removed, *) → Removed ("sticky delete")
    /// - (*, Removed) → Removed
    /// - otherwise → unchanged
    pub fn mark(&mut self, path: &str, kind: DirtyKind) {
        let next = match (self.marks.get(path).copied(), kind) {
            (None, k) => k,
            (Some(DirtyKind::Removed), DirtyKind::Created | DirtyKind::Modified) => {
                DirtyKind::Recreated
            }
            (Some(DirtyKind::Recreated), DirtyKind::Removed) => DirtyKind::Removed,
            (Some(DirtyKind::Removed), _) => DirtyKind::Removed,
            (_, DirtyKind::Removed) => DirtyKind::Removed,
            (Some(existing), _) => existing,
        };
        self.marks.insert(path.to_string(), next);
    }

    /// Atomically takes the entire map, leaving an empty one behind.
    pub fn drain(&mut self) -> BTreeMap<String, DirtyKind> {
        std::mem::take(&mut self.marks)
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(kinds: &[DirtyKind]) -> Option<DirtyKind> {
        let mut map = DirtyMap::new();
        for k in kinds {
            map.mark("p", *k);
        }
        map.marks.get("p").copied()
    }

    #[test]
    fn first_mark_is_identity() {
        assert_eq!(fold(&[DirtyKind::Created]), Some(DirtyKind::Created));
        assert_eq!(fold(&[DirtyKind::Modified]), Some(DirtyKind::Modified));
    }

    #[test]
    fn removed_then_created_becomes_recreated() {
        assert_eq!(
            fold(&[DirtyKind::Removed, DirtyKind::Created]),
            Some(DirtyKind::Recreated)
        );
        assert_eq!(
            fold(&[DirtyKind::Removed, DirtyKind::Modified]),
            Some(DirtyKind::Recreated)
        );
    }

    #[test]
    fn recreated_then_removed_is_removed() {
        assert_eq!(
            fold(&[DirtyKind::Removed, DirtyKind::Created, DirtyKind::Removed]),
            Some(DirtyKind::Removed)
        );
    }

    #[test]
    fn sticky_delete_survives_further_marks() {
        assert_eq!(
            fold(&[
                DirtyKind::Removed,
                DirtyKind::Created,
                DirtyKind::Removed,
                DirtyKind::Modified,
                DirtyKind::Modified,
            ]),
            Some(DirtyKind::Removed)
        );
    }

    #[test]
    fn any_removed_mark_wins_regardless_of_prior_state() {
        assert_eq!(
            fold(&[DirtyKind::Created, DirtyKind::Modified, DirtyKind::Removed]),
            Some(DirtyKind::Removed)
        );
    }

    #[test]
    fn repeated_modified_is_unchanged() {
        assert_eq!(
            fold(&[DirtyKind::Created, DirtyKind::Modified]),
            Some(DirtyKind::Created)
        );
    }

    #[test]
    fn drain_empties_the_map_and_returns_prior_contents() {
        let mut map = DirtyMap::new();
        map.mark("a", DirtyKind::Created);
        map.mark("b", DirtyKind::Modified);

        let drained = map.drain();
        assert_eq!(drained.len(), 2);
        assert!(map.is_empty());
    }
}
