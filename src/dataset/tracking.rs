//! Per-subset change tracking for incremental saves.
//!
//! The tracker only ever over-approximates: a subset is reported dirty if
//! any operation could have changed its serialized form.

use std::collections::BTreeMap;

/// Persistence state of one subset relative to its last saved form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubsetState {
    /// On-disk form matches memory.
    #[default]
    Clean,
    /// Must be rewritten on the next save.
    Dirty,
    /// Has no items left; its artifacts are deleted on the next save.
    PendingDelete,
}

/// Records which subsets changed since the last save.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    states: BTreeMap<String, SubsetState>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `subset`; untracked subsets are clean.
    pub fn state(&self, subset: &str) -> SubsetState {
        self.states.get(subset).copied().unwrap_or_default()
    }

    /// Marks `subset` for rewriting. Revives a subset pending deletion.
    pub fn mark_dirty(&mut self, subset: &str) {
        self.states.insert(subset.to_string(), SubsetState::Dirty);
    }

    /// Marks `subset` as emptied.
    pub fn mark_removed(&mut self, subset: &str) {
        self.states
            .insert(subset.to_string(), SubsetState::PendingDelete);
    }

    pub fn mark_all_dirty<'a>(&mut self, subsets: impl IntoIterator<Item = &'a str>) {
        for subset in subsets {
            self.mark_dirty(subset);
        }
    }

    /// Subsets that must be rewritten, in name order.
    pub fn dirty_subsets(&self) -> Vec<String> {
        self.with_state(SubsetState::Dirty)
    }

    /// Subsets whose artifacts must be deleted, in name order.
    pub fn removed_subsets(&self) -> Vec<String> {
        self.with_state(SubsetState::PendingDelete)
    }

    fn with_state(&self, wanted: SubsetState) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, state)| **state == wanted)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.states
            .values()
            .all(|state| *state == SubsetState::Clean)
    }

    /// Forgets all changes; called once the dataset is persisted.
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untracked_subsets_are_clean() {
        let tracker = ChangeTracker::new();
        assert_eq!(tracker.state("train"), SubsetState::Clean);
        assert!(tracker.is_clean());
    }

    #[test]
    fn dirty_revives_pending_delete() {
        let mut tracker = ChangeTracker::new();
        tracker.mark_removed("c");
        assert_eq!(tracker.removed_subsets(), vec!["c".to_string()]);

        tracker.mark_dirty("c");
        assert_eq!(tracker.state("c"), SubsetState::Dirty);
        assert!(tracker.removed_subsets().is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let mut tracker = ChangeTracker::new();
        tracker.mark_all_dirty(["a", "b"]);
        tracker.mark_removed("c");
        assert_eq!(tracker.dirty_subsets(), vec!["a", "b"]);

        tracker.clear();
        assert!(tracker.is_clean());
        assert!(tracker.dirty_subsets().is_empty());
    }
}
