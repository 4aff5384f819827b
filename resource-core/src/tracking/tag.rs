//! Revision Tags
//!
//! A tag is the unit of invalidation. Every piece of reactive state owns one
//! tag; reading the state *consumes* the tag (records it in the active
//! tracking frame) and writing the state *dirties* it (moves it to a fresh
//! revision).
//!
//! # Revisions
//!
//! All tags share one global, monotonically increasing revision clock. A
//! dependency is recorded as the pair `(tag, revision seen)`. The dependency
//! has changed exactly when the tag's current revision differs from the one
//! that was seen, which makes the check O(1) per dependency and needs no
//! back-edges from state to its readers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use super::context::TrackingFrame;

/// The global revision clock. Starts at 1 so that 0 never matches a
/// recorded revision.
static REVISION: AtomicU64 = AtomicU64::new(1);

/// Counter for generating unique tag IDs.
static TAG_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Advance the global clock and return the new revision.
fn bump_revision() -> u64 {
    REVISION.fetch_add(1, Ordering::AcqRel) + 1
}

/// The current value of the global revision clock.
pub fn current_revision() -> u64 {
    REVISION.load(Ordering::Acquire)
}

/// A revision tag attached to one piece of reactive state.
///
/// Cloning a tag yields another handle to the same revision cell.
#[derive(Clone)]
pub struct Tag {
    id: u64,
    revision: Arc<AtomicU64>,
}

impl Tag {
    /// Create a fresh tag at the current revision.
    pub fn new() -> Self {
        Self {
            id: TAG_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            revision: Arc::new(AtomicU64::new(current_revision())),
        }
    }

    /// The tag's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The revision at which this tag was last dirtied.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Record this tag as a dependency of the active tracking frame, if any.
    pub fn consume(&self) {
        TrackingFrame::record(self);
    }

    /// Mark the state behind this tag as changed.
    pub fn dirty(&self) {
        self.revision.store(bump_revision(), Ordering::Release);
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tag")
            .field("id", &self.id)
            .field("revision", &self.revision())
            .finish()
    }
}

/// One recorded read: the tag and the revision it had when it was read.
#[derive(Debug, Clone)]
struct Dependency {
    tag: Tag,
    seen: u64,
}

/// The opaque set of dependencies read during one tracked computation.
///
/// Consumers only ever ask whether it [`has_changed`](Self::has_changed).
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    entries: SmallVec<[Dependency; 4]>,
}

impl DependencySet {
    /// Create an empty dependency set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a read of `tag` at its current revision.
    ///
    /// Repeated reads of the same tag keep the earliest observation, which is
    /// the one the computation's result was derived from.
    pub(crate) fn insert(&mut self, tag: &Tag) {
        if self.entries.iter().any(|dep| dep.tag.id == tag.id) {
            return;
        }
        self.entries.push(Dependency {
            tag: tag.clone(),
            seen: tag.revision(),
        });
    }

    /// Merge every entry of `other` into this set.
    pub(crate) fn extend(&mut self, other: &DependencySet) {
        for dep in &other.entries {
            if self.entries.iter().any(|d| d.tag.id == dep.tag.id) {
                continue;
            }
            self.entries.push(dep.clone());
        }
    }

    /// Whether any dependency was dirtied after it was read.
    pub fn has_changed(&self) -> bool {
        self.entries.iter().any(|dep| dep.tag.revision() != dep.seen)
    }

    /// Number of distinct tags in the set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing reactive was read.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Free-function form of [`DependencySet::has_changed`].
pub fn has_changed(deps: &DependencySet) -> bool {
    deps.has_changed()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_ids_are_unique() {
        let t1 = Tag::new();
        let t2 = Tag::new();
        assert_ne!(t1.id(), t2.id());
    }

    #[test]
    fn dirty_advances_revision() {
        let tag = Tag::new();
        let before = tag.revision();
        tag.dirty();
        assert!(tag.revision() > before);
    }

    #[test]
    fn dependency_set_detects_change() {
        let tag = Tag::new();
        let mut deps = DependencySet::new();
        deps.insert(&tag);

        assert!(!deps.has_changed());
        tag.dirty();
        assert!(deps.has_changed());
        assert!(has_changed(&deps));
    }

    #[test]
    fn dependency_set_ignores_duplicate_reads() {
        let tag = Tag::new();
        let mut deps = DependencySet::new();
        deps.insert(&tag);
        deps.insert(&tag);
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn unrelated_tag_does_not_invalidate() {
        let read = Tag::new();
        let other = Tag::new();
        let mut deps = DependencySet::new();
        deps.insert(&read);

        other.dirty();
        assert!(!deps.has_changed());
    }

    #[test]
    fn extend_merges_without_duplicates() {
        let a = Tag::new();
        let b = Tag::new();

        let mut left = DependencySet::new();
        left.insert(&a);

        let mut right = DependencySet::new();
        right.insert(&a);
        right.insert(&b);

        left.extend(&right);
        assert_eq!(left.len(), 2);

        b.dirty();
        assert!(left.has_changed());
    }
}
