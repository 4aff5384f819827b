//! Cell Implementation
//!
//! A [`Cell`] is the smallest piece of reactive state: a mutable box whose
//! reads are tracked and whose writes invalidate every computation that read
//! it.
//!
//! # How Cells Work
//!
//! 1. Reading [`Cell::current`] consumes the cell's tag in the active tracking
//!    frame.
//!
//! 2. Writing through [`Cell::set`], [`Cell::update`] or [`Cell::toggle`]
//!    dirties the tag.
//!
//! 3. Memoized computations that read the cell see a changed dependency on
//!    their next read and recompute.
//!
//! # Thread Safety
//!
//! The value is behind a `parking_lot::RwLock` and the tag is atomic, so cells
//! may be read and written from any thread. [`Cell::update`] holds the write
//! lock across the read-modify-write, so concurrent updates are never lost.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::tag::Tag;

/// A tracked mutable box.
///
/// Clones share the same value and tag.
///
/// # Example
///
/// ```rust
/// use resource_core::cell;
///
/// let count = cell(1);
/// count.update(|n| n + 1);
/// assert_eq!(count.current(), 2);
/// ```
pub struct Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    tag: Tag,
    value: Arc<RwLock<T>>,
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            tag: Tag::new(),
            value: Arc::new(RwLock::new(value)),
        }
    }

    /// Read the current value, tracking the read.
    pub fn current(&self) -> T {
        self.tag.consume();
        self.value.read().clone()
    }

    /// Read the current value without tracking it.
    pub fn current_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Replace the value and invalidate readers.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.tag.dirty();
    }

    /// Replace the value with `f(current)`.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        {
            let mut guard = self.value.write();
            let next = f(&guard);
            *guard = next;
        }
        self.tag.dirty();
    }

    /// The tag backing this cell.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }
}

impl Cell<bool> {
    /// Flip a boolean cell.
    pub fn toggle(&self) {
        self.update(|v| !v);
    }
}

impl<T> Default for Cell<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("tag", &self.tag.id())
            .field("current", &self.current_untracked())
            .finish()
    }
}

/// Create a [`Cell`] holding `initial`.
pub fn cell<T>(initial: T) -> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    Cell::new(initial)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
