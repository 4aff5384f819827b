//! Owner handles.
//!
//! An [`Owner`] is a lifetime scope: a component instance, a resource, one
//! run of a resource's setup function. Owners are plain IDs into the
//! process-wide registry, so they are `Copy` and can be captured freely by
//! cleanup callbacks.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

use super::registry::Registry;

/// Unique identifier for an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Generate a new unique owner ID.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A handle to a destroyable lifetime scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    id: OwnerId,
}

impl Owner {
    /// Create a new root owner.
    pub fn new() -> Self {
        Self {
            id: Registry::create(),
        }
    }

    pub(crate) fn from_id(id: OwnerId) -> Self {
        Self { id }
    }

    /// The owner's ID.
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Create a new owner destroyed no later than this one.
    pub fn child(&self) -> Result<Owner> {
        let child = Owner::new();
        if let Err(err) = Registry::register_child(self.id, child.id) {
            Registry::destroy(child.id);
            return Err(err);
        }
        Ok(child)
    }

    /// Associate an existing owner as a child of this one.
    pub fn associate(&self, child: &Owner) -> Result<()> {
        Registry::register_child(self.id, child.id)
    }

    /// Register a callback to run when this owner is destroyed.
    pub fn register_destructor<F>(&self, destructor: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        Registry::register_destructor(self.id, destructor)
    }

    /// Destroy this owner and everything associated below it.
    pub fn destroy(&self) {
        Registry::destroy(self.id);
    }

    /// Whether destruction has started (or finished).
    pub fn is_destroying(&self) -> bool {
        Registry::is_destroying(self.id)
    }

    /// Whether destruction has finished.
    pub fn is_destroyed(&self) -> bool {
        Registry::is_destroyed(self.id)
    }

    /// The owner this one is associated under, if any.
    pub fn parent(&self) -> Option<Owner> {
        Registry::parent(self.id).map(Owner::from_id)
    }

    /// Owners currently associated under this one.
    pub fn children(&self) -> Vec<Owner> {
        Registry::children(self.id)
            .into_iter()
            .map(Owner::from_id)
            .collect()
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

/// Destroys the wrapped owner when dropped.
#[derive(Debug)]
pub struct DestroyOnDrop(Owner);

impl DestroyOnDrop {
    /// Guard a new root owner.
    pub fn new() -> Self {
        Self(Owner::new())
    }

    /// The guarded owner.
    pub fn owner(&self) -> &Owner {
        &self.0
    }
}

impl Default for DestroyOnDrop {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Owner> for DestroyOnDrop {
    fn from(owner: Owner) -> Self {
        Self(owner)
    }
}

impl std::ops::Deref for DestroyOnDrop {
    type Target = Owner;

    fn deref(&self) -> &Owner {
        &self.0
    }
}

impl Drop for DestroyOnDrop {
    fn drop(&mut self) {
        self.0.destroy();
    }
}
