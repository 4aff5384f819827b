//! Destroyables
//!
//! Owners form a forest: every owner may have one parent and many children,
//! and each owner carries an ordered list of cleanup callbacks. Destroying an
//! owner tears down its whole subtree exactly once.
//!
//! The forest lives in a process-wide arena keyed by [`OwnerId`]. Entries are
//! evicted explicitly when an owner is destroyed; nothing relies on drop
//! order or reference counts to run cleanup.

mod owner;
mod registry;

pub use owner::{DestroyOnDrop, Owner, OwnerId};
pub use registry::{destroy, register_child, register_destructor, Registry};
