//! Error types for the resource engine.
//!
//! Only misuse of the API is reported through [`ResourceError`]. Panics raised
//! by user setup or update code are never caught here and propagate to the
//! caller of the read that triggered the recomputation.

use thiserror::Error;

use crate::destroyable::OwnerId;

/// Errors reported by the resource engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The owner is destroying or already destroyed, so nothing can be
    /// attached to it anymore.
    #[error("owner {0:?} is destroyed or being destroyed")]
    OwnerDestroyed(OwnerId),

    /// Associating `child` under `parent` would create a cycle.
    #[error("cannot associate {child:?} under {parent:?}: {child:?} is the parent or one of its ancestors")]
    CyclicAssociation { parent: OwnerId, child: OwnerId },

    /// The child already belongs to another parent.
    #[error("{child:?} is already associated with parent {parent:?}")]
    AlreadyAssociated { parent: OwnerId, child: OwnerId },

    /// `from_context` was called with a thunk as its context and a second thunk.
    #[error("`from_context` received a thunk as its context and an additional thunk; pass an owner as the context instead")]
    UnexpectedThunk,

    /// The resource was destroyed before it was ever read.
    #[error("resource was destroyed before its value was first read")]
    Destroyed,

    /// An async producer was started outside of a tokio runtime.
    #[error("no tokio runtime is available to drive the async producer")]
    NoAsyncRuntime,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ResourceError>;
