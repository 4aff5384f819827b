//! Resources
//!
//! A resource is a value with a lifecycle: it is created lazily on first read,
//! updated when the reactive state it read changes, and torn down when its
//! owner is destroyed.
//!
//! # How Resources Work
//!
//! 1. A definition (a setup function, a [`ClassResource`] type, or a
//!    [`ResourceFactory`]) plus an optional argument thunk forms a
//!    [`ResourceConfig`].
//! 2. Binding the config to an [`Owner`](crate::Owner) yields a
//!    [`ResourceHandle`] whose scope is a child of that owner.
//! 3. The first read builds a memo cache around "normalize arguments, run the
//!    definition". Later reads pull through the cache, which only re-runs if
//!    something it read has changed.
//! 4. Destroying the owner destroys the scope and everything under it.

mod args;
mod binding;
mod class;
mod factory;
mod function;
mod handle;
mod hooks;
mod proxy;

pub use args::{normalize, normalize_thunk, thunk, Args, Thunk};
pub use binding::{use_resource, Use};
pub use class::{ClassResource, Context, Entry, Instance};
pub use factory::{resource_factory, ResourceFactory};
pub use function::{resource, resource_in};
pub use handle::{DefinitionId, ResourceConfig, ResourceHandle, ResourceState};
pub use hooks::{Hooks, Produced};
pub use proxy::{AccessProxy, Current};
