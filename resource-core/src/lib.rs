//! Resource Core
//!
//! This crate provides reactive resources: values with a lifecycle that are
//! created lazily, kept up to date as the reactive state they read changes,
//! and torn down with their owner.
//!
//! It implements:
//!
//! - Revision-based dependency tracking (tags, cells, memo caches)
//! - A destroyable forest with ordered, exactly-once cleanup
//! - Function-based and class-based resources, factories and `Use` bindings
//! - Tracked async functions with last-invocation-wins semantics
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `tracking`: tags, tracking frames, [`Cell`] and [`MemoCache`]
//! - `destroyable`: owners and the destructor registry
//! - `resource`: resource definitions, handles, bindings and proxies
//! - `util`: async helpers built on resources
//!
//! # Example
//!
//! ```rust
//! use resource_core::{cell, resource_in, Owner, Produced};
//!
//! let owner = Owner::new();
//! let count = cell(1);
//!
//! let count_clone = count.clone();
//! let doubled = resource_in(&owner, move |hooks| {
//!     let n = count_clone.current();
//!     hooks.on_cleanup(move || println!("dropping run for {n}"));
//!     Produced::Value(n * 2)
//! })
//! .unwrap();
//!
//! assert_eq!(doubled.value(), 2);
//! count.set(5);
//! // The previous run's cleanup fires, then setup runs again.
//! assert_eq!(doubled.value(), 10);
//!
//! owner.destroy();
//! ```

pub mod destroyable;
pub mod error;
pub mod resource;
pub mod tracking;
pub mod util;

pub use destroyable::{DestroyOnDrop, Owner, OwnerId};
pub use error::{ResourceError, Result};
pub use resource::{
    resource, resource_factory, resource_in, thunk, use_resource, AccessProxy, Args, ClassResource,
    Context, Current, DefinitionId, Entry, Hooks, Instance, Produced, ResourceConfig,
    ResourceFactory, ResourceHandle, ResourceState, Thunk, Use,
};
pub use tracking::{cell, create_cache, get_value, has_changed, track, untrack, Cell, MemoCache};
pub use util::{
    tracked_function, tracked_function_with_initial, AbortController, AbortSignal, AsyncError,
    AsyncState,
};
