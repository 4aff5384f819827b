//! Class-based resources.
//!
//! A class-based resource is a long-lived object with one lifecycle hook,
//! [`ClassResource::modify`], called when the instance is created and again
//! every time its tracked arguments change. The instance itself survives
//! updates, so per-instance state carries over between them; only a change of
//! definition or the destruction of its owner replaces it.
//!
//! # Example
//!
//! ```rust
//! use resource_core::{cell, Args, ClassResource, Owner};
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct Doubler {
//!     doubled: i64,
//! }
//!
//! impl ClassResource for Doubler {
//!     fn new(_owner: Owner) -> Self {
//!         Self::default()
//!     }
//!
//!     fn modify(&mut self, args: &Args) {
//!         self.doubled = args.positional_as::<i64>(0).unwrap_or(0) * 2;
//!     }
//! }
//!
//! let owner = Owner::new();
//! let n = cell(3);
//! let n_arg = n.clone();
//! let doubler = Doubler::from_owner(&owner, move || json!([n_arg.current()])).unwrap();
//!
//! assert_eq!(doubler.proxy().with(|d| d.doubled), 6);
//! n.set(5);
//! assert_eq!(doubler.proxy().with(|d| d.doubled), 10);
//! owner.destroy();
//! ```

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::destroyable::Owner;
use crate::error::{ResourceError, Result};
use crate::tracking::{untrack, MemoCache};

use super::args::{normalize_thunk, Args, Thunk};
use super::handle::{Definition, DefinitionId, LiveInstance, ResourceConfig, ResourceHandle};

/// A live class-based resource instance.
pub type Instance<R> = Arc<RwLock<R>>;

/// The context passed to [`ClassResource::from_context`].
pub enum Context {
    /// Bind right away.
    Owner(Owner),
    /// Defer binding; the thunk supplies the arguments.
    Thunk(Thunk),
}

impl From<Owner> for Context {
    fn from(owner: Owner) -> Self {
        Context::Owner(owner)
    }
}

impl From<&Owner> for Context {
    fn from(owner: &Owner) -> Self {
        Context::Owner(*owner)
    }
}

impl From<Thunk> for Context {
    fn from(thunk: Thunk) -> Self {
        Context::Thunk(thunk)
    }
}

/// What [`ClassResource::from_context`] produced.
pub enum Entry<R>
where
    R: ClassResource,
{
    /// A config still to be bound, e.g. through a [`Use`](super::Use).
    Deferred(ResourceConfig<Instance<R>>),
    /// A handle bound to the given owner.
    Immediate(ResourceHandle<Instance<R>>),
}

impl<R: ClassResource> Entry<R> {
    pub fn into_deferred(self) -> Option<ResourceConfig<Instance<R>>> {
        match self {
            Entry::Deferred(config) => Some(config),
            Entry::Immediate(_) => None,
        }
    }

    pub fn into_immediate(self) -> Option<ResourceHandle<Instance<R>>> {
        match self {
            Entry::Immediate(handle) => Some(handle),
            Entry::Deferred(_) => None,
        }
    }
}

/// A resource backed by a long-lived instance.
pub trait ClassResource: Send + Sync + Sized + 'static {
    /// Construct the instance. `owner` is the instance's own scope: register
    /// destructors on it or bind nested resources to it.
    fn new(owner: Owner) -> Self;

    /// Called at creation and again whenever the tracked arguments change.
    fn modify(&mut self, args: &Args);

    /// Called once when the instance is destroyed, after any destructors the
    /// instance registered on its owner.
    fn teardown(&mut self) {}

    /// The deferred form: arguments come from `thunk`, the owner comes later.
    fn deferred<F>(thunk: F) -> ResourceConfig<Instance<Self>>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        config::<Self>(Some(Arc::new(thunk)))
    }

    /// The immediate form: bind to `owner` with arguments from `thunk`.
    fn from_owner<F>(owner: &Owner, thunk: F) -> Result<ResourceHandle<Instance<Self>>>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::deferred(thunk).bind(owner)
    }

    /// Bind to `owner` with no arguments.
    fn without_args(owner: &Owner) -> Result<ResourceHandle<Instance<Self>>> {
        config::<Self>(None).bind(owner)
    }

    /// Pick the entry point from the shape of `context`.
    ///
    /// An owner binds immediately (a missing thunk means empty arguments). A
    /// thunk defers binding and must not be followed by a second thunk.
    fn from_context(context: impl Into<Context>, thunk: Option<Thunk>) -> Result<Entry<Self>> {
        match context.into() {
            Context::Thunk(deferred) => {
                if thunk.is_some() {
                    return Err(ResourceError::UnexpectedThunk);
                }
                Ok(Entry::Deferred(config::<Self>(Some(deferred))))
            }
            Context::Owner(owner) => Ok(Entry::Immediate(config::<Self>(thunk).bind(&owner)?)),
        }
    }
}

fn config<R: ClassResource>(thunk: Option<Thunk>) -> ResourceConfig<Instance<R>> {
    let definition: Arc<dyn Definition<Instance<R>>> = Arc::new(ClassDefinition::<R>(PhantomData));
    ResourceConfig::new(definition, thunk).named(std::any::type_name::<R>())
}

struct ClassDefinition<R>(PhantomData<fn() -> R>);

struct ClassInstance<R>
where
    R: ClassResource,
{
    cache: MemoCache<Instance<R>>,
}

/// Construct `R` under its own scope and arrange for its teardown.
fn construct<R: ClassResource>(scope: Owner) -> Instance<R> {
    let own = scope.child().unwrap_or_else(|err| {
        warn!(scope = ?scope.id(), %err, "constructing instance after its scope ended");
        let orphan = Owner::new();
        orphan.destroy();
        orphan
    });

    let instance = Arc::new(RwLock::new(untrack(|| R::new(own))));
    let teardown = Arc::clone(&instance);
    if own
        .register_destructor(move || teardown.write().teardown())
        .is_err()
    {
        instance.write().teardown();
    }
    debug!(owner = ?own.id(), class = std::any::type_name::<R>(), "constructed resource instance");
    instance
}

impl<R: ClassResource> Definition<Instance<R>> for ClassDefinition<R> {
    fn id(&self) -> DefinitionId {
        DefinitionId::Class(TypeId::of::<R>())
    }

    fn instantiate(&self, scope: Owner, thunk: Option<Thunk>) -> Arc<dyn LiveInstance<Instance<R>>> {
        let slot: Mutex<Option<Instance<R>>> = Mutex::new(None);

        let cache = MemoCache::new(move || {
            let args = normalize_thunk(thunk.as_ref());
            let existing = slot.lock().clone();
            let instance = match existing {
                Some(instance) => instance,
                None => {
                    let created = construct::<R>(scope);
                    *slot.lock() = Some(Arc::clone(&created));
                    created
                }
            };
            instance.write().modify(&args);
            instance
        });

        Arc::new(ClassInstance { cache })
    }
}

impl<R: ClassResource> LiveInstance<Instance<R>> for ClassInstance<R> {
    fn value(&self) -> Result<Instance<R>> {
        Ok(self.cache.get_value())
    }

    fn last_value(&self) -> Option<Instance<R>> {
        self.cache.last_value()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
