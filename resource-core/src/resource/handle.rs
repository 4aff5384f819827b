//! Resource Handles
//!
//! A [`ResourceConfig`] is a definition that has not been attached to an
//! owner yet (plus, for class-based resources, the thunk producing its
//! arguments). Binding it to an owner yields a [`ResourceHandle`].
//!
//! # Lifecycle
//!
//! ```text
//!   Uninitialized ──first read──▶ Live ──owner destroyed──▶ Destroyed
//!                                  │ ▲
//!                                  └─┘ read after an input changed
//! ```
//!
//! Binding only allocates the handle's scope under the owner. The live
//! instance (and the memo cache behind it) is created on the first read.

use std::any::TypeId;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::destroyable::Owner;
use crate::error::{ResourceError, Result};

use super::args::Thunk;
use super::proxy::AccessProxy;

/// Identity of a definition.
///
/// Two configs with the same identity share a slot in a [`Use`](super::Use)
/// binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionId {
    Function(u64),
    Class(TypeId),
    Factory(u64),
}

/// Where a handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Uninitialized,
    Live,
    Destroyed,
}

/// Something the runtime can turn into a live instance.
pub(crate) trait Definition<T>: Send + Sync {
    fn id(&self) -> DefinitionId;

    /// Build the live instance. Must not run user code; that happens on the
    /// first read.
    fn instantiate(&self, scope: Owner, thunk: Option<Thunk>) -> Arc<dyn LiveInstance<T>>;
}

/// A created resource instance.
pub(crate) trait LiveInstance<T>: Send + Sync {
    /// Pull the current value, re-running the definition if inputs changed.
    fn value(&self) -> Result<T>;

    /// The last value, without re-running anything.
    fn last_value(&self) -> Option<T>;
}

/// A definition waiting to be bound to an owner.
pub struct ResourceConfig<T> {
    definition: Arc<dyn Definition<T>>,
    thunk: Option<Thunk>,
    name: Option<Arc<str>>,
}

impl<T> ResourceConfig<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(definition: Arc<dyn Definition<T>>, thunk: Option<Thunk>) -> Self {
        Self {
            definition,
            thunk,
            name: None,
        }
    }

    /// Attach a debug name, reported in tracing events.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The debug name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The definition's identity.
    pub fn id(&self) -> DefinitionId {
        self.definition.id()
    }

    /// Bind to `owner`. The resource is destroyed when the owner is.
    ///
    /// Fails with [`ResourceError::OwnerDestroyed`] if the owner is already
    /// being torn down.
    pub fn bind(&self, owner: &Owner) -> Result<ResourceHandle<T>> {
        let scope = owner.child()?;
        debug!(
            owner = ?owner.id(),
            scope = ?scope.id(),
            resource = self.name().unwrap_or("<anonymous>"),
            "bound resource"
        );
        Ok(ResourceHandle {
            inner: Arc::new(HandleInner {
                scope,
                config: self.clone(),
                live: Mutex::new(None),
            }),
        })
    }
}

impl<T> Clone for ResourceConfig<T> {
    fn clone(&self) -> Self {
        Self {
            definition: Arc::clone(&self.definition),
            thunk: self.thunk.clone(),
            name: self.name.clone(),
        }
    }
}

impl<T> Debug for ResourceConfig<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("id", &self.definition.id())
            .field("name", &self.name)
            .field("has_thunk", &self.thunk.is_some())
            .finish()
    }
}

struct HandleInner<T> {
    scope: Owner,
    config: ResourceConfig<T>,
    live: Mutex<Option<Arc<dyn LiveInstance<T>>>>,
}

/// A resource bound to an owner.
///
/// Clones refer to the same resource.
pub struct ResourceHandle<T> {
    inner: Arc<HandleInner<T>>,
}

impl<T> ResourceHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn live(&self) -> Option<Arc<dyn LiveInstance<T>>> {
        self.inner.live.lock().clone()
    }

    /// Read the current value.
    ///
    /// The first read creates the instance; later reads re-run the definition
    /// only if something it read has changed. After destruction the last
    /// value is returned as is.
    pub fn try_value(&self) -> Result<T> {
        if self.inner.scope.is_destroying() {
            return self
                .live()
                .and_then(|live| live.last_value())
                .ok_or(ResourceError::Destroyed);
        }

        let live = {
            let mut slot = self.inner.live.lock();
            let live = slot.get_or_insert_with(|| {
                debug!(
                    scope = ?self.inner.scope.id(),
                    resource = self.inner.config.name().unwrap_or("<anonymous>"),
                    "instantiating resource"
                );
                self.inner
                    .config
                    .definition
                    .instantiate(self.inner.scope, self.inner.config.thunk.clone())
            });
            Arc::clone(live)
        };
        live.value()
    }

    /// Read the current value.
    ///
    /// # Panics
    ///
    /// Panics with [`ResourceError::Destroyed`] if the resource was destroyed
    /// before it was ever read. Use [`try_value`](Self::try_value) to handle
    /// that case.
    pub fn value(&self) -> T {
        match self.try_value() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Where the handle is in its lifecycle.
    pub fn state(&self) -> ResourceState {
        if self.inner.scope.is_destroying() {
            ResourceState::Destroyed
        } else if self.inner.live.lock().is_some() {
            ResourceState::Live
        } else {
            ResourceState::Uninitialized
        }
    }

    /// The scope the resource lives in; a child of the owner it was bound to.
    pub fn scope(&self) -> Owner {
        self.inner.scope
    }

    /// The identity of the bound definition.
    pub fn definition_id(&self) -> DefinitionId {
        self.inner.config.id()
    }

    /// Destroy the resource ahead of its owner.
    pub fn destroy(&self) {
        self.inner.scope.destroy();
    }

    /// A forwarding accessor over this handle.
    pub fn proxy(&self) -> AccessProxy<Self> {
        AccessProxy::new(self.clone())
    }
}

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("scope", &self.inner.scope.id())
            .field("config", &self.inner.config)
            .field("instantiated", &self.inner.live.lock().is_some())
            .finish()
    }
}
