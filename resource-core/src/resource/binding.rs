//! `Use` bindings.
//!
//! A [`Use`] ties a resource config to an owner without instantiating it. The
//! handle is bound on first access and kept for as long as the config's
//! definition stays the same. Replacing the config with a different
//! definition destroys the old instance; the next access binds the new one.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::destroyable::Owner;
use crate::error::Result;
use crate::tracking::untrack;

use super::handle::{ResourceConfig, ResourceHandle};
use super::proxy::AccessProxy;

struct Slot<T> {
    config: ResourceConfig<T>,
    handle: Option<ResourceHandle<T>>,
}

struct UseInner<T> {
    owner: Owner,
    slot: Mutex<Slot<T>>,
}

/// A lazily bound resource slot on an owner.
pub struct Use<T> {
    inner: Arc<UseInner<T>>,
}

impl<T> Use<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(owner: &Owner, config: ResourceConfig<T>) -> Self {
        Self {
            inner: Arc::new(UseInner {
                owner: *owner,
                slot: Mutex::new(Slot {
                    config,
                    handle: None,
                }),
            }),
        }
    }

    /// The bound handle, binding it now if this is the first access.
    pub fn handle(&self) -> Result<ResourceHandle<T>> {
        let mut slot = self.inner.slot.lock();
        if let Some(handle) = &slot.handle {
            return Ok(handle.clone());
        }
        let handle = slot.config.bind(&self.inner.owner)?;
        slot.handle = Some(handle.clone());
        Ok(handle)
    }

    pub fn try_value(&self) -> Result<T> {
        self.handle()?.try_value()
    }

    /// # Panics
    ///
    /// Panics if the slot cannot be bound or was destroyed before it was read.
    pub fn value(&self) -> T {
        match self.try_value() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Swap in a new config.
    ///
    /// Returns `false` and keeps the current instance when the new config has
    /// the same definition. Otherwise the current instance (if any) is
    /// destroyed and `true` is returned.
    pub fn replace(&self, config: ResourceConfig<T>) -> bool {
        let previous = {
            let mut slot = self.inner.slot.lock();
            if slot.config.id() == config.id() {
                return false;
            }
            slot.config = config;
            slot.handle.take()
        };

        if let Some(previous) = previous {
            debug!(
                owner = ?self.inner.owner.id(),
                scope = ?previous.scope().id(),
                "definition changed, destroying previous instance"
            );
            untrack(|| previous.destroy());
        }
        true
    }

    pub fn owner(&self) -> Owner {
        self.inner.owner
    }

    pub fn proxy(&self) -> AccessProxy<Self> {
        AccessProxy::new(self.clone())
    }
}

impl<T> Clone for Use<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Use<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.inner.slot.lock();
        f.debug_struct("Use")
            .field("owner", &self.inner.owner.id())
            .field("config", &slot.config)
            .field("bound", &slot.handle.is_some())
            .finish()
    }
}

/// Shorthand for [`Use::new`].
pub fn use_resource<T>(owner: &Owner, config: ResourceConfig<T>) -> Use<T>
where
    T: Clone + Send + Sync + 'static,
{
    Use::new(owner, config)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
