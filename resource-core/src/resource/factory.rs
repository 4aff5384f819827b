//! Resource factories.
//!
//! A factory wraps a function from arguments to a resource config, so a
//! resource can be parameterized by tracked arguments. The inner resource is
//! rebuilt (and the previous one destroyed) only when something the thunk or
//! the wrapper read has changed; changes the inner resource tracks itself
//! re-run just the inner resource.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::destroyable::Owner;
use crate::error::Result;
use crate::tracking::{untrack, MemoCache};

use super::args::{normalize_thunk, Args, Thunk};
use super::handle::{Definition, DefinitionId, LiveInstance, ResourceConfig, ResourceHandle};

static FACTORY_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

type Wrapper<T> = Arc<dyn Fn(&Args) -> ResourceConfig<T> + Send + Sync>;

/// A resource parameterized by arguments.
pub struct ResourceFactory<T> {
    id: u64,
    wrapper: Wrapper<T>,
}

impl<T> ResourceFactory<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A config whose arguments come from `thunk`.
    pub fn config<F>(&self, thunk: F) -> ResourceConfig<T>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let definition = FactoryDefinition {
            id: self.id,
            wrapper: Arc::clone(&self.wrapper),
        };
        ResourceConfig::new(Arc::new(definition), Some(Arc::new(thunk)))
    }

    /// Bind to `owner` with arguments from `thunk`.
    pub fn bind<F>(&self, owner: &Owner, thunk: F) -> Result<ResourceHandle<T>>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.config(thunk).bind(owner)
    }
}

impl<T> Clone for ResourceFactory<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            wrapper: Arc::clone(&self.wrapper),
        }
    }
}

/// Turn `wrapper` into a [`ResourceFactory`].
pub fn resource_factory<T, F>(wrapper: F) -> ResourceFactory<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Args) -> ResourceConfig<T> + Send + Sync + 'static,
{
    ResourceFactory {
        id: FACTORY_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
        wrapper: Arc::new(wrapper),
    }
}

struct FactoryDefinition<T> {
    id: u64,
    wrapper: Wrapper<T>,
}

struct FactoryInstance<T>
where
    T: Clone + Send + Sync + 'static,
{
    cache: MemoCache<Result<ResourceHandle<T>>>,
}

impl<T> Definition<T> for FactoryDefinition<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> DefinitionId {
        DefinitionId::Factory(self.id)
    }

    fn instantiate(&self, scope: Owner, thunk: Option<Thunk>) -> Arc<dyn LiveInstance<T>> {
        let wrapper = Arc::clone(&self.wrapper);
        let previous: Mutex<Option<ResourceHandle<T>>> = Mutex::new(None);

        let cache = MemoCache::new(move || -> Result<ResourceHandle<T>> {
            let args = normalize_thunk(thunk.as_ref());
            let config = wrapper(&args);

            let prior = previous.lock().take();
            if let Some(prior) = prior {
                debug!(scope = ?scope.id(), "factory arguments changed, rebuilding inner resource");
                untrack(|| prior.destroy());
            }

            let handle = config.bind(&scope)?;
            *previous.lock() = Some(handle.clone());
            Ok(handle)
        });

        Arc::new(FactoryInstance { cache })
    }
}

impl<T> LiveInstance<T> for FactoryInstance<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn value(&self) -> Result<T> {
        self.cache.get_value()?.try_value()
    }

    fn last_value(&self) -> Option<T> {
        self.cache
            .last_value()
            .and_then(|handle| handle.ok())
            .and_then(|handle| handle.try_value().ok())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
