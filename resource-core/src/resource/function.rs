//! Function-based resources.
//!
//! A function-based resource is a setup function `Fn(&Hooks) -> Produced<T>`.
//! Each run gets its own scope (a child of the resource's scope):
//!
//! 1. Before a re-run, the previous run's scope is destroyed: its cleanups run
//!    in registration order and resources created under it are torn down.
//! 2. The setup function runs inside the resource's memo cache, so every
//!    reactive read it makes can trigger the next re-run.
//! 3. When the resource itself is destroyed, the last run's scope goes with
//!    it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::destroyable::Owner;
use crate::error::Result;
use crate::tracking::{untrack, MemoCache};

use super::args::Thunk;
use super::handle::{Definition, DefinitionId, LiveInstance, ResourceConfig, ResourceHandle};
use super::hooks::{Hooks, Produced};

static DEFINITION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

type Setup<T> = Arc<dyn Fn(&Hooks) -> Produced<T> + Send + Sync>;

struct FunctionDefinition<T> {
    id: u64,
    setup: Setup<T>,
}

struct FunctionInstance<T>
where
    T: Clone + Send + Sync + 'static,
{
    cache: MemoCache<Produced<T>>,
    /// Last resolved value, served once the resource is destroyed.
    last_read: Mutex<Option<T>>,
}

/// Start a new run scope under `scope`, tearing down `previous` first.
fn next_run(scope: Owner, previous: &Mutex<Option<Owner>>) -> Owner {
    let prior = previous.lock().take();
    if let Some(prior) = prior {
        untrack(|| prior.destroy());
    }

    let run = scope.child().unwrap_or_else(|err| {
        warn!(scope = ?scope.id(), %err, "resource re-ran after its scope ended");
        let orphan = Owner::new();
        orphan.destroy();
        orphan
    });
    *previous.lock() = Some(run);
    run
}

impl<T> Definition<T> for FunctionDefinition<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> DefinitionId {
        DefinitionId::Function(self.id)
    }

    fn instantiate(&self, scope: Owner, _thunk: Option<Thunk>) -> Arc<dyn LiveInstance<T>> {
        let setup = Arc::clone(&self.setup);
        let previous = Mutex::new(None);

        let cache = MemoCache::new(move || {
            let run = next_run(scope, &previous);
            setup(&Hooks::new(run))
        });

        Arc::new(FunctionInstance {
            cache,
            last_read: Mutex::new(None),
        })
    }
}

impl<T> LiveInstance<T> for FunctionInstance<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn value(&self) -> Result<T> {
        let value = self.cache.get_value().resolve();
        *self.last_read.lock() = Some(value.clone());
        Ok(value)
    }

    fn last_value(&self) -> Option<T> {
        self.last_read.lock().clone()
    }
}

/// Define a function-based resource without binding it yet.
///
/// # Example
///
/// ```rust
/// use resource_core::{resource, Owner, Produced};
///
/// let owner = Owner::new();
/// let answer = resource(|_hooks| Produced::Value(42)).bind(&owner).unwrap();
/// assert_eq!(answer.value(), 42);
/// owner.destroy();
/// ```
pub fn resource<T, F>(setup: F) -> ResourceConfig<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Hooks) -> Produced<T> + Send + Sync + 'static,
{
    let definition = FunctionDefinition {
        id: DEFINITION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
        setup: Arc::new(setup),
    };
    ResourceConfig::new(Arc::new(definition), None)
}

/// Define a function-based resource and bind it to `owner` right away.
pub fn resource_in<T, F>(owner: &Owner, setup: F) -> Result<ResourceHandle<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Hooks) -> Produced<T> + Send + Sync + 'static,
{
    resource(setup).bind(owner)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
