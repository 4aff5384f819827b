//! Setup hooks and produced values for function-based resources.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::warn;

use crate::destroyable::Owner;

/// What a function-based setup run hands back.
///
/// `Value` is the resource's value until the next run. `Getter` separates a
/// setup phase from a read phase: the setup run registers cleanups and builds
/// state once, and the getter is called on every read to produce the current
/// value. Reads inside the getter are tracked by the reader, not by the setup
/// run, so they never cause setup to run again.
pub enum Produced<T> {
    Value(T),
    Getter(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T> Produced<T> {
    /// A lazy getter.
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Produced::Getter(Arc::new(f))
    }

    /// Resolve to the observable value, calling the getter if there is one.
    pub fn resolve(&self) -> T
    where
        T: Clone,
    {
        match self {
            Produced::Value(value) => value.clone(),
            Produced::Getter(getter) => getter(),
        }
    }
}

impl<T: Clone> Clone for Produced<T> {
    fn clone(&self) -> Self {
        match self {
            Produced::Value(value) => Produced::Value(value.clone()),
            Produced::Getter(getter) => Produced::Getter(Arc::clone(getter)),
        }
    }
}

impl<T: Debug> Debug for Produced<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Produced::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Produced::Getter(_) => f.write_str("Getter(..)"),
        }
    }
}

/// Hooks passed to every run of a function-based resource.
#[derive(Debug, Clone, Copy)]
pub struct Hooks {
    run: Owner,
}

impl Hooks {
    pub(crate) fn new(run: Owner) -> Self {
        Self { run }
    }

    /// Register a cleanup for this run.
    ///
    /// Cleanups run in registration order, before the next run starts or when
    /// the resource is destroyed.
    pub fn on_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // A run that is already over cannot hold cleanups anymore; the
        // cleanup runs right away instead of being lost.
        if self.run.is_destroying() {
            warn!(run = ?self.run.id(), "cleanup registered after its run ended, running it now");
            cleanup();
            return;
        }
        if let Err(err) = self.run.register_destructor(cleanup) {
            warn!(run = ?self.run.id(), %err, "failed to register cleanup");
        }
    }

    /// The owner of this run. Resources created under it are destroyed
    /// together with the run's cleanups.
    pub fn owner(&self) -> Owner {
        self.run
    }
}
