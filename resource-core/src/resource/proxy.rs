//! Forwarding accessors.
//!
//! An [`AccessProxy`] never caches: every access goes back through the
//! source's live pull path, so it always observes the instance as it is at
//! that moment, re-running the definition first if an input changed.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;

use super::binding::Use;
use super::handle::ResourceHandle;

/// Anything that can produce the current value of a resource.
pub trait Current {
    type Output;

    fn current(&self) -> Result<Self::Output>;
}

impl<T> Current for ResourceHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn current(&self) -> Result<T> {
        self.try_value()
    }
}

impl<T> Current for Use<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn current(&self) -> Result<T> {
        self.try_value()
    }
}

/// A typed accessor that re-reads its source on every access.
#[derive(Clone)]
pub struct AccessProxy<S> {
    source: S,
}

impl<S: Current> AccessProxy<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// The current value.
    ///
    /// # Panics
    ///
    /// Panics if the source cannot produce a value (see [`try_get`](Self::try_get)).
    pub fn get(&self) -> S::Output {
        match self.source.current() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_get(&self) -> Result<S::Output> {
        self.source.current()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S, R> AccessProxy<S>
where
    S: Current<Output = Arc<RwLock<R>>>,
{
    /// Run `f` against the live instance.
    pub fn with<U>(&self, f: impl FnOnce(&R) -> U) -> U {
        let instance = self.get();
        let guard = instance.read();
        f(&guard)
    }

    /// Run `f` against the live instance, mutably.
    pub fn with_mut<U>(&self, f: impl FnOnce(&mut R) -> U) -> U {
        let instance = self.get();
        let mut guard = instance.write();
        f(&mut guard)
    }

    pub fn try_with<U>(&self, f: impl FnOnce(&R) -> U) -> Result<U> {
        let instance = self.try_get()?;
        let guard = instance.read();
        Ok(f(&guard))
    }
}

impl<S: Debug> Debug for AccessProxy<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessProxy").field("source", &self.source).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destroyable::Owner;
    use crate::error::ResourceError;
    use crate::resource::{resource_in, Args, ClassResource, Produced};
    use crate::tracking::cell;
    use serde_json::json;

    struct Greeter {
        name: String,
        greeted: usize,
    }

    impl ClassResource for Greeter {
        fn new(_owner: Owner) -> Self {
            Self { name: String::new(), greeted: 0 }
        }

        fn modify(&mut self, args: &Args) {
            self.name = args.positional_as::<String>(0).unwrap_or_default();
        }
    }

    impl Greeter {
        fn greet(&mut self) -> String {
            self.greeted += 1;
            format!("hello {}", self.name)
        }
    }

    #[test]
    fn get_observes_latest_value() {
        let owner = Owner::new();
        let input = cell(1);
        let input_clone = input.clone();
        let proxy = resource_in(&owner, move |_| Produced::Value(input_clone.current()))
            .unwrap()
            .proxy();

        assert_eq!(proxy.get(), 1);
        input.set(2);
        assert_eq!(proxy.get(), 2);
        owner.destroy();
    }

    #[test]
    fn methods_run_against_the_current_instance() {
        let owner = Owner::new();
        let name = cell("ada".to_string());
        let name_clone = name.clone();
        let proxy = Greeter::from_owner(&owner, move || json!([name_clone.current()]))
            .unwrap()
            .proxy();

        assert_eq!(proxy.with_mut(Greeter::greet), "hello ada");
        name.set("grace".to_string());
        assert_eq!(proxy.with_mut(Greeter::greet), "hello grace");
        assert_eq!(proxy.with(|g| g.greeted), 2);

        owner.destroy();
    }

    #[test]
    fn try_get_reports_destroyed_source() {
        let owner = Owner::new();
        let proxy = resource_in(&owner, |_| Produced::Value(0)).unwrap().proxy();
        owner.destroy();

        assert_eq!(proxy.try_get(), Err(ResourceError::Destroyed));
    }
}
