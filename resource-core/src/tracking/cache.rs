//! Memoized Computation
//!
//! A [`MemoCache`] wraps a computation in a dependency-tracked cache cell.
//!
//! # How Caches Work
//!
//! 1. Nothing runs at construction time.
//!
//! 2. The first [`get_value`](MemoCache::get_value) runs the computation
//!    inside a tracking frame and stores the value with the dependencies it
//!    read.
//!
//! 3. Later reads return the stored value for as long as none of those
//!    dependencies changed. The first read after a change recomputes, exactly
//!    once.
//!
//! 4. Every read re-consumes the cache's dependency set in the caller's
//!    tracking frame, so a computation reading this cache is invalidated by
//!    the same changes that invalidate the cache itself.
//!
//! # Reentrancy
//!
//! The slot lock is never held while the computation runs. A computation
//! that reads its own cache (directly or through other caches) on the same
//! thread is a cycle and panics. Readers on other threads wait for the
//! running computation and then see its result.

use std::cell::RefCell;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::context::{consume, track};
use super::tag::DependencySet;

/// Counter for generating unique cache IDs.
static CACHE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_cache_id() -> u64 {
    CACHE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Observable status of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// Never computed.
    Empty,

    /// The stored value is current.
    Clean,

    /// A dependency changed; the next read recomputes.
    Dirty,
}

struct Slot<T> {
    value: Option<T>,
    dependencies: DependencySet,
}

struct CacheInner<T> {
    id: u64,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    slot: Mutex<Slot<T>>,
    /// Held for the whole computation; serializes recomputes across threads.
    computing: Mutex<()>,
    compute_count: AtomicU64,
}

thread_local! {
    /// Caches whose computation is running on this thread, innermost last.
    static COMPUTING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Marks a cache as computing on this thread until dropped, even if the
/// computation unwinds.
struct ComputingGuard(u64);

impl ComputingGuard {
    fn enter(id: u64) -> Self {
        COMPUTING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&id) {
                drop(stack);
                panic!("cycle detected: cache {id} was read while it was already computing");
            }
            stack.push(id);
        });
        Self(id)
    }
}

impl Drop for ComputingGuard {
    fn drop(&mut self) {
        COMPUTING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.0) {
                stack.remove(pos);
            }
        });
    }
}

/// A lazily evaluated, dependency-tracked cached value.
///
/// Clones share the same cache.
pub struct MemoCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<CacheInner<T>>,
}

impl<T> MemoCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cache around `compute`. The computation does not run yet.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(CacheInner {
                id: next_cache_id(),
                compute: Box::new(compute),
                slot: Mutex::new(Slot {
                    value: None,
                    dependencies: DependencySet::new(),
                }),
                computing: Mutex::new(()),
                compute_count: AtomicU64::new(0),
            }),
        }
    }

    /// The cache's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Return the memoized value, recomputing first if it is missing or any
    /// dependency changed since the last computation.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly from within this cache's own computation.
    /// Panics raised by the computation itself propagate unchanged.
    pub fn get_value(&self) -> T {
        if let Some(value) = self.fresh_value() {
            return value;
        }
        self.recompute()
    }

    /// The stored value if it is still current, consumed into the caller's
    /// frame.
    fn fresh_value(&self) -> Option<T> {
        let slot = self.inner.slot.lock();
        let value = slot.value.as_ref()?;
        if slot.dependencies.has_changed() {
            return None;
        }
        let value = value.clone();
        let deps = slot.dependencies.clone();
        drop(slot);
        consume(&deps);
        Some(value)
    }

    fn recompute(&self) -> T {
        let _guard = ComputingGuard::enter(self.inner.id);
        let _computing = self.inner.computing.lock();

        // Another thread may have finished the same recompute while we waited.
        if let Some(value) = self.fresh_value() {
            return value;
        }

        let (value, deps) = track(|| (self.inner.compute)());
        let run = self.inner.compute_count.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(cache = self.inner.id, run, dependencies = deps.len(), "cache recomputed");

        consume(&deps);

        let mut slot = self.inner.slot.lock();
        slot.value = Some(value.clone());
        slot.dependencies = deps;
        value
    }

    /// The last computed value, without recomputing or tracking.
    pub fn last_value(&self) -> Option<T> {
        self.inner.slot.lock().value.clone()
    }

    /// Current status of the cache.
    pub fn state(&self) -> MemoState {
        let slot = self.inner.slot.lock();
        match slot.value {
            None => MemoState::Empty,
            Some(_) if slot.dependencies.has_changed() => MemoState::Dirty,
            Some(_) => MemoState::Clean,
        }
    }

    /// Whether the next read will run the computation.
    pub fn is_dirty(&self) -> bool {
        self.state() != MemoState::Clean
    }

    /// Whether the computation is running right now.
    pub fn is_computing(&self) -> bool {
        self.inner.computing.is_locked()
    }

    /// How many times the computation has run.
    pub fn compute_count(&self) -> u64 {
        self.inner.compute_count.load(Ordering::Relaxed)
    }

    /// Number of dependencies read by the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.slot.lock().dependencies.len()
    }

    /// The dependencies read by the last computation.
    pub fn dependencies(&self) -> DependencySet {
        self.inner.slot.lock().dependencies.clone()
    }
}

impl<T> Clone for MemoCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for MemoCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoCache")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("compute_count", &self.compute_count())
            .finish()
    }
}

/// Create a [`MemoCache`] around `compute`.
pub fn create_cache<T, F>(compute: F) -> MemoCache<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    MemoCache::new(compute)
}

/// Read a cache's value. Free-function form of [`MemoCache::get_value`].
pub fn get_value<T>(cache: &MemoCache<T>) -> T
where
    T: Clone + Send + Sync + 'static,
{
    cache.get_value()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{cell, track};
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    #[test]
    fn cache_computes_lazily() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let cache = MemoCache::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(cache.state(), MemoState::Empty);
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(cache.get_value(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), MemoState::Clean);
    }

    #[test]
    fn repeated_reads_compute_once() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        let input = cell(3);
        let input_clone = input.clone();

        let cache = MemoCache::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            input_clone.current() * 2
        });

        for _ in 0..5 {
            assert_eq!(get_value(&cache), 6);
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(cache.compute_count(), 1);
    }

    #[test]
    fn dependency_change_recomputes_exactly_once() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        let input = cell(3);
        let input_clone = input.clone();

        let cache = create_cache(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            input_clone.current() * 2
        });

        assert_eq!(cache.get_value(), 6);

        input.set(5);
        assert_eq!(cache.state(), MemoState::Dirty);
        assert_eq!(cache.get_value(), 10);
        assert_eq!(cache.get_value(), 10);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unrelated_change_does_not_recompute() {
        let read = cell(1);
        let unrelated = cell(1);
        let read_clone = read.clone();

        let cache = MemoCache::new(move || read_clone.current());
        cache.get_value();

        unrelated.set(2);
        assert!(!cache.is_dirty());
        cache.get_value();
        assert_eq!(cache.compute_count(), 1);
    }

    #[test]
    fn last_value_does_not_recompute() {
        let input = cell(1);
        let input_clone = input.clone();
        let cache = MemoCache::new(move || input_clone.current());

        assert_eq!(cache.last_value(), None);
        cache.get_value();

        input.set(9);
        assert_eq!(cache.last_value(), Some(1));
        assert_eq!(cache.compute_count(), 1);
    }

    #[test]
    fn nested_cache_invalidates_outer() {
        let input = cell(2);
        let input_clone = input.clone();

        let inner = MemoCache::new(move || input_clone.current() + 1);
        let inner_clone = inner.clone();
        let outer = MemoCache::new(move || inner_clone.get_value() * 10);

        assert_eq!(outer.get_value(), 30);
        // Reading the clean outer cache again still sees the inner's deps.
        assert_eq!(outer.get_value(), 30);
        assert_eq!(outer.compute_count(), 1);

        input.set(4);
        assert_eq!(outer.get_value(), 50);
        assert_eq!(inner.compute_count(), 2);
        assert_eq!(outer.compute_count(), 2);
    }

    #[test]
    fn reads_propagate_to_enclosing_frame() {
        let input = cell(1);
        let input_clone = input.clone();
        let cache = MemoCache::new(move || input_clone.current());

        let (_, deps) = track(|| cache.get_value());
        assert_eq!(deps.len(), 1);

        let (_, deps_when_clean) = track(|| cache.get_value());
        assert_eq!(deps_when_clean.len(), 1);

        input.set(2);
        assert!(deps_when_clean.has_changed());
    }

    #[test]
    fn panic_in_computation_leaves_cache_dirty() {
        let should_fail = cell(true);
        let should_fail_clone = should_fail.clone();
        let cache = MemoCache::new(move || {
            if should_fail_clone.current() {
                panic!("setup failed");
            }
            1
        });

        let cache_clone = cache.clone();
        let result = std::panic::catch_unwind(AssertUnwindSafe(move || cache_clone.get_value()));
        assert!(result.is_err());
        assert!(!cache.is_computing());
        assert_eq!(cache.state(), MemoState::Empty);

        should_fail.set(false);
        assert_eq!(cache.get_value(), 1);
    }

    #[test]
    fn self_read_is_a_cycle() {
        let slot: Arc<Mutex<Option<MemoCache<i32>>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let cache = MemoCache::new(move || {
            let me = slot_clone.lock().clone();
            me.map(|c| c.get_value()).unwrap_or(0)
        });
        *slot.lock() = Some(cache.clone());

        let result = std::panic::catch_unwind(AssertUnwindSafe(move || cache.get_value()));
        assert!(result.is_err());
    }

    #[test]
    fn concurrent_readers_share_one_computation() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        let cache = MemoCache::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            7
        });

        let first = cache.clone();
        let t1 = std::thread::spawn(move || first.get_value());
        std::thread::sleep(Duration::from_millis(20));
        let second = cache.clone();
        let t2 = std::thread::spawn(move || second.get_value());

        assert_eq!(t1.join().unwrap(), 7);
        assert_eq!(t2.join().unwrap(), 7);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(!cache.is_computing());
    }

    #[test]
    fn nested_reads_of_different_caches_are_not_cycles() {
        let input = cell(1);
        let input_clone = input.clone();
        let inner = MemoCache::new(move || input_clone.current());
        let inner_clone = inner.clone();
        let outer = MemoCache::new(move || inner_clone.get_value() + inner_clone.get_value());

        assert_eq!(outer.get_value(), 2);
        input.set(3);
        assert_eq!(outer.get_value(), 6);
    }
}
