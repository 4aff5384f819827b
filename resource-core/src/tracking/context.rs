//! Tracking Context
//!
//! The tracking context records which tags are consumed while a computation
//! runs. This is the "track reads" scope that memoized computations execute
//! inside of.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Entering a tracked computation
//! pushes a frame; every [`Tag::consume`] lands in the innermost frame; the
//! computation's dependency set is whatever its frame collected when it is
//! popped.
//!
//! Nested frames are independent: an inner computation's reads do not leak
//! into the outer frame unless the inner computation explicitly re-consumes
//! its dependency set (which is what [`MemoCache`](super::MemoCache) does on
//! every read).

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use super::tag::{DependencySet, Tag};

thread_local! {
    static FRAME_STACK: RefCell<Vec<FrameEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the tracking stack.
#[derive(Debug)]
struct FrameEntry {
    id: u64,
    /// Untracked frames swallow every read.
    tracking: bool,
    dependencies: DependencySet,
}

fn next_frame_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Guard for one frame of the tracking stack.
///
/// The frame is popped by [`finish`](Self::finish), or when the guard is
/// dropped during unwinding so the stack stays balanced if the computation
/// panics.
pub struct TrackingFrame {
    id: u64,
    finished: bool,
}

impl TrackingFrame {
    /// Push a frame that records reads.
    pub fn enter() -> Self {
        Self::push(true)
    }

    /// Push a frame that discards reads.
    pub fn enter_untracked() -> Self {
        Self::push(false)
    }

    fn push(tracking: bool) -> Self {
        let id = next_frame_id();
        FRAME_STACK.with(|stack| {
            stack.borrow_mut().push(FrameEntry {
                id,
                tracking,
                dependencies: DependencySet::new(),
            });
        });
        Self { id, finished: false }
    }

    /// Pop the frame and return the dependencies it collected.
    pub fn finish(mut self) -> DependencySet {
        self.finished = true;
        self.pop().unwrap_or_default()
    }

    fn pop(&self) -> Option<DependencySet> {
        FRAME_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            popped.map(|entry| {
                debug_assert_eq!(
                    entry.id, self.id,
                    "TrackingFrame mismatch: expected {}, got {}",
                    self.id, entry.id
                );
                entry.dependencies
            })
        })
    }

    /// Whether reads are currently being recorded.
    pub fn is_tracking() -> bool {
        FRAME_STACK.with(|stack| stack.borrow().last().is_some_and(|entry| entry.tracking))
    }

    /// Record a read of `tag` in the innermost frame.
    pub(crate) fn record(tag: &Tag) {
        FRAME_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.tracking {
                    entry.dependencies.insert(tag);
                }
            }
        });
    }

    /// Record every dependency of `deps` in the innermost frame.
    pub(crate) fn record_all(deps: &DependencySet) {
        if deps.is_empty() {
            return;
        }
        FRAME_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.tracking {
                    entry.dependencies.extend(deps);
                }
            }
        });
    }
}

impl Drop for TrackingFrame {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// Run `f` inside a fresh tracking frame and return its result together with
/// every dependency it read.
pub fn track<T>(f: impl FnOnce() -> T) -> (T, DependencySet) {
    let frame = TrackingFrame::enter();
    let value = f();
    (value, frame.finish())
}

/// Run `f` without recording any of its reads in the enclosing frame.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let frame = TrackingFrame::enter_untracked();
    let value = f();
    drop(frame.finish());
    value
}

/// Re-consume a previously collected dependency set in the active frame.
pub fn consume(deps: &DependencySet) {
    TrackingFrame::record_all(deps);
}
