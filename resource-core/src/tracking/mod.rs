//! Dependency Tracking
//!
//! This module is the tracking primitive the resource engine is built on:
//! tags with revisions, a thread-local tracking context, the [`Cell`] mutable
//! box, and the [`MemoCache`] memoized computation.
//!
//! # Contract
//!
//! The engine relies on exactly two operations:
//!
//! - [`track`]: run a function and collect the [`DependencySet`] it read;
//! - [`has_changed`]: ask whether any of those dependencies was written since.
//!
//! It never looks inside a dependency set. Anything that can provide these two
//! operations with the same guarantees could stand in for this module.
//!
//! # Concepts
//!
//! ## Tags
//!
//! Every piece of reactive state owns a [`Tag`]. Reading consumes it, writing
//! dirties it. Dirtying moves the tag to a fresh value of a global revision
//! clock, which is how a stale read is detected.
//!
//! ## Caches
//!
//! A [`MemoCache`] is a computation plus the value and dependencies of its
//! last run. It is pull-based: nothing recomputes until somebody reads it.

mod tag;
mod context;
mod cell;
mod cache;

pub use tag::{current_revision, has_changed, DependencySet, Tag};
pub use context::{consume, track, untrack, TrackingFrame};
pub use cell::{cell, Cell};
pub use cache::{create_cache, get_value, MemoCache, MemoState};
