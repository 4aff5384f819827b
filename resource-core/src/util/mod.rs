//! Utilities built on top of resources.
//!
//! - `abort`: cooperative cancellation for async producers
//! - `async_state`: tracked async functions

mod abort;
mod async_state;

pub use abort::{AbortController, AbortSignal};
pub use async_state::{tracked_function, tracked_function_with_initial, AsyncError, AsyncState};
