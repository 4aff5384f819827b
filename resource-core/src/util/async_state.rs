//! Tracked async functions.
//!
//! [`tracked_function`] turns an async producer into a resource whose value is
//! an [`AsyncState`]: a reactive view of the producer's latest attempt.
//!
//! # How It Works
//!
//! 1. Every run of the resource calls the producer synchronously, so anything
//!    the producer reads before its first `.await` is tracked. Changing one of
//!    those inputs starts a new attempt.
//! 2. The returned future is spawned on the ambient tokio runtime. When it
//!    completes it settles the state of its own attempt, and nothing else.
//! 3. Starting a new attempt aborts the previous one through its
//!    [`AbortSignal`]. While it is loading, the new state falls back to the
//!    last successful value and the last settled error, so consumers do not
//!    flash back to empty.
//! 4. [`AsyncState::retry`] aborts the attempt in flight and makes the next
//!    read of the handle start a fresh one, with no input change needed.
//!
//! Because each attempt owns its own state, a slow older attempt can never
//! overwrite a newer one: the last invocation wins.

use std::error::Error;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::destroyable::Owner;
use crate::error::{ResourceError, Result};
use crate::resource::{resource_in, Produced, ResourceHandle};
use crate::tracking::Cell;

use super::abort::{AbortController, AbortSignal};

/// An error produced by an async producer.
pub type AsyncError = Arc<dyn Error + Send + Sync>;

#[derive(Clone)]
enum Outcome<T> {
    Resolved(T),
    Failed(AsyncError),
}

type OutcomeCell<T> = Cell<Option<Outcome<T>>>;

/// What a new attempt shows until it settles.
struct Fallback<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Cell of the latest attempt that resolved.
    value: Option<OutcomeCell<T>>,
    /// Cell of the latest attempt that settled either way.
    outcome: Option<OutcomeCell<T>>,
}

impl<T> Default for Fallback<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            value: None,
            outcome: None,
        }
    }
}

struct StateInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    outcome: OutcomeCell<T>,
    fallback: Fallback<T>,
    initial: Option<T>,
    settled: watch::Sender<bool>,
    controller: AbortController,
    retries: Cell<u64>,
}

/// The state of one attempt of a tracked async function.
///
/// Every getter is tracked: reading it inside a resource or memo cache makes
/// that computation re-run when the attempt settles.
pub struct AsyncState<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<StateInner<T>>,
}

impl<T> AsyncState<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(
        initial: Option<T>,
        fallback: Fallback<T>,
        controller: AbortController,
        retries: Cell<u64>,
    ) -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            inner: Arc::new(StateInner {
                outcome: Cell::new(None),
                fallback,
                initial,
                settled,
                controller,
                retries,
            }),
        }
    }

    /// Record the result of this attempt. Only the first call counts.
    fn settle(&self, outcome: Outcome<T>) {
        if self.inner.outcome.current_untracked().is_some() {
            return;
        }
        self.inner.outcome.set(Some(outcome));
        self.inner.settled.send_replace(true);
    }

    /// What the attempt after this one falls back on while it is loading.
    fn fallback_for_next(&self) -> Fallback<T> {
        let own = &self.inner.outcome;
        match own.current_untracked() {
            Some(Outcome::Resolved(_)) => Fallback {
                value: Some(own.clone()),
                outcome: Some(own.clone()),
            },
            Some(Outcome::Failed(_)) => Fallback {
                value: self.inner.fallback.value.clone(),
                outcome: Some(own.clone()),
            },
            None => Fallback {
                value: self.inner.fallback.value.clone(),
                outcome: self.inner.fallback.outcome.clone(),
            },
        }
    }

    /// The latest successful value.
    ///
    /// While loading (or after a failure) this is the value of the latest
    /// earlier attempt that resolved, and failing that the initial value.
    pub fn value(&self) -> Option<T> {
        if let Some(Outcome::Resolved(value)) = self.inner.outcome.current() {
            return Some(value);
        }
        if let Some(fallback) = &self.inner.fallback.value {
            if let Some(Outcome::Resolved(value)) = fallback.current() {
                return Some(value);
            }
        }
        self.inner.initial.clone()
    }

    /// The error this attempt failed with.
    ///
    /// While loading this is the error of the latest earlier attempt, if that
    /// attempt failed.
    pub fn error(&self) -> Option<AsyncError> {
        let settled = match self.inner.outcome.current() {
            Some(outcome) => Some(outcome),
            None => self.inner.fallback.outcome.as_ref().and_then(|cell| cell.current()),
        };
        match settled {
            Some(Outcome::Failed(err)) => Some(err),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.outcome.current().is_some()
    }

    pub fn is_pending(&self) -> bool {
        !self.is_resolved()
    }

    /// Same as [`is_pending`](Self::is_pending).
    pub fn is_loading(&self) -> bool {
        self.is_pending()
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// Wait until this attempt settles, or until it is aborted.
    pub async fn settled(&self) {
        let mut settled = self.inner.settled.subscribe();
        let signal = self.inner.controller.signal();
        tokio::select! {
            _ = settled.wait_for(|done| *done) => {}
            _ = signal.aborted() => {}
        }
    }

    /// Abort this attempt and start over.
    ///
    /// The attempt in flight is aborted right away and never settles. The next
    /// read of the tracked function's handle runs the producer again, so the
    /// new attempt follows the same last-invocation-wins rule as one started
    /// by an input change.
    pub fn retry(&self) {
        trace!("retrying async attempt");
        self.inner.controller.abort();
        self.inner.retries.update(|n| n + 1);
    }

    /// Whether two states are the same attempt.
    pub fn same_attempt(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for AsyncState<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for AsyncState<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self.inner.outcome.current_untracked() {
            None => "pending",
            Some(Outcome::Resolved(_)) => "resolved",
            Some(Outcome::Failed(_)) => "failed",
        };
        f.debug_struct("AsyncState")
            .field("status", &status)
            .field("initial", &self.inner.initial)
            .finish()
    }
}

/// Run `producer` as a tracked async function bound to `owner`.
pub fn tracked_function<T, E, F, Fut>(owner: &Owner, producer: F) -> Result<ResourceHandle<AsyncState<T>>>
where
    T: Clone + Send + Sync + 'static,
    E: Error + Send + Sync + 'static,
    F: Fn(AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
    build(owner, None, producer)
}

/// Like [`tracked_function`], with `initial` as the value until the first
/// attempt succeeds.
pub fn tracked_function_with_initial<T, E, F, Fut>(
    owner: &Owner,
    initial: T,
    producer: F,
) -> Result<ResourceHandle<AsyncState<T>>>
where
    T: Clone + Send + Sync + 'static,
    E: Error + Send + Sync + 'static,
    F: Fn(AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
    build(owner, Some(initial), producer)
}

fn build<T, E, F, Fut>(
    owner: &Owner,
    initial: Option<T>,
    producer: F,
) -> Result<ResourceHandle<AsyncState<T>>>
where
    T: Clone + Send + Sync + 'static,
    E: Error + Send + Sync + 'static,
    F: Fn(AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
    let latest: Mutex<Option<AsyncState<T>>> = Mutex::new(None);
    let retries = Cell::new(0u64);

    resource_in(owner, move |hooks| {
        retries.current();

        let controller = AbortController::new();
        let signal = controller.signal();
        let on_cleanup = controller.clone();
        hooks.on_cleanup(move || on_cleanup.abort());

        let fallback = latest
            .lock()
            .as_ref()
            .map(AsyncState::fallback_for_next)
            .unwrap_or_default();
        let state = AsyncState::new(initial.clone(), fallback, controller, retries.clone());
        *latest.lock() = Some(state.clone());

        let future = producer(signal.clone());
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(run = ?hooks.owner().id(), "starting async attempt");
                let attempt = state.clone();
                runtime.spawn(async move {
                    tokio::select! {
                        biased;
                        _ = signal.aborted() => {
                            trace!("async attempt aborted before settling");
                        }
                        result = future => {
                            if signal.is_aborted() {
                                return;
                            }
                            attempt.settle(match result {
                                Ok(value) => Outcome::Resolved(value),
                                Err(err) => Outcome::Failed(Arc::new(err)),
                            });
                        }
                    }
                });
            }
            Err(_) => {
                warn!(run = ?hooks.owner().id(), "no tokio runtime, async attempt cannot start");
                state.settle(Outcome::Failed(Arc::new(ResourceError::NoAsyncRuntime)));
            }
        }

        Produced::Value(state)
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::cell;
    use std::collections::HashMap;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl Error for Boom {}

    type Pending = Arc<Mutex<HashMap<u32, oneshot::Receiver<&'static str>>>>;

    /// A producer that waits for the answer sent for the current query.
    fn answers(
        query: Cell<u32>,
        pending: Pending,
    ) -> impl Fn(AbortSignal) -> futures_util::future::BoxFuture<'static, std::result::Result<&'static str, oneshot::error::RecvError>>
           + Send
           + Sync
           + 'static {
        use futures_util::FutureExt;

        move |_signal| {
            let key = query.current();
            let receiver = pending.lock().remove(&key);
            async move {
                match receiver {
                    Some(receiver) => receiver.await,
                    None => futures_util::future::pending().await,
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn later_invocation_wins() {
        let owner = Owner::new();
        let query = cell(1);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        pending.lock().insert(1, rx_a);
        pending.lock().insert(2, rx_b);

        let handle = tracked_function(&owner, answers(query.clone(), pending.clone())).unwrap();
        let state_a = handle.value();
        assert!(state_a.is_loading());
        assert_eq!(state_a.value(), None);

        query.set(2);
        let state_b = handle.value();
        assert!(!state_a.same_attempt(&state_b));

        tx_b.send("B").unwrap();
        state_b.settled().await;
        assert_eq!(state_b.value(), Some("B"));

        let _ = tx_a.send("A");
        state_a.settled().await;
        tokio::task::yield_now().await;

        assert!(!state_a.is_resolved());
        assert_eq!(handle.value().value(), Some("B"));
        assert!(handle.value().same_attempt(&state_b));

        owner.destroy();
    }

    #[tokio::test]
    async fn previous_value_stays_visible_while_loading() {
        let owner = Owner::new();
        let query = cell(1);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        pending.lock().insert(1, rx_a);
        pending.lock().insert(2, rx_b);

        let handle = tracked_function(&owner, answers(query.clone(), pending.clone())).unwrap();
        tx_a.send("A").unwrap();
        let state_a = handle.value();
        state_a.settled().await;
        assert_eq!(state_a.value(), Some("A"));

        query.set(2);
        let state_b = handle.value();
        assert!(state_b.is_loading());
        assert_eq!(state_b.value(), Some("A"));

        tx_b.send("B").unwrap();
        state_b.settled().await;
        assert!(!state_b.is_loading());
        assert_eq!(state_b.value(), Some("B"));

        owner.destroy();
    }

    #[tokio::test]
    async fn failures_are_reported_without_losing_initial_value() {
        let owner = Owner::new();
        let handle = tracked_function_with_initial(&owner, 0, |_signal| async { Err::<i32, _>(Boom) }).unwrap();

        let state = handle.value();
        assert_eq!(state.value(), Some(0));
        state.settled().await;

        assert!(state.is_resolved());
        assert!(state.is_error());
        assert_eq!(state.error().map(|err| err.to_string()).as_deref(), Some("boom"));
        assert_eq!(state.value(), Some(0));

        owner.destroy();
    }

    #[tokio::test]
    async fn destroying_the_owner_aborts_the_attempt() {
        let owner = Owner::new();
        let handle = tracked_function(&owner, |signal: AbortSignal| async move {
            signal.aborted().await;
            Ok::<_, Boom>(())
        })
        .unwrap();

        let state = handle.value();
        owner.destroy();
        state.settled().await;
        tokio::task::yield_now().await;

        assert!(state.is_pending());
        assert_eq!(state.value(), None);
    }

    #[tokio::test]
    async fn settled_state_is_read_by_consumers() {
        let owner = Owner::new();
        let handle = tracked_function(&owner, |_signal| async { Ok::<_, Boom>(7) }).unwrap();
        let handle_clone = handle.clone();
        let doubled = crate::tracking::MemoCache::new(move || handle_clone.value().value().map(|n| n * 2));

        assert_eq!(doubled.get_value(), None);
        handle.value().settled().await;
        assert_eq!(doubled.get_value(), Some(14));

        owner.destroy();
    }

    #[test]
    fn no_runtime_settles_with_an_error() {
        let owner = Owner::new();
        let handle = tracked_function(&owner, |_signal| async { Ok::<_, Boom>(1) }).unwrap();

        let state = handle.value();
        assert!(state.is_error());
        assert_eq!(
            state.error().map(|err| err.to_string()),
            Some(ResourceError::NoAsyncRuntime.to_string())
        );
        owner.destroy();
    }

    #[tokio::test]
    async fn retry_supersedes_a_pending_attempt() {
        let owner = Owner::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let handle = tracked_function(&owner, move |signal: AbortSignal| {
            let attempt = attempts_clone.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt == 1 {
                    signal.aborted().await;
                    return Ok("stale");
                }
                Ok::<_, Boom>("fresh")
            }
        })
        .unwrap();

        let state_a = handle.value();
        assert!(state_a.is_loading());
        state_a.retry();
        state_a.settled().await;

        let state_b = handle.value();
        assert!(!state_a.same_attempt(&state_b));
        state_b.settled().await;
        tokio::task::yield_now().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(state_a.is_pending());
        assert_eq!(state_b.value(), Some("fresh"));
        assert!(handle.value().same_attempt(&state_b));

        owner.destroy();
    }

    #[tokio::test]
    async fn previous_error_stays_visible_while_loading() {
        let owner = Owner::new();
        let query = cell(1);
        let query_clone = query.clone();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let pending_clone = pending.clone();
        let (tx_b, rx_b) = oneshot::channel();
        pending.lock().insert(2, rx_b);

        let handle = tracked_function(&owner, move |_signal| {
            let key = query_clone.current();
            let receiver = pending_clone.lock().remove(&key);
            async move {
                if key == 1 {
                    return Err(Boom);
                }
                match receiver {
                    Some(receiver) => receiver.await.map_err(|_| Boom),
                    None => futures_util::future::pending().await,
                }
            }
        })
        .unwrap();

        let state_a = handle.value();
        state_a.settled().await;
        assert!(state_a.is_error());

        query.set(2);
        let state_b = handle.value();
        assert!(state_b.is_loading());
        assert!(state_b.is_error());
        assert_eq!(state_b.error().map(|err| err.to_string()).as_deref(), Some("boom"));
        assert_eq!(state_b.value(), None);

        tx_b.send("B").unwrap();
        state_b.settled().await;
        assert!(!state_b.is_error());
        assert_eq!(state_b.value(), Some("B"));

        owner.destroy();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn later_invocation_wins_across_worker_threads() {
        let owner = Owner::new();
        let query = cell(1);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        pending.lock().insert(1, rx_a);
        pending.lock().insert(2, rx_b);

        let handle = tracked_function(&owner, answers(query.clone(), pending.clone())).unwrap();
        let state_a = handle.value();

        query.set(2);
        let state_b = handle.value();

        // Settle B first, then let A's answer race in from another thread.
        tx_b.send("B").unwrap();
        state_b.settled().await;
        let late = tokio::spawn(async move {
            let _ = tx_a.send("A");
        });
        late.await.unwrap();
        state_a.settled().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!state_a.is_resolved());
        assert_eq!(state_b.value(), Some("B"));
        assert!(handle.value().same_attempt(&state_b));

        owner.destroy();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_reads_start_one_attempt() {
        let owner = Owner::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let starts_clone = starts.clone();
        let handle = tracked_function(&owner, move |_signal| {
            starts_clone.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            async { Ok::<_, Boom>(3) }
        })
        .unwrap();

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let handle_clone = handle.clone();
                tokio::task::spawn_blocking(move || handle_clone.value())
            })
            .collect();
        let mut states = Vec::new();
        for reader in readers {
            states.push(reader.await.unwrap());
        }

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(states[0].same_attempt(&states[1]));
        states[0].settled().await;
        assert_eq!(states[1].value(), Some(3));

        owner.destroy();
    }
}
