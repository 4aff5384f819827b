//! Cooperative cancellation.
//!
//! A thin split of [`CancellationToken`] into a controller that may abort and
//! a signal that may only observe.

use tokio_util::sync::CancellationToken;
use tracing::trace;

/// The sending half: aborts its [`AbortSignal`]s.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    token: CancellationToken,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.clone(),
        }
    }

    /// Abort. Only the first call has any effect.
    pub fn abort(&self) {
        if !self.token.is_cancelled() {
            trace!("abort signalled");
        }
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The receiving half, handed to async producers.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the controller aborts; immediately if it already has.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }

    /// A token cancelled together with this signal, for handing to APIs that
    /// take a [`CancellationToken`]. Cancelling it does not abort the signal.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
