//! A minimal cooperative cancellation primitive (spec §5 "Cancellation &
//! timeouts"): a handle the caller fires, and a future the callee awaits.
//!
//! Built on [`tokio::sync::watch`] rather than a bespoke `Notify` wrapper,
//! the same "small channel-backed primitive" style `tor-async-utils` uses
//! for its oneshot/postage helpers.

use tokio::sync::watch;

/// The caller-facing half: fire it to cancel whatever is awaiting the
/// matching [`CancelToken`].
#[derive(Clone, Debug)]
pub struct CancelHandle(watch::Sender<bool>);

/// The callee-facing half: `.cancelled().await` resolves once the matching
/// [`CancelHandle`] fires (or resolves immediately if it already has).
#[derive(Clone, Debug)]
pub struct CancelToken(watch::Receiver<bool>);

/// Create a fresh, not-yet-fired cancellation pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}

impl CancelHandle {
    /// Fire cancellation. Idempotent; firing twice is a no-op the second time.
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl CancelToken {
    /// A token that never cancels, for callers with no cancellation source.
    pub fn never() -> Self {
        cancel_pair().1
    }

    /// Resolves once cancellation has fired.
    pub async fn cancelled(&mut self) {
        if *self.0.borrow() {
            return;
        }
        // `changed()` only errors if every sender was dropped without firing,
        // which for our purposes is equivalent to "never cancels".
        while self.0.changed().await.is_ok() {
            if *self.0.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }

    /// True if cancellation has already fired.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}
