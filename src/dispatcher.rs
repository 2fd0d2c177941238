//! The command dispatcher (spec §4.3): serialises outbound commands,
//! parks each caller in a FIFO waiter queue, and delivers each reply batch
//! to the head waiter in write order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};

use tokio::io::AsyncWrite;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::err::{Error, Result};
use crate::wire::{self, EncodedCommand, ReplyBatch};

/// Gates dispatcher liveness on the connection's state (spec §4.3: "liveness
/// check against C5"). Implemented by [`crate::connection::ConnState`].
pub(crate) trait Liveness: Send + Sync {
    /// Is the connection currently `Ready`?
    fn is_ready(&self) -> bool;
    /// The [`Error::Shutdown`] to return when it is not.
    fn shutdown_error(&self, command: Option<String>) -> Error;
}

/// A single outstanding waiter in the FIFO (spec §3 "Waiter").
struct Waiter {
    id: u64,
    tx: oneshot::Sender<Result<ReplyBatch>>,
}

struct Inner {
    waiters: VecDeque<Waiter>,
}

/// Serialises writes and correlates each with its reply batch.
pub(crate) struct Dispatcher {
    write_gate: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send>>,
    inner: SyncMutex<Inner>,
    next_id: AtomicU64,
    live: Arc<dyn Liveness>,
}

impl Dispatcher {
    pub(crate) fn new(
        writer: Box<dyn AsyncWrite + Unpin + Send>,
        live: Arc<dyn Liveness>,
    ) -> Self {
        Dispatcher {
            write_gate: AsyncMutex::new(writer),
            inner: SyncMutex::new(Inner {
                waiters: VecDeque::new(),
            }),
            next_id: AtomicU64::new(0),
            live,
        }
    }

    /// Execute one command: write it, park a waiter, and await its batch.
    ///
    /// Spec §4.3 contract: `execute(command) -> batch`, at most one command
    /// in flight on the wire at a time, FIFO ordering across concurrent
    /// callers.
    pub(crate) async fn execute(
        &self,
        cmd: EncodedCommand,
        mut cancel: CancelToken,
    ) -> Result<ReplyBatch> {
        if !self.live.is_ready() {
            return Err(self.live.shutdown_error(Some(cmd.display.clone())));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            // Hold the write-gate for the write + enqueue, so that caller A's
            // waiter is in the queue before caller B's write can start
            // (spec §4.3 "Ordering guarantees").
            let mut writer = self.write_gate.lock().await;
            if !self.live.is_ready() {
                return Err(self.live.shutdown_error(Some(cmd.display.clone())));
            }
            wire::write_command(&mut *writer, &cmd).await?;
            self.inner.lock().unwrap().waiters.push_back(Waiter { id, tx });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // The waiter stays in the FIFO (removing it would desync
                // queue position from the reply tor is still going to send);
                // it is simply abandoned. `rx` is dropped here, so a later
                // `deliver` for this id fails to send and logs instead.
                Err(Error::cancelled(Some(cmd.display)))
            }
            res = rx => {
                match res {
                    Ok(batch_result) => batch_result,
                    Err(_) => Err(self.live.shutdown_error(Some(cmd.display))),
                }
            }
        }
    }

    /// Like [`Dispatcher::execute`], but skips the liveness gate. Used only
    /// for the `SIGNAL SHUTDOWN`/`HALT` exchange itself (spec §4.5), which
    /// must reach the wire even after the connection has been marked
    /// `Closing` to reject *new* caller-initiated commands.
    pub(crate) async fn execute_privileged(
        &self,
        cmd: EncodedCommand,
        mut cancel: CancelToken,
    ) -> Result<ReplyBatch> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut writer = self.write_gate.lock().await;
            wire::write_command(&mut *writer, &cmd).await?;
            self.inner.lock().unwrap().waiters.push_back(Waiter { id, tx });
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled(Some(cmd.display))),
            res = rx => match res {
                Ok(batch_result) => batch_result,
                Err(_) => Err(self.live.shutdown_error(Some(cmd.display))),
            },
        }
    }

    /// Deliver a non-event batch to the head waiter (spec §4.2/§4.3).
    ///
    /// Returns `false` if there was no waiter at all (a protocol
    /// violation the caller must fail the connection over); returns `true`
    /// otherwise, even if the waiter had already been abandoned.
    pub(crate) async fn deliver(&self, batch: ReplyBatch) -> bool {
        let waiter = self.inner.lock().unwrap().waiters.pop_front();
        let Some(waiter) = waiter else {
            return false;
        };
        let result = if batch.is_success() {
            Ok(batch)
        } else {
            let line = batch.final_payload().to_string();
            Err(Error::protocol(format!("waiter #{}", waiter.id), line))
        };
        if waiter.tx.send(result).is_err() {
            warn!(waiter_id = waiter.id, "reply arrived for an abandoned waiter; discarding");
        }
        true
    }

    /// Fail every currently-queued waiter with `ShutdownError` (spec §4.5
    /// "Entering Closed fails every waiter").
    pub(crate) fn shutdown_all(&self) {
        let waiters = std::mem::take(&mut self.inner.lock().unwrap().waiters);
        for waiter in waiters {
            let _ = waiter.tx.send(Err(self.live.shutdown_error(None)));
        }
    }
}
