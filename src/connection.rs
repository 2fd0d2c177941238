//! The connection lifecycle (spec §4.5): owns the transport, runs the
//! reader task, and propagates shutdown to every pending waiter and every
//! event listener exactly once.
//!
//! ```text
//!             new transport
//! Connecting ─────────────────► Ready
//!      │                           │
//!      │ authenticate fails         │ reader EOF, transport error,
//!      ▼                           │ or explicit close()
//!   Closed ◄──────────────────── Closing ◄── SIGNAL SHUTDOWN/HALT reply
//!      ▲
//!      └──── forced disconnect at any time
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::config::TorCtrlConfig;
use crate::dispatcher::{Dispatcher, Liveness};
use crate::err::{Error, Result};
use crate::events::EventRegistry;
use crate::interceptor::InterceptorChain;
use crate::router;
use crate::wire;

/// The connection's externally-observable lifecycle state (spec §3
/// "Connection handle").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport opened, `AUTHENTICATE` not yet confirmed.
    Connecting = 0,
    /// Authenticated; commands may be submitted.
    Ready = 1,
    /// Shutting down (explicit stop, or a shutdown signal was sent/observed).
    Closing = 2,
    /// Terminal. Idempotent.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Ready,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Shared liveness + disconnect bookkeeping between the reader task, the
/// dispatcher and the public [`Connection`] handle.
pub(crate) struct ConnState {
    state: AtomicU8,
    disconnect_fired: AtomicBool,
    on_disconnect: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ConnState {
    fn new() -> Arc<Self> {
        Arc::new(ConnState {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            disconnect_fired: AtomicBool::new(false),
            on_disconnect: Mutex::new(None),
        })
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, s: ConnectionState) {
        self.state.store(s as u8, Ordering::SeqCst);
    }

    /// Register the one-shot disconnect callback. Spec §9: "a one-shot
    /// slot cleared after firing".
    fn set_on_disconnect(&self, f: impl FnOnce() + Send + 'static) {
        *self.on_disconnect.lock().unwrap() = Some(Box::new(f));
    }

    /// Transition to `Closed` and fire the disconnect callback exactly
    /// once (spec §4.5 invariant, testable property 4 and 6).
    fn enter_closed(&self) {
        self.set_state(ConnectionState::Closed);
        if self
            .disconnect_fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Some(cb) = self.on_disconnect.lock().unwrap().take() {
                cb();
            }
        }
    }
}

impl Liveness for ConnState {
    fn is_ready(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Ready
        )
    }

    fn shutdown_error(&self, command: Option<String>) -> Error {
        Error::shutdown(command)
    }
}

/// An open control-protocol connection: authenticate, submit commands,
/// subscribe to events, and shut down.
pub struct Connection {
    pub(crate) state: Arc<ConnState>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) events: Arc<EventRegistry>,
    pub(crate) interceptors: InterceptorChain,
    pub(crate) config: TorCtrlConfig,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

/// Builds a [`Connection`] over an already-open transport.
pub struct ConnectionBuilder {
    config: TorCtrlConfig,
    interceptors: InterceptorChain,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionBuilder {
    /// A builder with default configuration and an empty interceptor chain.
    pub fn new() -> Self {
        ConnectionBuilder {
            config: TorCtrlConfig::default(),
            interceptors: InterceptorChain::new(),
        }
    }

    /// Override the default configuration (timeouts, debounce windows, ...).
    pub fn with_config(mut self, config: TorCtrlConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the (optional, spec §4.10) pre-submission interceptor chain.
    pub fn with_interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Take ownership of `reader`/`writer`, start the reader task, and
    /// return a `Connecting`-state connection. The caller must still
    /// `AUTHENTICATE` (see [`crate::cmd::authenticate`]) before submitting
    /// any other command.
    pub fn build<R, W>(self, reader: R, writer: W) -> Connection
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let state = ConnState::new();
        let events = Arc::new(EventRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Box::new(writer),
            state.clone() as Arc<dyn Liveness>,
        ));

        let reader_state = state.clone();
        let reader_dispatcher = dispatcher.clone();
        let reader_events = events.clone();
        let reader_task = tokio::spawn(reader_loop(
            BufReader::new(reader),
            reader_dispatcher,
            reader_events,
            reader_state,
        ));

        Connection {
            state,
            dispatcher,
            events,
            interceptors: self.interceptors,
            config: self.config,
            reader_task: Mutex::new(Some(reader_task)),
        }
    }
}

/// The reader task (spec §4.5): assembles batches and routes them until
/// end-of-stream or a protocol error, then transitions to `Closed`.
async fn reader_loop<R: AsyncRead + Unpin>(
    mut reader: BufReader<R>,
    dispatcher: Arc<Dispatcher>,
    events: Arc<EventRegistry>,
    state: Arc<ConnState>,
) {
    loop {
        let batch = match wire::read_batch(&mut reader).await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                debug!("control connection reached end of stream");
                break;
            }
            Err(e) => {
                warn!(error = %e, "control connection protocol error; closing");
                break;
            }
        };
        if let Err(e) = router::route(batch, &dispatcher, &events).await {
            warn!(error = %e, "protocol violation; closing connection");
            break;
        }
    }

    state.set_state(ConnectionState::Closing);
    dispatcher.shutdown_all();
    events.clear();
    state.enter_closed();
}

impl Connection {
    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    /// Register the callback invoked exactly once when this connection
    /// enters `Closed`, from whatever task observes the transition first.
    pub fn on_disconnect(&self, f: impl FnOnce() + Send + 'static) {
        self.state.set_on_disconnect(f);
    }

    /// Mark `Ready` once `AUTHENTICATE` has succeeded. Used only by
    /// [`crate::cmd::authenticate`].
    pub(crate) fn mark_ready(&self) {
        self.state.set_state(ConnectionState::Ready);
    }

    /// A handle to this connection's event registry, for `subscribe`/
    /// `unsubscribe`. Wiring `SETEVENTS` re-issuance on change is the
    /// caller's job (see [`crate::cmd::events::sync_subscriptions`]).
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Run `cmd` through the interceptor chain, encode it, and await its
    /// reply batch (spec §4.3/§4.10).
    pub(crate) async fn submit(&self, cmd: Command, cancel: CancelToken) -> Result<wire::ReplyBatch> {
        let cmd = self.interceptors.apply(cmd);
        self.dispatcher.execute(cmd.encode(), cancel).await
    }

    /// Convenience over [`Connection::submit`] with no cancellation source.
    pub(crate) async fn submit_uncancellable(&self, cmd: Command) -> Result<wire::ReplyBatch> {
        self.submit(cmd, CancelToken::never()).await
    }

    /// Like [`Connection::submit_uncancellable`], but bypasses the
    /// `Ready`-only gate. Reserved for the `SIGNAL SHUTDOWN`/`HALT`
    /// exchange run from inside [`Connection::close`].
    pub(crate) async fn submit_privileged(&self, cmd: Command) -> Result<wire::ReplyBatch> {
        let cmd = self.interceptors.apply(cmd);
        self.dispatcher
            .execute_privileged(cmd.encode(), CancelToken::never())
            .await
    }

    /// Graceful shutdown (spec §4.5): send `SIGNAL SHUTDOWN`, falling back
    /// to `SIGNAL HALT`, falling back to a forced transport close. An
    /// already-shut-down controller, or a reader that has already closed,
    /// counts as success.
    pub async fn close(&self) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Ok(());
        }
        self.state.set_state(ConnectionState::Closing);

        let outcome = crate::cmd::signal::shutdown_sequence(self).await;
        if outcome.is_err() {
            warn!("graceful shutdown failed on both SHUTDOWN and HALT; forcing disconnect");
        }
        self.force_close();
        Ok(())
    }

    /// Immediately fail every waiter and drop the subscription registry,
    /// without attempting a graceful `SIGNAL` exchange.
    pub fn force_close(&self) {
        self.dispatcher.shutdown_all();
        self.events.clear();
        self.state.enter_closed();
        if let Some(handle) = self.reader_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// A type-erased future, used where the `collab` traits need an
/// object-safe async return without pulling in `async-trait`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
