//! The manager state machine (C7, spec §4.7): coordinates mutually
//! exclusive Start/Stop/Restart actions against one held connection, and
//! maintains the derived tor-state view from events.

pub mod queue;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::cmd;
use crate::collab::{required_manager_events, DebugSink, NetworkObserver, ProcessLauncher, TracingDebugSink};
use crate::connection::{Connection, ConnectionState};
use crate::err::{Error, Result};
use crate::events::DecodedEvent;

use queue::{ActionKind, ActionQueue};
use state::{parse_bootstrap_percent, LifecycleState, TorState};

/// A one-shot notice the manager publishes outside its regular state
/// stream (spec §4.7: "publish `WAITING_ON_NETWORK`" / "publishes a
/// one-shot `StartUpComplete` event").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerNotice {
    /// `Start` reached `RESETCONF OwningControllerProcess` with the
    /// network left disabled, because no connectivity was reported.
    WaitingOnNetwork,
    /// Bootstrap first reached 100% with the network enabled.
    StartUpComplete,
}

/// The rate-limit detector's verdict on a `SIGNAL NEWNYM` (spec §4.7
/// "NEWNYM rate-limit detection").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NewnymOutcome {
    /// No rate-limit notice was seen within the scan window.
    Accepted,
    /// Tor logged a rate-limit notice; carries its message verbatim.
    RateLimited(String),
}

/// All mutable state behind one lock (see `tor-chanmgr`'s `MgrState` for
/// why this is its own type: a single blocking mutex that is never held
/// across an `.await`).
struct Inner {
    tor_state: SyncMutex<TorState>,
    connection: SyncMutex<Option<Arc<Connection>>>,
    newnym_scan: SyncMutex<Option<NewnymScan>>,
    /// The pending debounced publish for a burst of listener-address
    /// changes (spec §4.7 "debounce address publications"), if one is
    /// in flight.
    listener_publish: SyncMutex<Option<JoinHandle<()>>>,
    /// The pending debounced `SETCONF`/`RESETCONF DisableNetwork` in
    /// response to a [`NetworkObserver::on_change`] notification, if one
    /// is in flight.
    network_action: SyncMutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

struct NewnymScan {
    sender: Arc<tokio::sync::Notify>,
    result: Arc<SyncMutex<Option<String>>>,
}

/// Coordinates Start/Stop/Restart against one tor control connection (spec
/// §4.7). Generic over the external collaborators it needs but does not
/// implement (spec §1).
pub struct TorManager<L: ProcessLauncher> {
    launcher: L,
    network_observer: Option<Arc<dyn NetworkObserver>>,
    debug_sink: Arc<dyn DebugSink>,
    inner: Arc<Inner>,
    queue: ActionQueue,
    state_tx: watch::Sender<TorState>,
    notice_tx: watch::Sender<Option<ManagerNotice>>,
}

impl<L: ProcessLauncher + 'static> TorManager<L> {
    /// Build a manager around `launcher`, with no network observer and a
    /// tracing-backed debug sink.
    pub fn new(launcher: L) -> Self {
        let (state_tx, _) = watch::channel(TorState::default());
        let (notice_tx, _) = watch::channel(None);
        TorManager {
            launcher,
            network_observer: None,
            debug_sink: Arc::new(TracingDebugSink),
            inner: Arc::new(Inner {
                tor_state: SyncMutex::new(TorState::default()),
                connection: SyncMutex::new(None),
                newnym_scan: SyncMutex::new(None),
                listener_publish: SyncMutex::new(None),
                network_action: SyncMutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
            queue: ActionQueue::new(),
            state_tx,
            notice_tx,
        }
    }

    /// Install a [`NetworkObserver`] (spec §4.7 Start step 9).
    pub fn with_network_observer(mut self, observer: Arc<dyn NetworkObserver>) -> Self {
        self.network_observer = Some(observer);
        self
    }

    /// Install a [`DebugSink`] for contained failures (spec §7).
    pub fn with_debug_sink(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.debug_sink = sink;
        self
    }

    /// A read-only view of the current derived state.
    pub fn state(&self) -> TorState {
        self.inner.tor_state.lock().unwrap().clone()
    }

    /// Subscribe to the monotonic stream of state-machine publications
    /// (spec §5 "Ordering guarantees": "never re-ordered across a
    /// disconnect").
    pub fn subscribe_state(&self) -> watch::Receiver<TorState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to the one-shot notices (spec §4.7).
    pub fn subscribe_notices(&self) -> watch::Receiver<Option<ManagerNotice>> {
        self.notice_tx.subscribe()
    }

    fn publish_state(&self, f: impl FnOnce(&mut TorState)) {
        let mut guard = self.inner.tor_state.lock().unwrap();
        f(&mut guard);
        guard.clear_listeners_on_stop();
        let snapshot = guard.clone();
        drop(guard);
        let _ = self.state_tx.send(snapshot);
    }

    fn fail_if_destroyed(&self) -> Result<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(Error::ManagerDestroyed);
        }
        Ok(())
    }

    /// `Start` (spec §4.7).
    pub async fn start(&self) -> Result<()> {
        self.fail_if_destroyed()?;
        let ticket = self.queue.enqueue(ActionKind::Start);
        let mut cancel = CancelToken::never();
        let _guard = self.queue.acquire(&ticket, &mut cancel).await?;
        self.start_locked(false).await
    }

    async fn start_locked(&self, _is_restart: bool) -> Result<()> {
        // Step 1: idempotent success if already on and ready.
        if let Some(conn) = self.inner.connection.lock().unwrap().clone() {
            let already_on = matches!(
                self.inner.tor_state.lock().unwrap().lifecycle,
                LifecycleState::On { .. }
            );
            if conn.state() == ConnectionState::Ready && already_on {
                return Ok(());
            }
        }

        self.publish_state(|s| s.lifecycle = LifecycleState::Starting);

        let (conn, loadconf) = self.launcher.launch().await?;
        let conn = Arc::new(conn);

        self.wire_connection(&conn);

        // Step 6: the launcher already returned an authenticated connection.
        cmd::ownership::take_ownership(&conn).await?;

        // Step 7.
        if let Some(text) = loadconf {
            cmd::conf::load_conf(&conn, &text).await?;
        }

        // Step 8: union of required events with whatever's already subscribed.
        let events = conn.events().active_kinds();
        cmd::events::set_events(&conn, events).await?;
        cmd::events::install(conn.clone());

        // Step 9.
        let connected = match &self.network_observer {
            Some(obs) => obs.is_connected().await,
            None => true,
        };
        if connected {
            cmd::conf::reset_conf(
                &conn,
                &[("DisableNetwork", None), ("OwningControllerProcess", None)],
            )
            .await?;
            self.publish_state(|s| s.network_enabled = true);
        } else {
            cmd::conf::reset_conf(&conn, &[("OwningControllerProcess", None)]).await?;
            let _ = self.notice_tx.send(Some(ManagerNotice::WaitingOnNetwork));
        }

        *self.inner.connection.lock().unwrap() = Some(conn);
        self.publish_state(|s| s.lifecycle = LifecycleState::On { bootstrap: 0 });
        Ok(())
    }

    /// Wire the manager's own derived-state tracking onto `conn`: it
    /// registers itself as an event listener (spec §4.7 Start step 4), as
    /// the connection's debug sink, as a [`NetworkObserver::on_change`]
    /// subscriber when one was installed, and as the on-disconnect
    /// callback (step 5).
    fn wire_connection(&self, conn: &Arc<Connection>) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let state_tx = self.state_tx.clone();
        let notice_tx = self.notice_tx.clone();
        let listener_debounce = conn.config.listener_debounce;

        conn.events().set_debug_sink(self.debug_sink.clone());

        // Required events (spec §4.7 step 8's floor) plus whatever a
        // caller separately subscribed to are unioned and sent via
        // SETEVENTS once the connection reaches Ready.
        for kind in required_manager_events() {
            let weak = weak.clone();
            let state_tx = state_tx.clone();
            let notice_tx = notice_tx.clone();
            conn.events().subscribe(kind, Arc::new(move |event: &DecodedEvent| {
                let Some(inner) = weak.upgrade() else { return Ok(()) };
                handle_manager_event(inner, &state_tx, &notice_tx, listener_debounce, event);
                Ok(())
            }));
        }

        if let Some(observer) = self.network_observer.clone() {
            let weak = Arc::downgrade(&self.inner);
            let conn_weak = Arc::downgrade(conn);
            let network_debounce = conn.config.network_debounce;
            observer.on_change(Box::new(move |connected| {
                let Some(inner) = weak.upgrade() else { return };
                let Some(conn) = conn_weak.upgrade() else { return };
                schedule_network_action(inner, conn, connected, network_debounce);
            }));
        }

        let weak_disconnect = Arc::downgrade(&self.inner);
        let conn_for_disconnect = Arc::downgrade(conn);
        conn.on_disconnect(move || {
            let Some(inner) = weak_disconnect.upgrade() else { return };
            let Some(expected) = conn_for_disconnect.upgrade() else { return };
            let mut held = inner.connection.lock().unwrap();
            if let Some(current) = held.as_ref() {
                if Arc::ptr_eq(current, &expected) {
                    *held = None;
                }
            }
        });
    }

    /// `Stop(connection, isRestart)` (spec §4.7).
    pub async fn stop(&self) -> Result<()> {
        self.fail_if_destroyed()?;
        let ticket = self.queue.enqueue(ActionKind::Stop);
        let mut cancel = CancelToken::never();
        let _guard = self.queue.acquire(&ticket, &mut cancel).await?;
        self.stop_locked(false).await
    }

    async fn stop_locked(&self, is_restart: bool) -> Result<()> {
        self.publish_state(|s| {
            s.lifecycle = LifecycleState::Stopping;
        });

        let conn = if is_restart {
            self.inner.connection.lock().unwrap().take()
        } else {
            self.inner.connection.lock().unwrap().clone()
        };
        let Some(conn) = conn else {
            self.publish_state(|s| s.lifecycle = LifecycleState::Off);
            return Ok(());
        };

        if self.inner.tor_state.lock().unwrap().network_enabled {
            let _ = cmd::conf::set_conf(&conn, &[("DisableNetwork", Some("1"))]).await;
        }

        if let Err(e) = conn.close().await {
            warn!(error = %e, "forced close during Stop");
        }

        if !is_restart {
            self.launcher.close().await;
            *self.inner.connection.lock().unwrap() = None;
        } else {
            self.launcher.cancel_job().await;
        }

        self.publish_state(|s| s.lifecycle = LifecycleState::Off);
        Ok(())
    }

    /// `Restart` (spec §4.7): `Stop(isRestart=true)` then `Start`, aborting
    /// with `Interrupted` if a user `Stop` was recorded while stopping.
    pub async fn restart(&self) -> Result<()> {
        self.fail_if_destroyed()?;
        let ticket = self.queue.enqueue(ActionKind::Restart);
        let mut cancel = CancelToken::never();
        let _guard = self.queue.acquire(&ticket, &mut cancel).await?;

        self.stop_locked(true).await?;

        if self.queue.stop_recorded_after(ticket.sequence()) {
            self.launcher.close().await;
            return Err(Error::Interrupted);
        }

        self.start_locked(true).await
    }

    /// Run `SIGNAL NEWNYM` and report whether tor logged a rate-limit
    /// notice within the configured scan window (spec §4.7 "NEWNYM
    /// rate-limit detection").
    pub async fn newnym(&self, scan_window: Duration) -> Result<NewnymOutcome> {
        self.fail_if_destroyed()?;
        let conn = self
            .inner
            .connection
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::shutdown(Some("SIGNAL NEWNYM")))?;

        let notify = Arc::new(tokio::sync::Notify::new());
        let result = Arc::new(SyncMutex::new(None));
        *self.inner.newnym_scan.lock().unwrap() = Some(NewnymScan {
            sender: notify.clone(),
            result: result.clone(),
        });

        cmd::signal::signal(&conn, "NEWNYM").await?;

        let _ = timeout(scan_window, notify.notified()).await;
        *self.inner.newnym_scan.lock().unwrap() = None;

        match result.lock().unwrap().take() {
            Some(message) => Ok(NewnymOutcome::RateLimited(message)),
            None => Ok(NewnymOutcome::Accepted),
        }
    }

    /// Tear the manager down: fail any future action with
    /// `ManagerDestroyed` and drop the held connection.
    pub async fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        if let Some(conn) = self.inner.connection.lock().unwrap().take() {
            conn.force_close();
        }
        self.launcher.close().await;
    }
}

/// Update the derived [`TorState`] from one decoded manager-relevant
/// event, fire the NEWNYM rate-limit scan if one is active, and publish
/// the new state — immediately for bootstrap/network changes, debounced
/// for listener-address changes (spec §4.7 "debounce address
/// publications by 100 ms so bursts collapse to one observable update").
fn handle_manager_event(
    inner: Arc<Inner>,
    state_tx: &watch::Sender<TorState>,
    notice_tx: &watch::Sender<Option<ManagerNotice>>,
    listener_debounce: Duration,
    event: &DecodedEvent,
) {
    let lines: Vec<&str> = match &event.payload {
        crate::events::EventPayload::Line(l) => vec![l.as_str()],
        crate::events::EventPayload::Lines(ls) => ls.iter().map(String::as_str).collect(),
    };

    let mut immediate_changed = false;
    let mut listener_changed = false;
    {
        let mut state = inner.tor_state.lock().unwrap();
        for line in &lines {
            if let Some(percent) = parse_bootstrap_percent(line) {
                let was_complete = matches!(state.lifecycle, LifecycleState::On { bootstrap: 100 });
                state.apply_bootstrap(percent);
                immediate_changed = true;
                if !was_complete
                    && matches!(state.lifecycle, LifecycleState::On { bootstrap: 100 })
                    && state.network_enabled
                {
                    debug!("tor finished bootstrapping");
                    let _ = notice_tx.send(Some(ManagerNotice::StartUpComplete));
                }
            }
            if line.starts_with("DisableNetwork") {
                state.apply_disable_network_line(line);
                immediate_changed = true;
            }
            if line.starts_with("Opened ") || line.starts_with("Closing no-longer-configured ") {
                listener_changed |= state.apply_listener_line(line);
            }
            scan_for_rate_limit(&inner, line);
        }
        if immediate_changed || listener_changed {
            state.clear_listeners_on_stop();
        }
    }

    if immediate_changed {
        // A bootstrap/network change supersedes any pending debounced
        // listener-only publish; this snapshot already carries it.
        if let Some(handle) = inner.listener_publish.lock().unwrap().take() {
            handle.abort();
        }
        let _ = state_tx.send(inner.tor_state.lock().unwrap().clone());
    } else if listener_changed {
        schedule_listener_publish(inner, state_tx.clone(), listener_debounce);
    }
}

/// (Re)start the debounce timer for a burst of listener-address changes;
/// a change arriving before it fires cancels and restarts it, so a burst
/// of `Opened .../Closing ...` lines collapses into one publication.
fn schedule_listener_publish(inner: Arc<Inner>, state_tx: watch::Sender<TorState>, debounce: Duration) {
    let mut slot = inner.listener_publish.lock().unwrap();
    if let Some(handle) = slot.take() {
        handle.abort();
    }
    let inner_for_task = inner.clone();
    *slot = Some(tokio::spawn(async move {
        tokio::time::sleep(debounce).await;
        let snapshot = inner_for_task.tor_state.lock().unwrap().clone();
        let _ = state_tx.send(snapshot);
    }));
}

/// (Re)start the debounce timer for a [`NetworkObserver::on_change`]
/// notification, then issue `SETCONF DisableNetwork=1` (network down) or
/// `RESETCONF DisableNetwork` (network up) once it settles (spec §4.7
/// "Network state tracking": "debounces these by its configured
/// network-debounce window before acting on them").
fn schedule_network_action(inner: Arc<Inner>, conn: Arc<Connection>, connected: bool, debounce: Duration) {
    let mut slot = inner.network_action.lock().unwrap();
    if let Some(handle) = slot.take() {
        handle.abort();
    }
    *slot = Some(tokio::spawn(async move {
        tokio::time::sleep(debounce).await;
        let result = if connected {
            cmd::conf::reset_conf(&conn, &[("DisableNetwork", None)]).await
        } else {
            cmd::conf::set_conf(&conn, &[("DisableNetwork", Some("1"))]).await
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to apply debounced network-state change");
        }
    }));
}

/// Feed one notice-log line to the active NEWNYM scan, if any (spec §4.7
/// "NEWNYM rate-limit detection").
fn scan_for_rate_limit(inner: &Inner, line: &str) {
    const RATE_LIMIT_PREFIX: &str = "Rate limiting NEWNYM request";
    if let Some(msg) = line.strip_prefix(RATE_LIMIT_PREFIX) {
        if let Some(scan) = inner.newnym_scan.lock().unwrap().as_ref() {
            *scan.result.lock().unwrap() = Some(format!("{RATE_LIMIT_PREFIX}{msg}"));
            scan.sender.notify_one();
        }
    }
}
