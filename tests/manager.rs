//! End-to-end coverage of the manager state machine (spec §4.7) against a
//! minimal in-process stand-in for a `tor` control port — no real `tor`
//! binary involved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex as AsyncMutex;

use tor_ctrl::cmd;
use tor_ctrl::collab::{NetworkObserver, ProcessLauncher};
use tor_ctrl::config::TorCtrlConfigBuilder;
use tor_ctrl::connection::ConnectionBuilder;
use tor_ctrl::mgr::state::LifecycleState;
use tor_ctrl::Connection;

/// Answers every single-line command with `250 OK`, and consumes a
/// `+<keyword>` data block up to its `.` terminator before replying, so it
/// can stand in for `tor` across `TAKEOWNERSHIP`/`LOADCONF`/`SETEVENTS`/
/// `RESETCONF`/`SETCONF`/`SIGNAL` without modelling their semantics.
async fn run_fake_tor<R, W>(reader: R, mut writer: W)
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        if line.starts_with('+') {
            loop {
                let mut body_line = String::new();
                let n = reader.read_line(&mut body_line).await.unwrap_or(0);
                if n == 0 || body_line.trim_end() == "." {
                    break;
                }
            }
        }
        if writer.write_all(b"250 OK\r\n").await.is_err() {
            return;
        }
    }
}

/// Builds an already-`Ready` connection over an in-memory transport backed
/// by [`run_fake_tor`], with a fast `TorCtrlConfig` so shutdown sleeps
/// don't slow the test suite down.
async fn ready_connection() -> Connection {
    let (client, server) = tokio::io::duplex(8192);
    let (client_read, client_write) = split(client);
    let config = TorCtrlConfigBuilder::default()
        .post_shutdown_sleep(Duration::from_millis(5))
        .build()
        .unwrap();
    let conn = ConnectionBuilder::new().with_config(config).build(client_read, client_write);

    let (server_read, server_write) = split(server);
    tokio::spawn(run_fake_tor(server_read, server_write));

    cmd::authenticate::authenticate(&conn, b"").await.unwrap();
    conn
}

struct FakeLauncher {
    pending: AsyncMutex<Option<Connection>>,
    closed: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl FakeLauncher {
    async fn new() -> Self {
        FakeLauncher {
            pending: AsyncMutex::new(Some(ready_connection().await)),
            closed: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(&self) -> tor_ctrl::Result<(Connection, Option<String>)> {
        let conn = self.pending.lock().await.take().expect("launch called once per test");
        Ok((conn, None))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn cancel_job(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

struct AlwaysConnected;

#[async_trait]
impl NetworkObserver for AlwaysConnected {
    async fn is_connected(&self) -> bool {
        true
    }

    fn on_change(&self, _listener: Box<dyn Fn(bool) + Send + Sync>) {}
}

#[tokio::test]
async fn start_reaches_on_with_network_enabled() {
    let launcher = FakeLauncher::new().await;
    let manager = tor_ctrl::TorManager::new(launcher).with_network_observer(Arc::new(AlwaysConnected));

    manager.start().await.unwrap();

    let state = manager.state();
    assert_eq!(state.lifecycle, LifecycleState::On { bootstrap: 0 });
    assert!(state.network_enabled);
}

#[tokio::test]
async fn start_is_idempotent_when_already_on() {
    let launcher = FakeLauncher::new().await;
    let manager = tor_ctrl::TorManager::new(launcher).with_network_observer(Arc::new(AlwaysConnected));

    manager.start().await.unwrap();
    // A second Start against an already-Ready, already-On connection is a
    // no-op success (spec §4.7 Start step 1) rather than trying to launch
    // a second tor process (which would panic our single-use launcher).
    manager.start().await.unwrap();
}

#[tokio::test]
async fn stop_closes_the_launcher_and_returns_to_off() {
    let launcher = FakeLauncher::new().await;
    let closed = launcher.closed.clone();
    let manager = tor_ctrl::TorManager::new(launcher).with_network_observer(Arc::new(AlwaysConnected));

    manager.start().await.unwrap();
    manager.stop().await.unwrap();

    assert_eq!(manager.state().lifecycle, LifecycleState::Off);
    assert!(manager.state().listeners.is_empty());
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn destroy_rejects_further_actions() {
    let launcher = FakeLauncher::new().await;
    let manager = tor_ctrl::TorManager::new(launcher).with_network_observer(Arc::new(AlwaysConnected));
    manager.start().await.unwrap();

    manager.destroy().await;

    let err = manager.stop().await.unwrap_err();
    assert!(matches!(err, tor_ctrl::Error::ManagerDestroyed));
}
