//! `SIGNAL` (spec §4.6), plus the graceful-shutdown sequence it underlies
//! (spec §4.5, §4.7 `Stop`).

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::{Connection, ConnectionState};
use crate::err::{Error, Result};

/// `SIGNAL <name>`. After a successful `HALT` or `SHUTDOWN`, sleeps for
/// the connection's configured post-signal window (default 500 ms, spec
/// §4.6) so the daemon has time to close.
pub async fn signal(conn: &Connection, name: &str) -> Result<()> {
    conn.submit(
        Command::Signal { name: name.to_string() },
        CancelToken::never(),
    )
    .await?;
    if name.eq_ignore_ascii_case("HALT") || name.eq_ignore_ascii_case("SHUTDOWN") {
        tokio::time::sleep(conn.config.post_shutdown_sleep).await;
    }
    Ok(())
}

/// True if `err` means "the controller was already gone before we even got
/// a reply" — spec §4.5/§9: transport EOF observed during (or instead of)
/// the shutdown reply is treated as success, and so is an explicit
/// "already shut down" reply.
fn already_gone(err: &Error, conn: &Connection) -> bool {
    if conn.state() == ConnectionState::Closed {
        return true;
    }
    if matches!(err, Error::Shutdown { .. }) {
        return true;
    }
    if let Error::Protocol { line, .. } = err {
        let lower = line.to_ascii_lowercase();
        if lower.contains("already shutting down") || lower.contains("already shut down") {
            return true;
        }
    }
    false
}

/// Run through `SIGNAL SHUTDOWN`, falling back to `SIGNAL HALT`, exactly as
/// spec §4.5 describes. Called with the connection already marked
/// `Closing`, which is why this uses `submit_privileged` rather than the
/// normal `Ready`-gated path.
pub(crate) async fn shutdown_sequence(conn: &Connection) -> Result<()> {
    match try_signal_privileged(conn, "SHUTDOWN").await {
        Ok(()) => return Ok(()),
        Err(e) if already_gone(&e, conn) => return Ok(()),
        Err(_) => {}
    }
    match try_signal_privileged(conn, "HALT").await {
        Ok(()) => Ok(()),
        Err(e) if already_gone(&e, conn) => Ok(()),
        Err(e) => Err(e),
    }
}

async fn try_signal_privileged(conn: &Connection, name: &str) -> Result<()> {
    conn.submit_privileged(Command::Signal { name: name.to_string() })
        .await?;
    tokio::time::sleep(conn.config.post_shutdown_sleep).await;
    Ok(())
}
