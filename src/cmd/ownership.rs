//! `TAKEOWNERSHIP`/`DROPOWNERSHIP`/`DROPGUARDS` (spec §4.6).

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::Connection;
use crate::err::Result;

/// `TAKEOWNERSHIP`: ties tor's lifetime to this control connection, so tor
/// exits when the connection closes.
pub async fn take_ownership(conn: &Connection) -> Result<()> {
    conn.submit(Command::TakeOwnership, CancelToken::never()).await?;
    Ok(())
}

/// `DROPOWNERSHIP`: undoes a prior `TAKEOWNERSHIP`.
pub async fn drop_ownership(conn: &Connection) -> Result<()> {
    conn.submit(Command::DropOwnership, CancelToken::never()).await?;
    Ok(())
}

/// `DROPGUARDS`: forgets the current entry-guard set.
pub async fn drop_guards(conn: &Connection) -> Result<()> {
    conn.submit(Command::DropGuards, CancelToken::never()).await?;
    Ok(())
}
