//! `HSFETCH` (spec §4.6). The descriptor itself arrives later as an
//! `HS_DESC_CONTENT` event (spec §4.4); this command only kicks off the
//! fetch and confirms tor accepted the request.

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::Connection;
use crate::err::Result;

/// `HSFETCH <address> [SERVER=<server> ...]`.
pub async fn hs_fetch(conn: &Connection, address: &str, servers: &[&str]) -> Result<()> {
    conn.submit(
        Command::HsFetch {
            address: address.to_string(),
            servers: servers.iter().map(|s| s.to_string()).collect(),
        },
        CancelToken::never(),
    )
    .await?;
    Ok(())
}
