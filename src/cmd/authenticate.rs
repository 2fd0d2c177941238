//! `AUTHENTICATE` (spec §4.6): the one command allowed while the
//! connection is still `Connecting`.

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::Connection;
use crate::err::Result;

/// Authenticate with `conn` using the raw cookie/password bytes, hex-encoded
/// lowercase per spec §4.6 "Encoding of binary cookie bytes ... is
/// lowercase hex". On success, the connection transitions to `Ready`.
pub async fn authenticate(conn: &Connection, token: &[u8]) -> Result<()> {
    let token_hex = hex::encode(token);
    conn.submit(Command::Authenticate { token_hex }, CancelToken::never())
        .await?;
    conn.mark_ready();
    Ok(())
}
