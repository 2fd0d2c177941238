//! `SETEVENTS` (spec §4.6) and the glue that keeps it in sync with the
//! event registry (spec §4.4: "the set of active kinds is recomputed on
//! every change and pushed to tor via SETEVENTS").

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::Connection;
use crate::err::Result;

/// Install the callback that re-issues `SETEVENTS` whenever the set of
/// subscribed kinds changes (subscribe/unsubscribe/clear). Called once,
/// typically right after a connection reaches `Ready`.
pub fn install(conn: Arc<Connection>) {
    conn.events().set_on_kinds_changed(move |kinds| {
        let conn = conn.clone();
        tokio::spawn(async move {
            if let Err(e) = set_events(&conn, kinds).await {
                warn!(error = %e, "failed to reconcile SETEVENTS subscription");
            }
        });
    });
}

/// `SETEVENTS <events...>`, in a stable (sorted) order so the wire form is
/// deterministic regardless of `HashSet` iteration order.
pub async fn set_events(conn: &Connection, kinds: HashSet<String>) -> Result<()> {
    let mut events: Vec<String> = kinds.into_iter().collect();
    events.sort();
    conn.submit(
        Command::SetEvents { extended: false, events },
        CancelToken::never(),
    )
    .await?;
    Ok(())
}
