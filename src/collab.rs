//! External collaborator interfaces (spec §1 "out of scope"): everything
//! the manager (C7) needs from its host but does not implement itself —
//! spawning tor, rendering config, probing connectivity, and formatting
//! addresses/keys. The manager is generic over these so a host can supply
//! real implementations (spawn a subprocess, shell out to a resolver...)
//! while tests supply stubs.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use tracing::{event, Level};

use crate::connection::Connection;
use crate::err::Result;

/// Starts and stops the tor process itself. Out of scope for the core
/// (spec §1); the manager only needs this much of it.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start tor with whatever configuration the launcher was given, and
    /// return a freshly connected, authenticated [`Connection`] plus an
    /// optional `LOADCONF` payload to apply immediately after (spec §4.7
    /// `Start` step 3).
    async fn launch(&self) -> Result<(Connection, Option<String>)>;

    /// Ask the running tor process to exit and release any resources the
    /// launcher holds (spec §4.7 `Stop`: "close the launcher").
    async fn close(&self);

    /// Abandon the current tor job without closing the launcher itself
    /// (spec §4.7 `Restart`: "signal the launcher to cancel its tor job
    /// but do not close the launcher").
    async fn cancel_job(&self);
}

/// Renders a host-level configuration into the text `LOADCONF` expects.
/// Out of scope for the core (spec §1).
pub trait ConfigRenderer: Send + Sync {
    /// Produce a well-formed tor configuration text. The caller (C7/C6)
    /// still strips `ControlPort`/`ControlPortWriteToFile` before sending
    /// it (spec §6).
    fn render(&self) -> String;
}

/// Reports whether the host believes the network is reachable. Out of
/// scope for the core (spec §1); its absence means "assume connectivity".
#[async_trait]
pub trait NetworkObserver: Send + Sync {
    /// Current connectivity belief.
    async fn is_connected(&self) -> bool;

    /// Subscribe to connectivity-change notifications. The manager
    /// debounces these by its configured network-debounce window (spec
    /// §4.7) before acting on them.
    fn on_change(&self, listener: Box<dyn Fn(bool) + Send + Sync>);
}

/// Formats and parses onion/IP addresses for display. Out of scope for the
/// core (spec §1) — the wire format only needs opaque strings.
pub trait AddressCodec: Send + Sync {
    /// Render an onion address (without `.onion`) the way the host wants
    /// it displayed.
    fn format_onion(&self, address: &str) -> String;
}

/// Formats and parses the key material `ADD_ONION`/
/// `ONION_CLIENT_AUTH_ADD` exchange. Out of scope for the core (spec §1).
pub trait KeyCodec: Send + Sync {
    /// Encode a raw key into the `<keyType>:<base64key>` form the wire
    /// expects.
    fn encode_key(&self, key_type: &str, raw: &[u8]) -> String;
}

/// Destination for exceptions the core must contain rather than propagate
/// (spec §4.4 "an exception raised by a listener is wrapped and routed to
/// the library's debug sink"; spec §7 "Listener exceptions are contained").
pub trait DebugSink: Send + Sync {
    /// Record a contained failure. `context` names the component or
    /// listener kind that failed; `detail` is a human-readable message.
    fn record(&self, context: &str, detail: &str);
}

/// A [`DebugSink`] that forwards everything to `tracing` at `WARN`,
/// mirroring how the rest of this crate reports contained failures.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDebugSink;

impl DebugSink for TracingDebugSink {
    fn record(&self, context: &str, detail: &str) {
        event!(Level::WARN, context, detail, "contained failure");
    }
}

impl fmt::Debug for dyn DebugSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn DebugSink")
    }
}

/// The union of event kinds the manager requires to maintain its derived
/// tor-state view (bootstrap percent, network flag, listener addresses —
/// spec §4.7), unioned with whatever a caller separately subscribes to
/// before `SETEVENTS` is issued (spec §4.4).
pub fn required_manager_events() -> HashSet<String> {
    ["STATUS_CLIENT", "NOTICE", "CONF_CHANGED", "NETWORK_LIVENESS"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_events_include_status_and_conf_changed() {
        let events = required_manager_events();
        assert!(events.contains("STATUS_CLIENT"));
        assert!(events.contains("CONF_CHANGED"));
    }
}
