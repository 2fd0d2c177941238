//! Tunables for a [`Connection`](crate::connection::Connection): debounce
//! windows and timeouts that spec §4.7/§9 leave as implementation-defined
//! constants rather than protocol-mandated values.

use std::time::Duration;

use derive_builder::Builder;

/// How long the manager's `NEWNYM` handler waits for a rate-limit notice
/// before concluding tor accepted the signal outright (spec §4.7, §9 Open
/// Question — resolved in favour of a fixed scan window, see DESIGN.md).
pub const DEFAULT_NEWNYM_SCAN_WINDOW: Duration = Duration::from_millis(100);

/// How long the manager's listener-port watcher waits for a burst of
/// `STATUS_CLIENT`/`CONF_CHANGED` events to settle before recomputing the
/// derived listener-address view (spec §4.7).
pub const DEFAULT_LISTENER_DEBOUNCE: Duration = Duration::from_millis(100);

/// How long the manager's bootstrap/network watcher waits for a burst of
/// `STATUS_CLIENT`/`NETWORK_LIVENESS` events to settle before recomputing
/// the derived network-state view (spec §4.7).
pub const DEFAULT_NETWORK_DEBOUNCE: Duration = Duration::from_millis(300);

/// How long [`crate::cmd::signal::signal`] sleeps after a `HALT` or
/// `SHUTDOWN` signal to give tor time to tear down before the transport is
/// forced closed (spec §4.6).
pub const DEFAULT_POST_SHUTDOWN_SLEEP: Duration = Duration::from_millis(500);

/// Tunable timings for one [`Connection`](crate::connection::Connection).
///
/// Built with the owned-pattern builder; every field has a default, so
/// `TorCtrlConfigBuilder::default().build()` and [`TorCtrlConfig::default`]
/// are equivalent.
#[derive(Clone, Copy, Debug, Builder)]
#[builder(pattern = "owned", build_fn(error = "derive_builder::UninitializedFieldError"))]
pub struct TorCtrlConfig {
    /// See [`DEFAULT_NEWNYM_SCAN_WINDOW`].
    #[builder(default = "DEFAULT_NEWNYM_SCAN_WINDOW")]
    pub newnym_scan_window: Duration,
    /// See [`DEFAULT_LISTENER_DEBOUNCE`].
    #[builder(default = "DEFAULT_LISTENER_DEBOUNCE")]
    pub listener_debounce: Duration,
    /// See [`DEFAULT_NETWORK_DEBOUNCE`].
    #[builder(default = "DEFAULT_NETWORK_DEBOUNCE")]
    pub network_debounce: Duration,
    /// See [`DEFAULT_POST_SHUTDOWN_SLEEP`].
    #[builder(default = "DEFAULT_POST_SHUTDOWN_SLEEP")]
    pub post_shutdown_sleep: Duration,
}

impl Default for TorCtrlConfig {
    fn default() -> Self {
        TorCtrlConfigBuilder::default()
            .build()
            .expect("every field of TorCtrlConfigBuilder has a default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_builder_default() {
        let a = TorCtrlConfig::default();
        let b = TorCtrlConfigBuilder::default().build().unwrap();
        assert_eq!(a.newnym_scan_window, b.newnym_scan_window);
        assert_eq!(a.post_shutdown_sleep, b.post_shutdown_sleep);
    }

    #[test]
    fn builder_overrides_one_field() {
        let cfg = TorCtrlConfigBuilder::default()
            .post_shutdown_sleep(Duration::from_millis(50))
            .build()
            .unwrap();
        assert_eq!(cfg.post_shutdown_sleep, Duration::from_millis(50));
        assert_eq!(cfg.newnym_scan_window, DEFAULT_NEWNYM_SCAN_WINDOW);
    }
}
