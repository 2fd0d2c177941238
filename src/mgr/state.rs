//! The derived tor-state view (spec §3 "Tor state (derived, held by C7)"):
//! bootstrap percent, network-enabled flag, and listener addresses, all
//! rebuilt from events rather than persisted.

use std::collections::BTreeMap;

/// `{Off, Starting, On{bootstrap}, Stopping}` (spec §3). Bootstrap is
/// monotonically non-decreasing while `On`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Off,
    Starting,
    On { bootstrap: u8 },
    Stopping,
}

impl LifecycleState {
    /// The bootstrap percent this state carries, if any.
    pub fn bootstrap(&self) -> Option<u8> {
        match self {
            LifecycleState::On { bootstrap } => Some(*bootstrap),
            _ => None,
        }
    }
}

/// The four listener kinds the manager tracks (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerKind {
    Dns,
    Http,
    Socks,
    Trans,
}

impl ListenerKind {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "dns" => Some(ListenerKind::Dns),
            "http" => Some(ListenerKind::Http),
            "socks" => Some(ListenerKind::Socks),
            "trans" | "transparent" => Some(ListenerKind::Trans),
            _ => None,
        }
    }
}

/// The full derived view (spec §3/§4.7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TorState {
    pub lifecycle: LifecycleState,
    pub network_enabled: bool,
    pub listeners: BTreeMap<ListenerKind, String>,
}

impl Default for TorState {
    fn default() -> Self {
        TorState {
            lifecycle: LifecycleState::Off,
            network_enabled: false,
            listeners: BTreeMap::new(),
        }
    }
}

impl TorState {
    /// Transition to `{Off, Stopping}` and clear listener addresses, per
    /// the invariant "any transition to Off/Stopping zeroes
    /// ListenerAddresses on the next publication" (spec §3).
    pub fn clear_listeners_on_stop(&mut self) {
        if matches!(self.lifecycle, LifecycleState::Off | LifecycleState::Stopping) {
            self.listeners.clear();
        }
    }

    /// Apply a bootstrap percent parsed from a `Bootstrapped NN ...`
    /// notice line, clamped to monotonic non-decrease while `On` (spec
    /// §4.7 "Bootstrap tracking").
    pub fn apply_bootstrap(&mut self, percent: u8) {
        let next = match self.lifecycle {
            LifecycleState::On { bootstrap } => percent.max(bootstrap),
            _ => percent,
        };
        self.lifecycle = LifecycleState::On { bootstrap: next };
    }

    /// Apply a `CONF_CHANGED` line whose payload begins with
    /// `DisableNetwork` (spec §4.7 "Network state tracking").
    pub fn apply_disable_network_line(&mut self, line: &str) {
        if let Some((_, value)) = line.split_once('=') {
            self.network_enabled = value.trim() == "0";
        }
    }

    /// Apply a notice-log line about a listener opening or closing (spec
    /// §4.7 "Listener-address tracking"). Returns `true` if the map
    /// changed.
    pub fn apply_listener_line(&mut self, line: &str) -> bool {
        if let Some(rest) = line.strip_prefix("Opened ") {
            let mut words = rest.split_whitespace();
            let Some(kind_word) = words.next() else { return false };
            let Some(kind) = ListenerKind::parse(kind_word) else { return false };
            if let Some(addr) = line.rsplit(" on ").next() {
                let addr = addr.trim_end_matches('.');
                self.listeners.insert(kind, addr.to_string());
                return true;
            }
        } else if let Some(rest) = line.strip_prefix("Closing no-longer-configured ") {
            let mut words = rest.split_whitespace();
            let Some(kind_word) = words.next() else { return false };
            if let Some(kind) = ListenerKind::parse(kind_word) {
                return self.listeners.remove(&kind).is_some();
            }
        }
        false
    }
}

/// Parse a `Bootstrapped NN ...` notice payload into its percent, if this
/// line is one.
pub fn parse_bootstrap_percent(line: &str) -> Option<u8> {
    let rest = line.strip_prefix("Bootstrapped ")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_percent_parses() {
        assert_eq!(parse_bootstrap_percent("Bootstrapped 42% (loading)"), Some(42));
        assert_eq!(parse_bootstrap_percent("Something else"), None);
    }

    #[test]
    fn bootstrap_is_monotonic_while_on() {
        let mut state = TorState::default();
        state.apply_bootstrap(10);
        state.apply_bootstrap(50);
        state.apply_bootstrap(30);
        assert_eq!(state.lifecycle.bootstrap(), Some(50));
    }

    #[test]
    fn listener_opened_then_closed() {
        let mut state = TorState::default();
        assert!(state.apply_listener_line(
            "Opened socks listener connection (ready) on 127.0.0.1:9050"
        ));
        assert_eq!(
            state.listeners.get(&ListenerKind::Socks),
            Some(&"127.0.0.1:9050".to_string())
        );
        assert!(state.apply_listener_line("Closing no-longer-configured socks listener on 127.0.0.1:9050"));
        assert!(!state.listeners.contains_key(&ListenerKind::Socks));
    }

    #[test]
    fn disable_network_line_toggles_flag() {
        let mut state = TorState::default();
        state.network_enabled = true;
        state.apply_disable_network_line("DisableNetwork=1");
        assert!(!state.network_enabled);
        state.apply_disable_network_line("DisableNetwork=0");
        assert!(state.network_enabled);
    }

    #[test]
    fn stop_clears_listeners() {
        let mut state = TorState::default();
        state.apply_listener_line("Opened dns listener connection (ready) on 127.0.0.1:5353");
        state.lifecycle = LifecycleState::Stopping;
        state.clear_listeners_on_stop();
        assert!(state.listeners.is_empty());
    }
}
