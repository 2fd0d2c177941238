//! The typed command surface (spec §4.6): one [`Command`] variant per
//! control-protocol command, its wire encoding, and (in the per-family
//! submodules) the typed request builder and reply parser that wrap it.

use strum::EnumDiscriminants;

use crate::wire::{encode_data_command, encode_single_line, EncodedCommand};

pub mod authenticate;
pub mod conf;
pub mod events;
pub mod getinfo;
pub mod hsfetch;
pub mod mapaddress;
pub mod onion;
pub mod onion_client_auth;
pub mod ownership;
pub mod signal;

/// One control-protocol command, already carrying its typed arguments.
///
/// Kept as a single tagged variant (spec §9 "Dynamic dispatch of
/// commands") rather than one type per command plus a trait object, so the
/// dispatcher stays monomorphic over "byte-sequence <-> reply-batch" while
/// the interceptor chain (C10) can match on [`CommandKind`] without caring
/// about each variant's payload shape.
#[derive(Clone, Debug, EnumDiscriminants)]
#[strum_discriminants(name(CommandKind), derive(Hash))]
#[non_exhaustive]
pub enum Command {
    /// `AUTHENTICATE`
    Authenticate { token_hex: String },
    /// `GETCONF`
    GetConf { keywords: Vec<String> },
    /// `SETCONF`
    SetConf { settings: Vec<(String, Option<String>)> },
    /// `RESETCONF`
    ResetConf { settings: Vec<(String, Option<String>)> },
    /// `+LOADCONF`
    LoadConf { text: String },
    /// `SAVECONF`
    SaveConf { force: bool },
    /// `GETINFO`
    GetInfo { keywords: Vec<String> },
    /// `SETEVENTS`
    SetEvents { extended: bool, events: Vec<String> },
    /// `SIGNAL`
    Signal { name: String },
    /// `ADD_ONION`
    AddOnion {
        key_spec: String,
        flags: Vec<String>,
        max_streams: Option<u32>,
        ports: Vec<(String, String)>,
    },
    /// `DEL_ONION`
    DelOnion { address: String },
    /// `ONION_CLIENT_AUTH_ADD`
    OnionClientAuthAdd {
        address: String,
        key_spec: String,
        client_name: Option<String>,
        flags: Vec<String>,
    },
    /// `ONION_CLIENT_AUTH_REMOVE`
    OnionClientAuthRemove { address: String },
    /// `ONION_CLIENT_AUTH_VIEW`
    OnionClientAuthView { address: Option<String> },
    /// `HSFETCH`
    HsFetch { address: String, servers: Vec<String> },
    /// `MAPADDRESS`
    MapAddress { mappings: Vec<(String, String)> },
    /// `DROPGUARDS`
    DropGuards,
    /// `TAKEOWNERSHIP`
    TakeOwnership,
    /// `DROPOWNERSHIP`
    DropOwnership,
}

impl Command {
    /// The wire form of this command, per the table in spec §4.6.
    pub fn encode(&self) -> EncodedCommand {
        match self {
            Command::Authenticate { token_hex } => {
                let mut cmd = encode_single_line(&["AUTHENTICATE", token_hex]);
                // The bytes still carry the real cookie; only the
                // human-readable rendering (errors, logs) is redacted.
                cmd.display = "AUTHENTICATE <redacted>".to_string();
                cmd
            }
            Command::GetConf { keywords } => {
                let mut tokens = vec!["GETCONF".to_string()];
                tokens.extend(keywords.iter().cloned());
                encode_single_line(&tokens.iter().map(String::as_str).collect::<Vec<_>>())
            }
            Command::SetConf { settings } => {
                encode_keyword_value_command("SETCONF", settings)
            }
            Command::ResetConf { settings } => {
                encode_keyword_value_command("RESETCONF", settings)
            }
            Command::LoadConf { text } => encode_data_command("LOADCONF", text),
            Command::SaveConf { force } => {
                if *force {
                    encode_single_line(&["SAVECONF", "FORCE"])
                } else {
                    encode_single_line(&["SAVECONF"])
                }
            }
            Command::GetInfo { keywords } => {
                let mut tokens = vec!["GETINFO".to_string()];
                tokens.extend(keywords.iter().cloned());
                encode_single_line(&tokens.iter().map(String::as_str).collect::<Vec<_>>())
            }
            Command::SetEvents { extended, events } => {
                let mut tokens = vec!["SETEVENTS".to_string()];
                if *extended {
                    tokens.push("EXTENDED".to_string());
                }
                tokens.extend(events.iter().cloned());
                encode_single_line(&tokens.iter().map(String::as_str).collect::<Vec<_>>())
            }
            Command::Signal { name } => encode_single_line(&["SIGNAL", name]),
            Command::AddOnion {
                key_spec,
                flags,
                max_streams,
                ports,
            } => {
                let mut tokens = vec!["ADD_ONION".to_string(), key_spec.clone()];
                if !flags.is_empty() {
                    tokens.push(format!("Flags={}", flags.join(",")));
                }
                if let Some(n) = max_streams {
                    tokens.push(format!("MaxStreams={n}"));
                }
                for (virt, target) in ports {
                    tokens.push(format!("Port={virt},{target}"));
                }
                encode_single_line(&tokens.iter().map(String::as_str).collect::<Vec<_>>())
            }
            Command::DelOnion { address } => encode_single_line(&["DEL_ONION", address]),
            Command::OnionClientAuthAdd {
                address,
                key_spec,
                client_name,
                flags,
            } => {
                let mut tokens =
                    vec!["ONION_CLIENT_AUTH_ADD".to_string(), address.clone(), key_spec.clone()];
                if let Some(name) = client_name {
                    tokens.push(format!("ClientName={name}"));
                }
                if !flags.is_empty() {
                    tokens.push(format!("Flags={}", flags.join(",")));
                }
                encode_single_line(&tokens.iter().map(String::as_str).collect::<Vec<_>>())
            }
            Command::OnionClientAuthRemove { address } => {
                encode_single_line(&["ONION_CLIENT_AUTH_REMOVE", address])
            }
            Command::OnionClientAuthView { address } => {
                let mut tokens = vec!["ONION_CLIENT_AUTH_VIEW".to_string()];
                if let Some(addr) = address {
                    tokens.push(addr.clone());
                }
                encode_single_line(&tokens.iter().map(String::as_str).collect::<Vec<_>>())
            }
            Command::HsFetch { address, servers } => {
                let mut tokens = vec!["HSFETCH".to_string(), address.clone()];
                tokens.extend(servers.iter().map(|s| format!("SERVER={s}")));
                encode_single_line(&tokens.iter().map(String::as_str).collect::<Vec<_>>())
            }
            Command::MapAddress { mappings } => {
                let mut tokens = vec!["MAPADDRESS".to_string()];
                tokens.extend(mappings.iter().map(|(from, to)| format!("{from}={to}")));
                encode_single_line(&tokens.iter().map(String::as_str).collect::<Vec<_>>())
            }
            Command::DropGuards => encode_single_line(&["DROPGUARDS"]),
            Command::TakeOwnership => encode_single_line(&["TAKEOWNERSHIP"]),
            Command::DropOwnership => encode_single_line(&["DROPOWNERSHIP"]),
        }
    }

    /// The kind tag used by the interceptor chain and the blacklist.
    pub fn kind(&self) -> CommandKind {
        self.into()
    }
}

/// `SETCONF`/`RESETCONF` share the `keyword[=value]` encoding (spec §4.6).
fn encode_keyword_value_command(
    name: &str,
    settings: &[(String, Option<String>)],
) -> EncodedCommand {
    let mut tokens = vec![name.to_string()];
    for (k, v) in settings {
        match v {
            Some(v) => tokens.push(format!("{k}={v}")),
            None => tokens.push(k.clone()),
        }
    }
    encode_single_line(&tokens.iter().map(String::as_str).collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_onion_new_key_wire_form() {
        let cmd = Command::AddOnion {
            key_spec: "NEW:ED25519-V3".into(),
            flags: vec!["DiscardPK".into()],
            max_streams: None,
            ports: vec![("80".into(), "127.0.0.1:8080".into())],
        };
        let encoded = cmd.encode();
        assert_eq!(
            String::from_utf8(encoded.bytes).unwrap(),
            "ADD_ONION NEW:ED25519-V3 Flags=DiscardPK Port=80,127.0.0.1:8080\r\n"
        );
    }

    #[test]
    fn authenticate_display_redacts_the_cookie() {
        let cmd = Command::Authenticate { token_hex: "48656c6c6f".into() };
        let encoded = cmd.encode();
        assert_eq!(encoded.display, "AUTHENTICATE <redacted>");
        assert_eq!(
            String::from_utf8(encoded.bytes).unwrap(),
            "AUTHENTICATE 48656c6c6f\r\n"
        );
    }

    #[test]
    fn setconf_omits_equals_when_value_absent() {
        let cmd = Command::ResetConf {
            settings: vec![("DisableNetwork".into(), None)],
        };
        assert_eq!(
            String::from_utf8(cmd.encode().bytes).unwrap(),
            "RESETCONF DisableNetwork\r\n"
        );
    }
}
