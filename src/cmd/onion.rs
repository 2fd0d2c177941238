//! `ADD_ONION`/`DEL_ONION` (spec §4.6).
//!
//! `ADD_ONION` and `DEL_ONION` are the two commands the interceptor
//! blacklist (spec §4.10) always protects from rewriting, since they
//! carry user intent (which service to create or destroy) that a rewrite
//! hook must never silently redirect.

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::Connection;
use crate::err::{Error, Result};
use crate::wire::ReplyBatch;

/// One virtual-port mapping: `virtual_port` is exposed on the onion
/// address, `target` is `host:port` (or a path, for a Unix-socket target).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortMapping {
    /// The virtual port clients connect to.
    pub virtual_port: String,
    /// Where tor forwards the connection.
    pub target: String,
}

/// The decoded result of a successful `ADD_ONION` (spec §4.6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HiddenServiceEntry {
    /// The onion service's v3 address (without `.onion`), as returned by
    /// tor under `ServiceID=` (case-insensitive key match).
    pub address: String,
    /// The service's private key, present unless the caller passed
    /// `DiscardPK` and tor honoured it.
    pub private_key: Option<String>,
    /// Echo of the port mappings that were requested.
    pub ports: Vec<PortMapping>,
}

fn parse_add_onion_reply(batch: &ReplyBatch, ports: Vec<PortMapping>) -> Result<HiddenServiceEntry> {
    let mut address = None;
    let mut private_key = None;
    for line in &batch.lines {
        let value = line.value();
        let Some((key, val)) = value.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "serviceid" => address = Some(val.to_string()),
            "privatekey" => private_key = Some(val.to_string()),
            _ => {}
        }
    }
    let address = address.ok_or_else(|| {
        Error::parse(
            Some("ADD_ONION".to_string()),
            "reply had no ServiceID= line",
        )
    })?;
    Ok(HiddenServiceEntry { address, private_key, ports })
}

/// `ADD_ONION NEW:<key_type>` (or `<key_type>:<base64key>` for an existing
/// key) `[Flags=...][MaxStreams=N] Port=virt,target ...`.
pub async fn add_onion(
    conn: &Connection,
    key_spec: &str,
    flags: &[&str],
    max_streams: Option<u32>,
    ports: &[PortMapping],
) -> Result<HiddenServiceEntry> {
    let cmd = Command::AddOnion {
        key_spec: key_spec.to_string(),
        flags: flags.iter().map(|s| s.to_string()).collect(),
        max_streams,
        ports: ports
            .iter()
            .map(|p| (p.virtual_port.clone(), p.target.clone()))
            .collect(),
    };
    let batch = conn.submit(cmd, CancelToken::never()).await?;
    parse_add_onion_reply(&batch, ports.to_vec())
}

/// `DEL_ONION <address>`.
pub async fn del_onion(conn: &Connection, address: &str) -> Result<()> {
    conn.submit(
        Command::DelOnion { address: address.to_string() },
        CancelToken::never(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ReplyLine, Sep};

    #[test]
    fn parses_new_key_reply() {
        let batch = ReplyBatch {
            status: "250".into(),
            lines: vec![
                ReplyLine {
                    status: "250".into(),
                    sep: Sep::Dash,
                    payload: "ServiceID=bxtow33uhscfu2xscwmha4quznly7ybfocm6i5uh35uyltddbj4yesyd".into(),
                    block: None,
                },
                ReplyLine {
                    status: "250".into(),
                    sep: Sep::Space,
                    payload: "OK".into(),
                    block: None,
                },
            ],
        };
        let ports = vec![PortMapping { virtual_port: "80".into(), target: "127.0.0.1:8080".into() }];
        let entry = parse_add_onion_reply(&batch, ports.clone()).unwrap();
        assert_eq!(entry.address, "bxtow33uhscfu2xscwmha4quznly7ybfocm6i5uh35uyltddbj4yesyd");
        assert_eq!(entry.private_key, None);
        assert_eq!(entry.ports, ports);
    }

    #[test]
    fn missing_service_id_is_parse_error() {
        let batch = ReplyBatch {
            status: "250".into(),
            lines: vec![ReplyLine {
                status: "250".into(),
                sep: Sep::Space,
                payload: "OK".into(),
                block: None,
            }],
        };
        let err = parse_add_onion_reply(&batch, vec![]).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
