//! `ONION_CLIENT_AUTH_ADD`/`_REMOVE`/`_VIEW` (spec §4.6).

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::Connection;
use crate::err::Result;
use crate::wire::ReplyBatch;

/// One client-authorization entry, as returned by `ONION_CLIENT_AUTH_VIEW`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientAuthEntry {
    /// The onion address this credential is scoped to.
    pub address: String,
    /// The client's private key (`x25519:...`).
    pub key_spec: String,
    /// `ClientName=` value, if tor reported one.
    pub client_name: Option<String>,
    /// Any other `Flags=...` entries on the line.
    pub flags: Vec<String>,
}

/// `ONION_CLIENT_AUTH_ADD <address> <key_spec> [ClientName=...] [Flags=...]`.
pub async fn add(
    conn: &Connection,
    address: &str,
    key_spec: &str,
    client_name: Option<&str>,
    flags: &[&str],
) -> Result<()> {
    conn.submit(
        Command::OnionClientAuthAdd {
            address: address.to_string(),
            key_spec: key_spec.to_string(),
            client_name: client_name.map(str::to_string),
            flags: flags.iter().map(|s| s.to_string()).collect(),
        },
        CancelToken::never(),
    )
    .await?;
    Ok(())
}

/// `ONION_CLIENT_AUTH_REMOVE <address>`.
pub async fn remove(conn: &Connection, address: &str) -> Result<()> {
    conn.submit(
        Command::OnionClientAuthRemove { address: address.to_string() },
        CancelToken::never(),
    )
    .await?;
    Ok(())
}

/// `ONION_CLIENT_AUTH_VIEW [<address>]`. Each `CLIENT <address> <key>
/// [ClientName=...] [Flags=...]` reply line becomes one [`ClientAuthEntry`];
/// the leading `ONION_CLIENT_AUTH_VIEW` framing line and the terminal `OK`
/// are skipped.
pub async fn view(conn: &Connection, address: Option<&str>) -> Result<Vec<ClientAuthEntry>> {
    let batch = conn
        .submit(
            Command::OnionClientAuthView { address: address.map(str::to_string) },
            CancelToken::never(),
        )
        .await?;
    Ok(parse(&batch))
}

fn parse(batch: &ReplyBatch) -> Vec<ClientAuthEntry> {
    let mut out = Vec::new();
    for line in &batch.lines {
        let value = line.value();
        let mut tokens = value.split_whitespace();
        if tokens.next() != Some("CLIENT") {
            continue;
        }
        let Some(address) = tokens.next() else { continue };
        let Some(key_spec) = tokens.next() else { continue };
        let mut client_name = None;
        let mut flags = Vec::new();
        for tok in tokens {
            if let Some(name) = tok.strip_prefix("ClientName=") {
                client_name = Some(name.to_string());
            } else if let Some(rest) = tok.strip_prefix("Flags=") {
                flags.extend(rest.split(',').map(str::to_string));
            }
        }
        out.push(ClientAuthEntry {
            address: address.to_string(),
            key_spec: key_spec.to_string(),
            client_name,
            flags,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ReplyLine, Sep};

    #[test]
    fn view_parses_client_name_and_flags() {
        let batch = ReplyBatch {
            status: "250".into(),
            lines: vec![
                ReplyLine {
                    status: "250".into(),
                    sep: Sep::Dash,
                    payload: "ONION_CLIENT_AUTH_VIEW".into(),
                    block: None,
                },
                ReplyLine {
                    status: "250".into(),
                    sep: Sep::Dash,
                    payload: "CLIENT abc x25519:AAAA ClientName=alice Flags=Permanent".into(),
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
        let entries = parse(&batch);
        assert_eq!(
            entries,
            vec![ClientAuthEntry {
                address: "abc".into(),
                key_spec: "x25519:AAAA".into(),
                client_name: Some("alice".into()),
                flags: vec!["Permanent".into()],
            }]
        );
    }

    #[test]
    fn view_skips_framing_lines() {
        let batch = ReplyBatch {
            status: "250".into(),
            lines: vec![ReplyLine {
                status: "250".into(),
                sep: Sep::Space,
                payload: "OK".into(),
                block: None,
            }],
        };
        assert!(parse(&batch).is_empty());
    }
}
