//! `GETINFO` (spec §4.6): returns an ordered `key -> value` map; a
//! terminal `OK` framing line is dropped, and multi-line (data-block)
//! values are preserved verbatim.

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::Connection;
use crate::err::Result;
use crate::wire::ReplyBatch;

/// An ordered `key -> value` map, insertion order preserved (spec §4.6).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoMap(Vec<(String, String)>);

impl InfoMap {
    /// Look up a key's value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Iterate `(key, value)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse(batch: &ReplyBatch) -> InfoMap {
    let mut entries = Vec::new();
    for (i, line) in batch.lines.iter().enumerate() {
        let is_last = i + 1 == batch.lines.len();
        if is_last && line.block.is_none() && line.payload == "OK" {
            // Terminal framing line, not a value (spec §4.6).
            continue;
        }
        let (key, value) = match &line.block {
            Some(block) => (line.payload.trim_end_matches('=').to_string(), block.clone()),
            None => match line.payload.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => continue,
            },
        };
        entries.push((key, value));
    }
    InfoMap(entries)
}

/// `GETINFO <keywords...>`.
pub async fn get_info(conn: &Connection, keywords: &[&str]) -> Result<InfoMap> {
    let batch = conn
        .submit(
            Command::GetInfo {
                keywords: keywords.iter().map(|s| s.to_string()).collect(),
            },
            CancelToken::never(),
        )
        .await?;
    Ok(parse(&batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ReplyLine, Sep};

    #[test]
    fn drops_terminal_ok_and_keeps_data_block_value() {
        let batch = ReplyBatch {
            status: "250".into(),
            lines: vec![
                ReplyLine {
                    status: "250".into(),
                    sep: Sep::Dash,
                    payload: "version=0.4.8.0".into(),
                    block: None,
                },
                ReplyLine {
                    status: "250".into(),
                    sep: Sep::Plus,
                    payload: "config-text=".into(),
                    block: Some("SocksPort 9050\nORPort 9001".into()),
                },
                ReplyLine {
                    status: "250".into(),
                    sep: Sep::Space,
                    payload: "OK".into(),
                    block: None,
                },
            ],
        };
        let map = parse(&batch);
        assert_eq!(map.get("version"), Some("0.4.8.0"));
        assert_eq!(map.get("config-text"), Some("SocksPort 9050\nORPort 9001"));
        assert_eq!(map.len(), 2);
    }
}
