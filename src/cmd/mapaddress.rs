//! `MAPADDRESS` (spec §4.6).

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::Connection;
use crate::err::Result;
use crate::wire::ReplyBatch;

/// One `from=to` pair as confirmed by tor. Mapping an address to itself
/// removes any existing mapping for it (spec §4.6); that case comes back
/// through this same type with `from == to`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressMapping {
    pub from: String,
    pub to: String,
}

fn parse(batch: &ReplyBatch) -> Vec<AddressMapping> {
    batch
        .lines
        .iter()
        .filter_map(|line| {
            let value = line.value();
            value.split_once('=').map(|(from, to)| AddressMapping {
                from: from.to_string(),
                to: to.to_string(),
            })
        })
        .collect()
}

/// `MAPADDRESS <from>=<to> ...`. Pass the same address on both sides of a
/// pair to remove an existing mapping for it.
pub async fn map_address(
    conn: &Connection,
    mappings: &[(&str, &str)],
) -> Result<Vec<AddressMapping>> {
    let batch = conn
        .submit(
            Command::MapAddress {
                mappings: mappings
                    .iter()
                    .map(|(from, to)| (from.to_string(), to.to_string()))
                    .collect(),
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
    fn parses_confirmed_mappings() {
        let batch = ReplyBatch {
            status: "250".into(),
            lines: vec![ReplyLine {
                status: "250".into(),
                sep: Sep::Space,
                payload: "1.2.3.4=example.com".into(),
                block: None,
            }],
        };
        assert_eq!(
            parse(&batch),
            vec![AddressMapping { from: "1.2.3.4".into(), to: "example.com".into() }]
        );
    }

    #[test]
    fn self_mapping_signals_unmap() {
        let batch = ReplyBatch {
            status: "250".into(),
            lines: vec![ReplyLine {
                status: "250".into(),
                sep: Sep::Space,
                payload: "example.com=example.com".into(),
                block: None,
            }],
        };
        let mappings = parse(&batch);
        assert_eq!(mappings[0].from, mappings[0].to);
    }
}
