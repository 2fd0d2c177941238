//! `GETCONF`/`SETCONF`/`RESETCONF`/`LOADCONF`/`SAVECONF` (spec §4.6).

use crate::cancel::CancelToken;
use crate::cmd::Command;
use crate::connection::Connection;
use crate::err::Result;

/// Keys tor rejects if present in a runtime config payload (spec §6).
const RUNTIME_FORBIDDEN_KEYS: &[&str] = &["controlport", "controlportwritetofile"];

/// One `GETCONF` result line: a keyword and its value, if it had one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigEntry {
    /// The configuration keyword, e.g. `"SocksPort"`.
    pub key: String,
    /// `None` when the reply line carried no `=value` (spec §4.6, S2).
    pub value: Option<String>,
}

/// `GETCONF <keywords...>`.
pub async fn get_conf(conn: &Connection, keywords: &[&str]) -> Result<Vec<ConfigEntry>> {
    let batch = conn
        .submit(
            Command::GetConf {
                keywords: keywords.iter().map(|s| s.to_string()).collect(),
            },
            CancelToken::never(),
        )
        .await?;
    Ok(batch
        .lines
        .iter()
        .map(|line| {
            let value = line.value();
            // spec §4.6: "splits at the first `=`".
            match value.split_once('=') {
                Some((k, v)) => ConfigEntry {
                    key: k.to_string(),
                    value: Some(v.to_string()),
                },
                None => ConfigEntry {
                    key: value.to_string(),
                    value: None,
                },
            }
        })
        .collect())
}

fn is_runtime_forbidden(keyword: &str) -> bool {
    RUNTIME_FORBIDDEN_KEYS.contains(&keyword.to_ascii_lowercase().as_str())
}

/// `SETCONF keyword[=value] ...`. `ControlPort`/`ControlPortWriteToFile`
/// entries are silently dropped (spec §4.6/§6).
pub async fn set_conf(conn: &Connection, settings: &[(&str, Option<&str>)]) -> Result<()> {
    let settings = settings
        .iter()
        .filter(|(k, _)| !is_runtime_forbidden(k))
        .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
        .collect();
    conn.submit(Command::SetConf { settings }, CancelToken::never())
        .await?;
    Ok(())
}

/// `RESETCONF keyword[=value] ...`. Omitting the value resets the keyword
/// to its default (spec §1 "setDefault semantics").
pub async fn reset_conf(conn: &Connection, settings: &[(&str, Option<&str>)]) -> Result<()> {
    let settings = settings
        .iter()
        .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
        .collect();
    conn.submit(Command::ResetConf { settings }, CancelToken::never())
        .await?;
    Ok(())
}

/// `+LOADCONF`. Lines whose keyword is `ControlPort` or
/// `ControlPortWriteToFile` are stripped before sending, since tor rejects
/// them at runtime (spec §6).
pub async fn load_conf(conn: &Connection, text: &str) -> Result<()> {
    let filtered: String = text
        .lines()
        .filter(|line| {
            let keyword = line.split_whitespace().next().unwrap_or("");
            !is_runtime_forbidden(keyword)
        })
        .collect::<Vec<_>>()
        .join("\n");
    conn.submit(
        Command::LoadConf { text: filtered },
        CancelToken::never(),
    )
    .await?;
    Ok(())
}

/// `SAVECONF[ FORCE]`.
pub async fn save_conf(conn: &Connection, force: bool) -> Result<()> {
    conn.submit(Command::SaveConf { force }, CancelToken::never())
        .await?;
    Ok(())
}
