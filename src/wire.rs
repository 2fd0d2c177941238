//! The wire codec (spec §4.1): physical-line reading, logical-reply
//! assembly (single-line / multi-reply / `+` data-block), and the write
//! side's command encoding.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::err::{Error, Result};

/// The separator character that follows a reply's three-digit status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sep {
    /// `-`: another line in this batch follows.
    Dash,
    /// `+`: a data block follows, then another line in this batch.
    Plus,
    /// ` `: this is the last line of the batch.
    Space,
}

impl Sep {
    fn from_byte(b: u8) -> Option<Sep> {
        match b {
            b'-' => Some(Sep::Dash),
            b'+' => Some(Sep::Plus),
            b' ' => Some(Sep::Space),
            _ => None,
        }
    }
}

/// A single parsed reply line (spec §3 "Reply line").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyLine {
    /// Three-ASCII-digit status code, e.g. `"250"`.
    pub status: String,
    /// The separator that introduced this line.
    pub sep: Sep,
    /// The text on the physical reply line itself (after `status` and
    /// `sep`). For a `+` line this is the line's own header text (e.g. a
    /// `GETINFO` keyword, or an event name) — the block body lives in
    /// [`ReplyLine::block`], not here.
    pub payload: String,
    /// Present only when `sep == Sep::Plus`: the data block that follows,
    /// dot-stuffing undone and interior lines joined by `\n`.
    pub block: Option<String>,
}

impl ReplyLine {
    /// `block` if present, else `payload` — convenient when a caller
    /// doesn't care whether the value came from a plain line or a block.
    pub fn value(&self) -> &str {
        self.block.as_deref().unwrap_or(&self.payload)
    }
}

/// An assembled, non-empty sequence of reply lines sharing one status code
/// (spec §3 "Reply batch").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyBatch {
    /// The status shared by every line in the batch.
    pub status: String,
    /// The lines, in wire order. The last one always has `sep == Sep::Space`.
    pub lines: Vec<ReplyLine>,
}

impl ReplyBatch {
    /// Does every line's status start with `25` (command success per spec §4.3)?
    pub fn is_success(&self) -> bool {
        self.status.starts_with("25")
    }

    /// Is this an asynchronous event batch (status starts with `6`)?
    pub fn is_event(&self) -> bool {
        self.status.starts_with('6')
    }

    /// The payload of the final (space-separated) line.
    pub fn final_payload(&self) -> &str {
        self.lines
            .last()
            .map(|l| l.payload.as_str())
            .unwrap_or_default()
    }

    /// All non-final lines' [`ReplyLine::value`]s, in wire order — the
    /// "deliver as a list" shape spec §4.4 describes for events like
    /// `CONF_CHANGED`.
    pub fn leading_values(&self) -> Vec<&str> {
        self.lines[..self.lines.len().saturating_sub(1)]
            .iter()
            .map(ReplyLine::value)
            .collect()
    }
}

/// Strip a trailing `\r\n` or bare `\n` from a line read by `read_line`.
fn strip_eol(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}

/// Read one physical line (CRLF-terminated, bare LF tolerated) from `reader`.
///
/// Returns `Ok(None)` on clean end-of-stream with nothing pending.
async fn read_physical_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(|e| Error::parse(None::<String>, format!("transport read failed: {e}")))?;
    if n == 0 {
        return Ok(None);
    }
    strip_eol(&mut line);
    Ok(Some(line))
}

/// Parse one physical line into `(status, sep, payload)`, per spec §4.1.
fn split_line(line: &str) -> Result<(String, Sep, &str)> {
    if line.len() < 4 {
        return Err(Error::parse(
            None::<String>,
            format!("reply line too short: {line:?}"),
        ));
    }
    let bytes = line.as_bytes();
    if !bytes[0..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::parse(
            None::<String>,
            format!("reply line does not start with a 3-digit status: {line:?}"),
        ));
    }
    let status = line[0..3].to_string();
    let sep = Sep::from_byte(bytes[3])
        .ok_or_else(|| Error::parse(None::<String>, format!("unknown separator in {line:?}")))?;
    Ok((status, sep, &line[4..]))
}

/// Read a data block (the lines following a `+` reply line) up to and
/// including its `.` terminator, undoing dot-stuffing on the way.
async fn read_data_block<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut body_lines = Vec::new();
    loop {
        let line = read_physical_line(reader)
            .await?
            .ok_or_else(|| Error::parse(None::<String>, "eof inside data block"))?;
        if line == "." {
            break;
        }
        let unstuffed = if let Some(rest) = line.strip_prefix('.') {
            rest
        } else {
            line.as_str()
        };
        body_lines.push(unstuffed.to_string());
    }
    Ok(body_lines.join("\n"))
}

/// Read one complete [`ReplyBatch`] from `reader` (spec §4.1 batching rule).
pub async fn read_batch<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<ReplyBatch>> {
    let mut lines = Vec::new();
    let mut batch_status: Option<String> = None;

    loop {
        let Some(raw) = read_physical_line(reader).await? else {
            if lines.is_empty() {
                return Ok(None);
            }
            return Err(Error::parse(None::<String>, "eof mid-batch"));
        };
        let (status, sep, payload) = split_line(&raw)?;

        if let Some(expected) = &batch_status {
            if expected != &status {
                return Err(Error::parse(
                    None::<String>,
                    format!("status changed mid-batch: {expected} -> {status}"),
                ));
            }
        } else {
            batch_status = Some(status.clone());
        }

        let block = if sep == Sep::Plus {
            Some(read_data_block(reader).await?)
        } else {
            None
        };

        let is_last = sep == Sep::Space;
        lines.push(ReplyLine {
            status: status.clone(),
            sep,
            payload: payload.to_string(),
            block,
        });

        if is_last {
            break;
        }
    }

    Ok(Some(ReplyBatch {
        status: batch_status.expect("at least one line was read"),
        lines,
    }))
}

/// A pre-encoded outbound command (spec §3 "Command"): either a single
/// CRLF-terminated line, or a `+`-prefixed data-block command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedCommand {
    /// The exact bytes to write to the transport, already CRLF-terminated.
    pub bytes: Vec<u8>,
    /// A human-readable rendering, used only for error messages and logs.
    /// Never includes secrets (e.g. the AUTHENTICATE cookie is redacted).
    pub display: String,
}

/// Join keyword/argument tokens with single spaces and a trailing CRLF.
pub fn encode_single_line(tokens: &[&str]) -> EncodedCommand {
    let display = tokens.join(" ");
    let mut bytes = Vec::with_capacity(display.len() + 2);
    bytes.extend_from_slice(display.as_bytes());
    bytes.extend_from_slice(b"\r\n");
    EncodedCommand { bytes, display }
}

/// Encode a `+<keyword>` multi-line command: the keyword line, the body
/// (split on `\n`, each line beginning with `.` doubled), the `.`
/// terminator, all CRLF-separated (spec §4.1 write side).
pub fn encode_data_command(keyword: &str, body: &str) -> EncodedCommand {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"+");
    bytes.extend_from_slice(keyword.as_bytes());
    bytes.extend_from_slice(b"\r\n");
    for line in body.split('\n') {
        if let Some(rest) = line.strip_prefix('.') {
            bytes.push(b'.');
            bytes.push(b'.');
            bytes.extend_from_slice(rest.as_bytes());
        } else {
            bytes.extend_from_slice(line.as_bytes());
        }
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(b".\r\n");
    EncodedCommand {
        bytes,
        display: format!("+{keyword} <{} bytes>", body.len()),
    }
}

/// Write an already-encoded command to `writer` as a single atomic
/// write+flush (spec §4.1 "writes are atomic per command").
pub async fn write_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    cmd: &EncodedCommand,
) -> Result<()> {
    writer
        .write_all(&cmd.bytes)
        .await
        .map_err(|e| Error::shutdown(Some(format!("write failed: {e}"))))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::shutdown(Some(format!("flush failed: {e}"))))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn reader_for(wire: &str) -> BufReader<Cursor<Vec<u8>>> {
        BufReader::new(Cursor::new(wire.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn single_line_reply() {
        let mut r = reader_for("250 OK\r\n");
        let batch = read_batch(&mut r).await.unwrap().unwrap();
        assert_eq!(batch.status, "250");
        assert!(batch.is_success());
        assert_eq!(batch.lines.len(), 1);
        assert_eq!(batch.final_payload(), "OK");
    }

    #[tokio::test]
    async fn multi_reply_getconf() {
        let mut r = reader_for("250-SocksPort=9050\r\n250 ORPort\r\n");
        let batch = read_batch(&mut r).await.unwrap().unwrap();
        assert_eq!(batch.lines.len(), 2);
        assert_eq!(batch.lines[0].payload, "SocksPort=9050");
        assert_eq!(batch.lines[1].payload, "ORPort");
    }

    #[tokio::test]
    async fn data_block_with_dot_stuffing() {
        let mut r = reader_for("250+info=\r\nhello\r\n..leading-dot\r\n.\r\n250 OK\r\n");
        let batch = read_batch(&mut r).await.unwrap().unwrap();
        assert_eq!(batch.lines[0].payload, "info=");
        assert_eq!(batch.lines[0].block.as_deref(), Some("hello\n.leading-dot"));
        assert_eq!(batch.lines[1].payload, "OK");
    }

    #[tokio::test]
    async fn mixed_status_mid_batch_is_protocol_error() {
        let mut r = reader_for("250-a\r\n251 b\r\n");
        let err = read_batch(&mut r).await.unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[tokio::test]
    async fn too_short_line_errors() {
        let mut r = reader_for("25\r\n");
        let err = read_batch(&mut r).await.unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[tokio::test]
    async fn bare_lf_tolerated() {
        let mut r = reader_for("250 OK\n");
        let batch = read_batch(&mut r).await.unwrap().unwrap();
        assert_eq!(batch.final_payload(), "OK");
    }

    #[test]
    fn dot_stuffing_roundtrip() {
        let body = "SocksPort 9050\n.leading-dot-comment";
        let cmd = encode_data_command("LOADCONF", body);
        let text = String::from_utf8(cmd.bytes).unwrap();
        assert_eq!(text, "+LOADCONF\r\nSocksPort 9050\r\n..leading-dot-comment\r\n.\r\n");
    }
}
