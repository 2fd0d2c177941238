//! Transport openers (spec §6): the core itself only consumes an opaque
//! `AsyncRead`/`AsyncWrite` pair, handed to
//! [`ConnectionBuilder::build`](crate::connection::ConnectionBuilder::build).
//! This module supplies the two standard ways of getting one. The "explicit
//! close handle" spec §6 mentions is the [`Connection`](crate::connection::Connection)
//! itself: `close()`/`force_close()` own teardown of whatever transport was
//! handed in, so there is no separate handle type here.

use std::path::Path;

use tokio::io::{split, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use tokio::net::UnixStream;

/// One half of a split transport, generic over the underlying stream type.
pub type Reader<T> = ReadHalf<T>;
/// The other half.
pub type Writer<T> = WriteHalf<T>;

/// Open a TCP control-port connection (spec §6 "TCP to `host:port` on
/// localhost"), splitting it into independent read/write halves.
pub async fn connect_tcp(
    addr: impl ToSocketAddrs,
) -> std::io::Result<(Reader<TcpStream>, Writer<TcpStream>)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(split(stream))
}

/// Open a Unix-domain-socket control connection (spec §6), splitting it
/// into independent read/write halves.
#[cfg(unix)]
pub async fn connect_unix(
    path: impl AsRef<Path>,
) -> std::io::Result<(Reader<UnixStream>, Writer<UnixStream>)> {
    let stream = UnixStream::connect(path).await?;
    Ok(split(stream))
}
