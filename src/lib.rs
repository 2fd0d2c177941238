//! A client library for the Tor control protocol.
//!
//! This crate drives a locally-running `tor` process over its line-oriented
//! control protocol: authenticate, read and write configuration, add and
//! remove onion services and their client-authorization keys, subscribe to
//! asynchronous events, send signals, and observe the daemon's bootstrap
//! lifecycle.
//!
//! The crate is organised the way its protocol layers stack:
//!
//! - [`wire`] reads physical lines off the transport and assembles them into
//!   logical reply batches (or encodes outgoing commands into wire bytes).
//! - [`router`] classifies an assembled batch as a command reply or an
//!   asynchronous event.
//! - [`dispatcher`] serialises outbound commands and correlates each with
//!   its reply, one at a time, in FIFO order.
//! - [`events`] maintains the set of subscribed event kinds and decodes and
//!   delivers asynchronous batches to their listeners.
//! - [`connection`] owns the transport and the reader task, and defines the
//!   `Connecting -> Ready -> Closing -> Closed` lifecycle.
//! - [`cmd`] is the typed command surface: one request builder and reply
//!   parser per control-protocol command.
//! - [`mgr`] is the higher-level manager: mutually exclusive Start/Stop/
//!   Restart actions against a held connection, plus the state derived from
//!   watching its events (bootstrap percent, network-enabled flag, listener
//!   addresses).
//!
//! Process spawning, config-file rendering, connectivity probing and
//! address/key formatting are all external collaborators ([`collab`]) that
//! a host program supplies; this crate does not implement the tor daemon,
//! relay or circuit logic, SOCKS, or onion cryptography.
//!
//! ```no_run
//! use tor_ctrl::cmd;
//! use tor_ctrl::connection::ConnectionBuilder;
//! use tor_ctrl::transport::connect_tcp;
//!
//! # async fn run() -> tor_ctrl::err::Result<()> {
//! let (reader, writer) = connect_tcp(("127.0.0.1", 9051)).await.unwrap();
//! let conn = ConnectionBuilder::new().build(reader, writer);
//! cmd::authenticate::authenticate(&conn, b"").await?;
//! let info = cmd::getinfo::get_info(&conn, &["version"]).await?;
//! println!("tor version: {:?}", info.get("version"));
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod cmd;
pub mod collab;
pub mod config;
pub mod connection;
pub mod err;
pub mod events;
pub mod interceptor;
pub mod mgr;
pub mod transport;
pub mod wire;

mod dispatcher;
mod router;

pub use connection::{Connection, ConnectionBuilder, ConnectionState};
pub use err::{Error, ErrorKind, Result};
pub use mgr::TorManager;
