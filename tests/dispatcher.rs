//! Coverage of the numbered testable properties from spec.md §8 that need
//! more than one command in flight: reply ordering, no wire interleaving,
//! shutdown completeness, and idempotent close.

use std::sync::Arc;

use tokio::io::{split, AsyncReadExt, AsyncWriteExt};

use tor_ctrl::cmd;
use tor_ctrl::connection::ConnectionBuilder;

fn pair() -> (
    Arc<tor_ctrl::Connection>,
    tokio::io::ReadHalf<tokio::io::DuplexStream>,
    tokio::io::WriteHalf<tokio::io::DuplexStream>,
) {
    let (client, server) = tokio::io::duplex(8192);
    let (client_read, client_write) = split(client);
    let conn = Arc::new(ConnectionBuilder::new().build(client_read, client_write));
    let (server_read, server_write) = split(server);
    (conn, server_read, server_write)
}

/// Property 1 + 2: concurrently submitted `GETINFO` calls are written to
/// the transport as a non-interleaved sequence, in submission order, and
/// their replies come back to the matching caller in that same order.
#[tokio::test]
async fn reply_ordering_and_no_interleaving() {
    let (conn, mut server_read, mut server_write) = pair();

    let mut handles = Vec::new();
    for i in 0..20 {
        let conn = conn.clone();
        handles.push(tokio::spawn(async move {
            cmd::getinfo::get_info(&conn, &[&format!("key{i}")]).await
        }));
        // Yield so each caller's write-gate acquisition (and hence its wire
        // write) tends to land before the next caller starts, matching the
        // "caller A's write completes before caller B's" ordering spec §4.3
        // describes; the assertions below hold regardless of scheduling
        // because the dispatcher itself serialises writes under one gate.
        tokio::task::yield_now().await;
    }

    // Read exactly 20 "GETINFO keyN\r\n" lines off the wire, in order, and
    // reply to each as it arrives — this is only possible if the wire
    // carries fully-formed, non-interleaved commands.
    let mut buf = Vec::new();
    let mut read_buf = [0u8; 256];
    for i in 0..20 {
        let want = format!("GETINFO key{i}\r\n");
        while buf.len() < want.len() {
            let n = server_read.read(&mut read_buf).await.unwrap();
            buf.extend_from_slice(&read_buf[..n]);
        }
        assert_eq!(String::from_utf8(buf[..want.len()].to_vec()).unwrap(), want);
        buf.drain(..want.len());
        server_write
            .write_all(format!("250 key{i}=value{i}\r\n").as_bytes())
            .await
            .unwrap();
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let map = handle.await.unwrap().unwrap();
        assert_eq!(map.get(&format!("key{i}")), Some(format!("value{i}").as_str()));
    }
}

/// Property 4: after the reader observes EOF, every waiter present at that
/// moment, and every waiter added thereafter, resolves with `ShutdownError`
/// exactly once.
#[tokio::test]
async fn shutdown_completeness() {
    let (conn, _server_read, server_write) = pair();

    let pending = {
        let conn = conn.clone();
        tokio::spawn(async move { cmd::getinfo::get_info(&conn, &["version"]).await })
    };
    // Give the write a chance to land (and the waiter to be queued) before
    // the transport closes under it.
    tokio::task::yield_now().await;
    drop(server_write);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, tor_ctrl::Error::Shutdown { .. }));

    // Wait for the reader to observe EOF and transition to Closed.
    for _ in 0..100 {
        if conn.state() == tor_ctrl::ConnectionState::Closed {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(conn.state(), tor_ctrl::ConnectionState::Closed);

    // A command submitted after Closed fails immediately.
    let err = cmd::getinfo::get_info(&conn, &["version"]).await.unwrap_err();
    assert!(matches!(err, tor_ctrl::Error::Shutdown { .. }));
}

/// Property 6: closing an already-closed connection is a no-op that fires
/// no additional disconnect callbacks.
#[tokio::test]
async fn idempotent_close() {
    let (conn, _server_read, server_write) = pair();

    let fire_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    {
        let fire_count = fire_count.clone();
        conn.on_disconnect(move || {
            fire_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
    }

    drop(server_write);
    conn.close().await.unwrap();
    conn.close().await.unwrap();
    conn.force_close();

    assert_eq!(fire_count.load(std::sync::atomic::Ordering::SeqCst), 1);
}
