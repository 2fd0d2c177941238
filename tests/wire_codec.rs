//! Black-box coverage of the S1-S6 scenarios from spec.md §8, driven over
//! an in-memory `tokio::io::duplex` transport rather than a real `tor`.

use tokio::io::{split, AsyncReadExt, AsyncWriteExt};

use tor_ctrl::cmd;
use tor_ctrl::connection::ConnectionBuilder;

async fn connected_pair() -> (
    tor_ctrl::Connection,
    tokio::io::ReadHalf<tokio::io::DuplexStream>,
    tokio::io::WriteHalf<tokio::io::DuplexStream>,
) {
    let (client, server) = tokio::io::duplex(4096);
    let (client_read, client_write) = split(client);
    let conn = ConnectionBuilder::new().build(client_read, client_write);
    let (server_read, server_write) = split(server);
    (conn, server_read, server_write)
}

async fn expect_on_server(server_read: &mut tokio::io::ReadHalf<tokio::io::DuplexStream>, want: &str) {
    let mut buf = vec![0u8; want.len().max(1)];
    let mut got = Vec::new();
    while got.len() < want.len() {
        let n = server_read.read(&mut buf).await.unwrap();
        assert!(n > 0, "server side closed early, expected {want:?}");
        got.extend_from_slice(&buf[..n]);
    }
    assert_eq!(String::from_utf8(got).unwrap(), want);
}

/// S1. Cookie authentication.
#[tokio::test]
async fn s1_cookie_authentication() {
    let (conn, mut server_read, mut server_write) = connected_pair().await;

    let auth = tokio::spawn({
        let token = b"Hello\nWorld\n!\n".to_vec();
        async move { cmd::authenticate::authenticate(&conn, &token).await.map(|_| conn) }
    });

    expect_on_server(&mut server_read, "AUTHENTICATE 48656c6c6f0a576f726c640a210a\r\n").await;
    server_write.write_all(b"250 OK\r\n").await.unwrap();

    let conn = auth.await.unwrap().unwrap();
    assert_eq!(conn.state(), tor_ctrl::ConnectionState::Ready);
}

/// S2. GETCONF with a missing value.
#[tokio::test]
async fn s2_getconf_missing_value() {
    let (conn, mut server_read, mut server_write) = connected_pair().await;

    let call = tokio::spawn(async move { cmd::conf::get_conf(&conn, &["SocksPort", "ORPort"]).await });

    expect_on_server(&mut server_read, "GETCONF SocksPort ORPort\r\n").await;
    server_write
        .write_all(b"250-SocksPort=9050\r\n250 ORPort\r\n")
        .await
        .unwrap();

    let entries = call.await.unwrap().unwrap();
    assert_eq!(entries[0].key, "SocksPort");
    assert_eq!(entries[0].value.as_deref(), Some("9050"));
    assert_eq!(entries[1].key, "ORPort");
    assert_eq!(entries[1].value, None);
}

/// S3. Multi-line event — CONF_CHANGED.
#[tokio::test]
async fn s3_conf_changed_event() {
    let (conn, _server_read, mut server_write) = connected_pair().await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    conn.events().subscribe(
        "CONF_CHANGED",
        std::sync::Arc::new(move |event: &tor_ctrl::events::DecodedEvent| {
            if let tor_ctrl::events::EventPayload::Lines(lines) = &event.payload {
                let _ = tx.send(lines.clone());
            }
            Ok(())
        }),
    );

    server_write
        .write_all(b"650-CONF_CHANGED\r\n650-SocksPort=9055\r\n650-DNSPort=1080\r\n650 OK\r\n")
        .await
        .unwrap();

    let lines = rx.recv().await.unwrap();
    assert_eq!(lines, vec!["SocksPort=9055".to_string(), "DNSPort=1080".to_string()]);
}

/// S4. ADD_ONION with a newly generated key.
#[tokio::test]
async fn s4_add_onion_new_key() {
    let (conn, mut server_read, mut server_write) = connected_pair().await;

    let ports = vec![cmd::onion::PortMapping {
        virtual_port: "80".into(),
        target: "127.0.0.1:8080".into(),
    }];
    let call = tokio::spawn(async move {
        cmd::onion::add_onion(&conn, "NEW:ED25519-V3", &["DiscardPK"], None, &ports).await
    });

    expect_on_server(
        &mut server_read,
        "ADD_ONION NEW:ED25519-V3 Flags=DiscardPK Port=80,127.0.0.1:8080\r\n",
    )
    .await;
    server_write
        .write_all(
            b"250-ServiceID=bxtow33uhscfu2xscwmha4quznly7ybfocm6i5uh35uyltddbj4yesyd\r\n250 OK\r\n",
        )
        .await
        .unwrap();

    let entry = call.await.unwrap().unwrap();
    assert_eq!(
        entry.address,
        "bxtow33uhscfu2xscwmha4quznly7ybfocm6i5uh35uyltddbj4yesyd"
    );
    assert_eq!(entry.private_key, None);
}

/// S5. Graceful shutdown observes the server closing before replying;
/// this still counts as success, and every later command fails shut down.
#[tokio::test]
async fn s5_shutdown_then_forced_fallback() {
    let (conn, _server_read, server_write) = connected_pair().await;

    drop(server_write);
    conn.close().await.unwrap();

    let err = cmd::getinfo::get_info(&conn, &["version"]).await.unwrap_err();
    assert!(matches!(err, tor_ctrl::Error::Shutdown { .. }));
}

/// S6. LOADCONF with a dot-stuffed comment line.
#[tokio::test]
async fn s6_loadconf_dot_stuffing() {
    let (conn, mut server_read, mut server_write) = connected_pair().await;

    let call = tokio::spawn(async move {
        cmd::conf::load_conf(&conn, "SocksPort 9050\n.leading-dot-comment").await
    });

    expect_on_server(
        &mut server_read,
        "+LOADCONF\r\nSocksPort 9050\r\n..leading-dot-comment\r\n.\r\n",
    )
    .await;
    server_write.write_all(b"250 OK\r\n").await.unwrap();

    call.await.unwrap().unwrap();
}
