//! Integration tests for the datagram transport and its reliability
//! sublayer.
//!
//! A plain `tokio::net::UdpSocket` plays the client and exchanges
//! hand-built datagrams with a real welcome socket bound on localhost.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ipk24chat_protocol::{Codec, Content, DatagramCodec, Message, MessageId};
use ipk24chat_transport::{
    Connection, DatagramConnection, Handshake, ReliabilitySettings, Transport, TransportError,
    UdpTransport,
};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn fast_settings(max_retransmissions: u8) -> ReliabilitySettings {
    ReliabilitySettings {
        timeout: Duration::from_millis(50),
        max_retransmissions,
    }
}

fn auth_datagram(id: u16) -> Vec<u8> {
    let mut data = vec![0x02];
    data.extend_from_slice(&id.to_be_bytes());
    data.extend_from_slice(b"alice\0Alice\0secret\0");
    data
}

fn msg_datagram(id: u16, text: &str) -> Vec<u8> {
    let mut data = vec![0x04];
    data.extend_from_slice(&id.to_be_bytes());
    data.extend_from_slice(b"Alice\0");
    data.extend_from_slice(text.as_bytes());
    data.push(0);
    data
}

fn confirm_datagram(ref_id: u16) -> Vec<u8> {
    let mut data = vec![0x00];
    data.extend_from_slice(&ref_id.to_be_bytes());
    data
}

async fn recv_from(client: &UdpSocket) -> (Vec<u8>, SocketAddr) {
    let mut buf = vec![0u8; 2048];
    let (len, from) = timeout(WAIT, client.recv_from(&mut buf))
        .await
        .expect("datagram should arrive")
        .expect("recv should succeed");
    buf.truncate(len);
    (buf, from)
}

/// Binds a welcome socket and a client, and completes the AUTH handshake.
async fn handshake(
    settings: ReliabilitySettings,
) -> (UdpTransport, UdpSocket, Arc<DatagramConnection>, Message) {
    let mut transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), settings)
        .await
        .expect("should bind");
    let welcome = transport.local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&auth_datagram(1), welcome).await.unwrap();

    let Handshake { connection, first } = timeout(WAIT, transport.accept())
        .await
        .expect("accept should finish")
        .expect("handshake should succeed");

    let (confirm, from) = recv_from(&client).await;
    assert_eq!(from, welcome);
    assert_eq!(confirm, confirm_datagram(1));

    (transport, client, connection, first)
}

#[tokio::test]
async fn test_handshake_confirms_first_datagram_and_returns_it() {
    let (_transport, _client, connection, first) = handshake(fast_settings(1)).await;
    assert_eq!(first.id(), Some(MessageId(1)));
    assert_eq!(first.kind(), ipk24chat_protocol::MessageKind::Auth);
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_welcome_port_ignores_confirm_and_garbage() {
    let mut transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), fast_settings(1))
        .await
        .unwrap();
    let welcome = transport.local_addr().unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    client.send_to(&confirm_datagram(9), welcome).await.unwrap();
    client.send_to(&[0x42, 0, 0], welcome).await.unwrap();
    assert!(
        timeout(Duration::from_millis(200), transport.accept())
            .await
            .is_err(),
        "no session should be created"
    );
}

#[tokio::test]
async fn test_send_reply_completes_when_client_confirms() {
    let (transport, client, connection, _) = handshake(fast_settings(3)).await;

    let sender = Arc::clone(&connection);
    let send = tokio::spawn(async move {
        let content = Content::new("Authentication is successful. Welcome to the server!").unwrap();
        sender.send(Message::reply(true, MessageId(1), content)).await
    });
    let recv = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.recv().await }
    });

    let (data, from) = recv_from(&client).await;
    assert_ne!(from, transport.local_addr().unwrap(), "reply comes from the session port");
    let reply = DatagramCodec.decode(&data).unwrap();
    assert!(matches!(
        reply,
        Message::Reply { id: MessageId(0), result: true, ref_id: MessageId(1), .. }
    ));

    client.send_to(&confirm_datagram(0), from).await.unwrap();
    timeout(WAIT, send)
        .await
        .expect("send should finish")
        .unwrap()
        .expect("send should succeed");
    recv.abort();
}

#[tokio::test]
async fn test_send_without_confirm_retransmits_then_fails() {
    let (_transport, client, connection, _) = handshake(fast_settings(2)).await;

    let sender = Arc::clone(&connection);
    let send = tokio::spawn(async move {
        let content = Content::new("hello").unwrap();
        sender.send(Message::server_msg(content)).await
    });

    let mut copies = Vec::new();
    for _ in 0..3 {
        copies.push(recv_from(&client).await.0);
    }
    assert!(copies.windows(2).all(|w| w[0] == w[1]), "same id every attempt");

    let result = timeout(WAIT, send).await.unwrap().unwrap();
    assert!(matches!(
        result,
        Err(TransportError::Undeliverable { message_id: MessageId(0), attempts: 3 })
    ));
    assert!(connection.fault().is_cancelled());
    assert!(connection.is_closed());
}

#[tokio::test]
async fn test_bye_is_sent_once_without_waiting() {
    let (_transport, client, connection, _) = handshake(fast_settings(3)).await;

    timeout(WAIT, connection.send(Message::bye()))
        .await
        .expect("BYE must not wait for CONFIRM")
        .unwrap();
    let (data, _) = recv_from(&client).await;
    assert_eq!(data, vec![0xFF, 0, 0]);

    let mut buf = [0u8; 64];
    assert!(
        timeout(Duration::from_millis(200), client.recv_from(&mut buf))
            .await
            .is_err(),
        "BYE must not be retransmitted"
    );
}

#[tokio::test]
async fn test_duplicate_datagram_is_confirmed_but_delivered_once() {
    let (_transport, client, connection, _) = handshake(fast_settings(1)).await;
    let session_port = connection.local_addr().unwrap();
    let session_addr = SocketAddr::new("127.0.0.1".parse().unwrap(), session_port.port());

    client.send_to(&msg_datagram(5, "hi"), session_addr).await.unwrap();
    client.send_to(&msg_datagram(5, "hi"), session_addr).await.unwrap();
    client.send_to(&msg_datagram(6, "again"), session_addr).await.unwrap();

    let first = timeout(WAIT, connection.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.id(), Some(MessageId(5)));
    let second = timeout(WAIT, connection.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(second.id(), Some(MessageId(6)));

    for expected in [5u16, 5, 6] {
        let (data, _) = recv_from(&client).await;
        assert_eq!(data, confirm_datagram(expected));
    }
}

#[tokio::test]
async fn test_retransmitted_handshake_is_reconfirmed_not_reprocessed() {
    let (mut transport, client, connection, _) = handshake(fast_settings(1)).await;
    let welcome = transport.local_addr().unwrap();

    client.send_to(&auth_datagram(1), welcome).await.unwrap();
    assert!(
        timeout(Duration::from_millis(200), transport.accept())
            .await
            .is_err(),
        "a known endpoint must not open a second session"
    );
    let (confirm, from) = recv_from(&client).await;
    assert_eq!(from, welcome);
    assert_eq!(confirm, confirm_datagram(1));

    assert!(
        timeout(Duration::from_millis(200), connection.recv())
            .await
            .is_err(),
        "the forwarded copy is a duplicate"
    );
}

#[tokio::test]
async fn test_malformed_datagram_is_confirmed_and_reported() {
    let (_transport, client, connection, _) = handshake(fast_settings(1)).await;
    let session_addr = SocketAddr::new(
        "127.0.0.1".parse().unwrap(),
        connection.local_addr().unwrap().port(),
    );

    let mut bad = vec![0x04, 0, 7];
    bad.extend_from_slice(b"Bad Name\0hi\0");
    client.send_to(&bad, session_addr).await.unwrap();

    let decoded = timeout(WAIT, connection.recv()).await.unwrap().unwrap();
    assert!(decoded.is_err());
    let (data, _) = recv_from(&client).await;
    assert_eq!(data, confirm_datagram(7));
}

#[tokio::test]
async fn test_shorter_datagram_after_longer_decodes_cleanly() {
    let (_transport, client, connection, _) = handshake(fast_settings(1)).await;
    let session_addr = SocketAddr::new(
        "127.0.0.1".parse().unwrap(),
        connection.local_addr().unwrap().port(),
    );

    let long = "x".repeat(1400);
    client.send_to(&msg_datagram(2, &long), session_addr).await.unwrap();
    client.send_to(&msg_datagram(3, "hi"), session_addr).await.unwrap();

    let first = timeout(WAIT, connection.recv()).await.unwrap().unwrap().unwrap();
    let second = timeout(WAIT, connection.recv()).await.unwrap().unwrap().unwrap();
    assert!(matches!(first, Message::Msg { ref content, .. } if content.as_str() == long));
    assert!(matches!(second, Message::Msg { ref content, .. } if content.as_str() == "hi"));
}
