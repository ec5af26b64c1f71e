//! Integration tests for the stream transport.
//!
//! These tests spin up a real TCP listener and a raw client socket to
//! verify that lines are framed, decoded and encoded correctly across
//! actual network reads and writes.

use std::time::Duration;

use ipk24chat_protocol::{Content, Message, MessageKind};
use ipk24chat_transport::{Connection, TcpTransport, Transport, TransportKind};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

async fn connected() -> (
    std::sync::Arc<ipk24chat_transport::StreamConnection>,
    ipk24chat_transport::StreamReader,
    TcpStream,
) {
    let mut transport = TcpTransport::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("should bind");
    let addr = transport.local_addr().unwrap();

    let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });
    let client = TcpStream::connect(addr).await.expect("client should connect");
    let (connection, reader) = server.await.expect("task should complete");
    (connection, reader, client)
}

#[tokio::test]
async fn test_stream_accept_reports_peer_and_kind() {
    let (connection, reader, client) = connected().await;
    assert_eq!(connection.peer_addr(), client.local_addr().unwrap());
    assert_eq!(reader.peer_addr(), client.local_addr().unwrap());
    assert_eq!(connection.kind(), TransportKind::Stream);
    assert!(connection.id().into_inner() > 0);
}

#[tokio::test]
async fn test_stream_recv_decodes_lines_sent_in_one_write() {
    let (_connection, mut reader, mut client) = connected().await;

    client
        .write_all(b"AUTH alice AS Alice USING secret\r\nJOIN dev AS Alice\r\n")
        .await
        .unwrap();

    let auth = timeout(WAIT, reader.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(auth.unwrap().kind(), MessageKind::Auth);
    let join = timeout(WAIT, reader.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(join.unwrap().kind(), MessageKind::Join);
}

#[tokio::test]
async fn test_stream_recv_reassembles_split_line() {
    let (_connection, mut reader, mut client) = connected().await;

    client.write_all(b"MSG FROM Alice IS hel").await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.write_all(b"lo there\r\n").await.unwrap();

    let msg = timeout(WAIT, reader.recv()).await.unwrap().unwrap().unwrap();
    match msg.unwrap() {
        Message::Msg { content, .. } => assert_eq!(content, "hello there"),
        other => panic!("expected Msg, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_recv_reports_format_error_as_item() {
    let (_connection, mut reader, mut client) = connected().await;

    client.write_all(b"HELLO server\r\n").await.unwrap();
    let item = timeout(WAIT, reader.recv()).await.unwrap().unwrap().unwrap();
    assert!(item.is_err());
}

#[tokio::test]
async fn test_stream_recv_reports_overlong_line_as_format_error() {
    let (_connection, mut reader, mut client) = connected().await;

    let long = format!("MSG FROM Alice IS {}\r\n", "x".repeat(3000));
    client.write_all(long.as_bytes()).await.unwrap();
    let item = timeout(WAIT, reader.recv()).await.unwrap().unwrap().unwrap();
    assert!(item.is_err());
}

#[tokio::test]
async fn test_stream_recv_returns_none_when_client_closes() {
    let (_connection, mut reader, client) = connected().await;
    drop(client);
    let item = timeout(WAIT, reader.recv()).await.unwrap().unwrap();
    assert!(item.is_none());
}

#[tokio::test]
async fn test_stream_send_writes_crlf_line() {
    let (connection, _reader, client) = connected().await;

    let content = Content::new("You are already on this channel").unwrap();
    connection
        .send(Message::reply(false, Default::default(), content))
        .await
        .expect("send should succeed");

    let mut lines = BufReader::new(client).lines();
    let line = timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
    assert_eq!(line.as_deref(), Some("REPLY NOK IS You are already on this channel"));
}

#[tokio::test]
async fn test_stream_close_ends_client_read_and_rejects_sends() {
    let (connection, _reader, mut client) = connected().await;

    connection.send(Message::bye()).await.unwrap();
    connection.close().await.unwrap();

    let mut received = Vec::new();
    timeout(WAIT, client.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"BYE\r\n");
    assert!(connection.send(Message::bye()).await.is_err());
}
