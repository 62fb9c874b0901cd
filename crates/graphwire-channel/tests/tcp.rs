//! Integration tests for the TCP transport.
//!
//! These spin up a real listener on the Tokio runtime and connect a
//! blocking client to verify that accepted peers come out as working
//! blocking channels.

use std::time::Duration;

use graphwire_channel::{Channel, ChannelError, SocketChannel, TcpTransport, Transport};

#[tokio::test]
async fn test_tcp_accept_and_exchange_bytes() {
    // "127.0.0.1:0" lets the OS pick a free port.
    let mut transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("bound address").to_string();

    // The client side is blocking, so it runs on a blocking thread.
    let client = tokio::task::spawn_blocking(move || {
        let mut client = SocketChannel::connect(&addr).expect("client should connect");
        client.write_all(b"ping").expect("client write");
        client.flush().expect("client flush");

        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).expect("client read");
        reply
    });

    let mut server = transport.accept().await.expect("should accept");

    let server = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).expect("server read");
        assert_eq!(&buf, b"ping");
        server.write_all(b"pong").expect("server write");
        server.flush().expect("server flush");
        server
    })
    .await
    .expect("server task");

    assert_eq!(&client.await.expect("client task"), b"pong");
    assert!(server.describe().contains("4 bytes in"));
}

#[tokio::test]
async fn test_shutdown_refuses_further_accepts() {
    let mut transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    transport.shutdown().await.expect("shutdown");
    assert!(transport.shutdown_handle().is_shut_down());

    let err = transport.accept().await.unwrap_err();
    assert!(matches!(err, ChannelError::ShutDown));
}

#[tokio::test]
async fn test_shutdown_wakes_pending_accept() {
    let mut transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let handle = transport.shutdown_handle();

    let pending = tokio::spawn(async move { transport.accept().await.map(|_| ()) });
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("accept should wake up")
        .expect("accept task");
    assert!(matches!(result, Err(ChannelError::ShutDown)));
}
