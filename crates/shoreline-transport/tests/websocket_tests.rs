//! Round-trip tests against a real bound socket.

use bytes::Bytes;
use shoreline_transport::{TransportEvent, TransportReceiver, TransportSender, TransportServer, WebSocketServer};

#[tokio::test]
async fn accept_exposes_the_request_path() {
    let mut server = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    let accept_task = tokio::spawn(async move { server.accept().await });

    let url = format!("ws://{}/exp1/7/alice", addr);
    let (client, _resp) = tokio_tungstenite::connect_async(url).await.unwrap();
    drop(client);

    let accepted = accept_task.await.unwrap().unwrap();
    assert_eq!(accepted.path, "/exp1/7/alice");
}

#[tokio::test]
async fn data_sent_by_server_arrives_at_client_and_vice_versa() {
    let mut server = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    let accept_task = tokio::spawn(async move { server.accept().await });

    let url = format!("ws://{}/session/7/bob", addr);
    let (mut client, _resp) = tokio_tungstenite::connect_async(url).await.unwrap();

    let mut accepted = accept_task.await.unwrap().unwrap();

    accepted.sender.send(Bytes::from_static(b"hello")).await.unwrap();

    use futures_util::StreamExt;
    let msg = client.next().await.unwrap().unwrap();
    assert_eq!(msg.into_data(), b"hello");

    use futures_util::SinkExt;
    client
        .send(tokio_tungstenite::tungstenite::Message::Binary(b"world".to_vec()))
        .await
        .unwrap();

    match accepted.receiver.recv().await {
        Some(TransportEvent::Data(bytes)) => assert_eq!(&bytes[..], b"world"),
        other => panic!("unexpected event: {:?}", other),
    }
}
