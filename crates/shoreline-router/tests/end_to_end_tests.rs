//! End-to-end scenarios against a real `Router` event loop, an in-memory
//! store, and an in-process fake transport (no sockets needed).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use shoreline_core::Msg;
use shoreline_router::accept::run_connection;
use shoreline_router::{Router, RouterHandle};
use shoreline_store::{MemoryStore, SessionStore};
use shoreline_transport::{Accepted, TransportEvent, TransportReceiver, TransportSender};

struct FakeSender {
    tx: mpsc::Sender<Vec<u8>>,
}

#[async_trait]
impl TransportSender for FakeSender {
    async fn send(&self, data: bytes::Bytes) -> shoreline_transport::Result<()> {
        self.tx
            .send(data.to_vec())
            .await
            .map_err(|_| shoreline_transport::TransportError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

struct FakeReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for FakeReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Connects a fake client at `path`, returning the outbound frames it
/// receives (`outbound`) and a way to post inbound frames (`inbound`).
fn connect(
    path: &str,
    router: RouterHandle,
) -> (mpsc::Receiver<Vec<u8>>, mpsc::Sender<TransportEvent>) {
    let (out_tx, out_rx) = mpsc::channel(64);
    let (in_tx, in_rx) = mpsc::channel(64);

    let accepted = Accepted {
        sender: FakeSender { tx: out_tx },
        receiver: FakeReceiver { rx: in_rx },
        addr: "127.0.0.1:0".parse().unwrap(),
        path: path.to_string(),
    };

    tokio::spawn(run_connection(accepted, router));

    (out_rx, in_tx)
}

async fn send_frame(inbound: &mpsc::Sender<TransportEvent>, msg: &Msg) {
    let bytes = shoreline_core::codec::encode(msg).unwrap();
    inbound
        .send(TransportEvent::Data(bytes::Bytes::from(bytes)))
        .await
        .unwrap();
}

async fn recv_decoded(outbound: &mut mpsc::Receiver<Vec<u8>>) -> Msg {
    let bytes = tokio::time::timeout(std::time::Duration::from_millis(200), outbound.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("channel closed");
    shoreline_core::codec::decode(&bytes).unwrap()
}

async fn nothing_arrives(outbound: &mut mpsc::Receiver<Vec<u8>>) -> bool {
    tokio::time::timeout(std::time::Duration::from_millis(50), outbound.recv())
        .await
        .is_err()
}

fn state_update(instance: &str, session: i64, nonce: &str, sender: &str, period: i64, key: &str, value: i64) -> Msg {
    Msg {
        instance: instance.into(),
        session,
        nonce: nonce.into(),
        sender: sender.into(),
        period,
        group: 0,
        state_update: true,
        time: 0,
        client_time: 0,
        key: key.into(),
        value: serde_json::json!(value),
    }
}

async fn boot() -> RouterHandle {
    let store = Arc::new(SessionStore::new(Arc::new(MemoryStore::new())));
    let (router, handle) = Router::new(store).await.unwrap();
    tokio::spawn(router.run());
    handle
}

#[tokio::test]
async fn state_update_dedup_on_replay() {
    let handle = boot().await;

    // alice connects first and establishes the session's nonce.
    let (mut alice_out, _alice_in) = connect("/x/7/alice", handle.clone());
    let register = recv_decoded(&mut alice_out).await;
    assert_eq!(register.key, "__register__");
    let nonce = register.nonce.clone();

    let mut first = state_update("x", 7, &nonce, "alice", 1, "score", 1);
    first.sender = "alice".into();
    let mut second = state_update("x", 7, &nonce, "alice", 1, "score", 2);
    second.sender = "alice".into();

    handle.send_message(first).await.unwrap();
    handle.send_message(second).await.unwrap();

    // drain alice's own live view of both updates before bob connects.
    let live_first = recv_decoded(&mut alice_out).await;
    assert_eq!(live_first.value, serde_json::json!(1));
    let live_second = recv_decoded(&mut alice_out).await;
    assert_eq!(live_second.value, serde_json::json!(2));

    // bob connects afterward and syncs the whole log: alice's __register__,
    // then only the latest score (the stale value is filtered by the
    // IdenticalTo check), then bob's own __register__ (persisted before his
    // listener was registered, since Subject() runs ahead of that).
    let (mut bob_out, _bob_in) = connect("/x/7/bob", handle.clone());

    let alices_register = recv_decoded(&mut bob_out).await;
    assert_eq!(alices_register.key, "__register__");

    let replayed = recv_decoded(&mut bob_out).await;
    assert_eq!(replayed.key, "score");
    assert_eq!(replayed.value, serde_json::json!(2));

    let bobs_own_register = recv_decoded(&mut bob_out).await;
    assert_eq!(bobs_own_register.key, "__register__");
    assert_eq!(bobs_own_register.sender, "bob");
}

#[tokio::test]
async fn admin_sees_every_period_and_control_message() {
    let handle = boot().await;

    let (mut alice_out, alice_in) = connect("/x/9/alice", handle.clone());
    let register = recv_decoded(&mut alice_out).await;
    let nonce = register.nonce.clone();

    for period in 0..3 {
        let mut msg = state_update("x", 9, &nonce, "alice", period, "score", period);
        msg.sender = format!("alice-{period}");
        send_frame(&alice_in, &msg).await;
        let _ = recv_decoded(&mut alice_out).await;
    }

    let (mut admin_out, _admin_in) = connect("/x/9/admin", handle.clone());

    let mut seen_keys = Vec::new();
    for _ in 0..4 {
        seen_keys.push(recv_decoded(&mut admin_out).await.key);
    }
    assert!(seen_keys.contains(&"__register__".to_string()));
    assert_eq!(seen_keys.iter().filter(|k| *k == "score").count(), 3);
}

#[tokio::test]
async fn reset_replays_config_under_a_new_nonce() {
    let handle = boot().await;

    let (mut alice_out, alice_in) = connect("/x/11/alice", handle.clone());
    let register = recv_decoded(&mut alice_out).await;
    let nonce = register.nonce.clone();

    let config = Msg {
        instance: "x".into(),
        session: 11,
        nonce: nonce.clone(),
        sender: "alice".into(),
        period: 0,
        group: 0,
        state_update: false,
        time: 0,
        client_time: 0,
        key: "__set_config__".into(),
        value: serde_json::json!({ "foo": "bar" }),
    };
    send_frame(&alice_in, &config).await;
    let echoed_config = recv_decoded(&mut alice_out).await;
    assert_eq!(echoed_config.key, "__set_config__");

    let reset = Msg {
        instance: "x".into(),
        session: 11,
        nonce,
        sender: "alice".into(),
        period: 0,
        group: 0,
        state_update: false,
        time: 0,
        client_time: 0,
        key: "__reset__".into(),
        value: serde_json::json!(null),
    };
    send_frame(&alice_in, &reset).await;

    let replayed_config = recv_decoded(&mut alice_out).await;
    assert_eq!(replayed_config.key, "__set_config__");
    assert_ne!(replayed_config.nonce, echoed_config.nonce);

    let reset_echo = recv_decoded(&mut alice_out).await;
    assert_eq!(reset_echo.key, "__reset__");
}

#[tokio::test]
async fn malformed_path_closes_the_connection_without_registering_a_listener() {
    let handle = boot().await;
    let (mut out, _in) = connect("/way/too/many/path/segments", handle.clone());
    assert!(nothing_arrives(&mut out).await);
}
