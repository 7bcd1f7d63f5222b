//! End-to-end tests for the complete message flow: encode, encrypt,
//! deliver over a live TCP exchange, decrypt and dispatch.

use parley_core::conversation::Conversation;
use parley_core::crypto::{HybridCipher, StaticKeypair};
use parley_core::error::{Error, Result};
use parley_core::fanout::Fanout;
use parley_core::peer::Peer;
use parley_core::protocol::PlainMessage;
use parley_core::transport::{DeliveryClient, MessageSink, Server, ServerHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CONV: &str = "11111111-1111-1111-1111-111111111111";
const SENDER: &str = "22222222-2222-2222-2222-222222222222";

struct ChannelSink(mpsc::UnboundedSender<PlainMessage>);

impl MessageSink for ChannelSink {
    fn accept(&self, message: PlainMessage) -> Result<()> {
        self.0
            .send(message)
            .map_err(|_| Error::Storage("sink channel closed".into()))
    }
}

/// A sink that rejects everything, to exercise the dispatch-failure ack.
struct RejectingSink;

impl MessageSink for RejectingSink {
    fn accept(&self, _message: PlainMessage) -> Result<()> {
        Err(Error::Storage("sink is full".into()))
    }
}

struct RunningServer {
    port: u16,
    handle: ServerHandle,
    task: JoinHandle<()>,
    inbox: mpsc::UnboundedReceiver<PlainMessage>,
}

async fn spawn_server(keys: &StaticKeypair) -> RunningServer {
    let server = Server::bind_to("127.0.0.1", 0, Duration::from_millis(1000))
        .await
        .expect("bind");
    let port = server.local_addr().expect("addr").port();
    let handle = server.handle();
    let (tx, inbox) = mpsc::unbounded_channel();
    let local = StaticKeypair::from_secret_bytes(keys.secret_bytes());
    let task = tokio::spawn(server.run(
        HybridCipher::default(),
        local,
        Arc::new(ChannelSink(tx)),
    ));
    RunningServer {
        port,
        handle,
        task,
        inbox,
    }
}

fn peer_at(id: &str, keys: &StaticKeypair, host: &str, port: u16) -> Peer {
    Peer::new(id, id, keys.public_key().to_text(), host, port, 64)
}

fn message(content: &str) -> PlainMessage {
    PlainMessage::from_parts(content, CONV, SENDER, false, 1_700_000_000)
}

#[tokio::test]
async fn test_end_to_end_exchange() {
    let keys = StaticKeypair::generate();
    let mut server = spawn_server(&keys).await;
    let recipient = peer_at("aaaa", &keys, "127.0.0.1", server.port);

    let cipher = HybridCipher::default();
    let client = DeliveryClient::default();

    let original = message("hello over a real socket");
    let envelope = cipher.encrypt(&original, &recipient).expect("encrypt");
    let addr = recipient.resolve().expect("resolve");

    assert!(client.send(&envelope, addr).await);
    let received = server.inbox.recv().await.expect("message dispatched");
    assert_eq!(received, original);

    server.handle.shutdown().await;
    server.task.await.expect("server task");
}

#[tokio::test]
async fn test_send_is_idempotent_per_call() {
    // Two sends of the same envelope are two independent exchanges;
    // nothing deduplicates them.
    let keys = StaticKeypair::generate();
    let mut server = spawn_server(&keys).await;
    let recipient = peer_at("aaaa", &keys, "127.0.0.1", server.port);

    let cipher = HybridCipher::default();
    let client = DeliveryClient::default();
    let envelope = cipher.encrypt(&message("echo"), &recipient).expect("encrypt");
    let addr = recipient.resolve().expect("resolve");

    assert!(client.send(&envelope, addr).await);
    assert!(client.send(&envelope, addr).await);

    assert!(server.inbox.recv().await.is_some());
    assert!(server.inbox.recv().await.is_some());

    server.handle.shutdown().await;
    server.task.await.expect("server task");
}

#[tokio::test]
async fn test_wrong_recipient_key_is_nacked() {
    let server_keys = StaticKeypair::generate();
    let mut server = spawn_server(&server_keys).await;

    // Encrypted for somebody else entirely.
    let stranger_keys = StaticKeypair::generate();
    let stranger = peer_at("aaaa", &stranger_keys, "127.0.0.1", server.port);

    let cipher = HybridCipher::default();
    let envelope = cipher.encrypt(&message("not for you"), &stranger).expect("encrypt");
    let addr = stranger.resolve().expect("resolve");

    assert!(!DeliveryClient::default().send(&envelope, addr).await);
    assert!(server.inbox.try_recv().is_err());

    server.handle.shutdown().await;
    server.task.await.expect("server task");
}

#[tokio::test]
async fn test_sink_failure_is_nacked() {
    let keys = StaticKeypair::generate();
    let server = Server::bind_to("127.0.0.1", 0, Duration::from_millis(1000))
        .await
        .expect("bind");
    let port = server.local_addr().expect("addr").port();
    let handle = server.handle();
    let task = tokio::spawn(server.run(
        HybridCipher::default(),
        StaticKeypair::from_secret_bytes(keys.secret_bytes()),
        Arc::new(RejectingSink),
    ));

    let recipient = peer_at("aaaa", &keys, "127.0.0.1", port);
    let cipher = HybridCipher::default();
    let envelope = cipher.encrypt(&message("no room"), &recipient).expect("encrypt");

    assert!(
        !DeliveryClient::default()
            .send(&envelope, recipient.resolve().expect("resolve"))
            .await
    );

    handle.shutdown().await;
    task.await.expect("server task");
}

#[tokio::test]
async fn test_fanout_reports_partial_failure() {
    let keys = StaticKeypair::generate();
    let mut server = spawn_server(&keys).await;

    let a = peer_at("aaaa", &keys, "127.0.0.1", server.port);
    // b's host never resolves, so its delivery fails without a network hop.
    let b = peer_at("bbbb", &keys, "does-not-resolve.invalid", server.port);
    let c = peer_at("cccc", &keys, "127.0.0.1", server.port);

    let conversation =
        Conversation::group("team", vec![a, b, c]).expect("non-empty group");

    let fanout = Fanout::new(HybridCipher::default(), DeliveryClient::default());
    let report = fanout.broadcast(&message("to everyone"), &conversation).await;

    // The failure in the middle must not prevent the later attempt.
    assert!(!report.all_delivered());
    assert_eq!(report.failed, vec!["bbbb"]);
    assert_eq!(report.delivered, vec!["aaaa", "cccc"]);
    assert_eq!(report.attempted(), 3);

    // Both successful participants actually got their copy.
    assert!(server.inbox.recv().await.is_some());
    assert!(server.inbox.recv().await.is_some());

    server.handle.shutdown().await;
    server.task.await.expect("server task");
}

#[tokio::test]
async fn test_fanout_direct_degenerates_to_host() {
    let keys = StaticKeypair::generate();
    let mut server = spawn_server(&keys).await;

    let host = peer_at("aaaa", &keys, "127.0.0.1", server.port);
    let conversation = Conversation::direct(host);

    let fanout = Fanout::new(HybridCipher::default(), DeliveryClient::default());
    let report = fanout.broadcast(&message("just us"), &conversation).await;

    assert!(report.all_delivered());
    assert_eq!(report.attempted(), 1);
    assert!(server.inbox.recv().await.is_some());

    server.handle.shutdown().await;
    server.task.await.expect("server task");
}
