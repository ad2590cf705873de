#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end tests: a real server on a loopback port and real clients.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nemoria::core::packet::Packet;
use nemoria::error::{ErrorKind, NemoriaError};
use nemoria::protocol::message::{Message, Request};
use nemoria::persistence::{Codec, PersistenceManager};
use nemoria::store::{Route, Value};
use nemoria::utils::metrics::Metrics;
use nemoria::{Client, SaveOptions, Server, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const PASSWORD: &str = "12345678";

struct Running {
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<nemoria::Result<()>>,
}

impl Running {
    fn client(&self) -> Client {
        Client::new("127.0.0.1", self.addr.port(), PASSWORD)
    }

    async fn stop(self) -> nemoria::Result<()> {
        let _ = self.shutdown.send(()).await;
        self.handle.await.unwrap()
    }
}

fn config() -> ServerConfig {
    ServerConfig {
        shutdown_timeout: Duration::from_secs(2),
        ..ServerConfig::new("127.0.0.1", 0, "TEST", PASSWORD)
    }
}

async fn start_with(config: ServerConfig, raise_on_error: bool) -> Running {
    let bound = Server::new(config).unwrap().bind().await.unwrap();
    let addr = bound.local_addr();
    let metrics = bound.metrics();
    let (shutdown, shutdown_rx) = mpsc::channel(1);
    let handle = tokio::spawn(bound.serve(shutdown_rx, raise_on_error));
    Running {
        addr,
        metrics,
        shutdown,
        handle,
    }
}

async fn start() -> Running {
    start_with(config(), false).await
}

async fn connected(server: &Running) -> Client {
    let mut client = server.client();
    client.try_connect().await.expect("client should connect");
    client
}

fn json_options(path: &Path) -> SaveOptions {
    SaveOptions::new("json", path.to_string_lossy(), true)
}

// ============================================================================
// CRUD
// ============================================================================

#[tokio::test]
async fn test_crud_round_trips() {
    let server = start().await;
    let mut client = connected(&server).await;

    assert_eq!(
        client.set("user/profile/name", "Alice").await.unwrap(),
        Value::from("Alice")
    );
    client.set(["user", "profile", "age"], 30).await.unwrap();

    assert_eq!(
        client.get("user/profile/name").await.unwrap(),
        Value::from("Alice")
    );
    assert_eq!(
        client.all().await.unwrap().to_string(),
        r#"{"user": {"profile": {"name": "Alice", "age": 30}}}"#
    );
    assert_eq!(
        client.subtree("user/profile").await.unwrap().to_string(),
        r#"{"name": "Alice", "age": 30}"#
    );

    assert!(client.delete("user/profile/age").await.unwrap());
    assert!(!client.delete("user/profile/age").await.unwrap());
    assert!(client.drop_route("user").await.unwrap());
    assert_eq!(client.all().await.unwrap(), Value::empty_map());

    client.ping().await.unwrap();
    client.close().await;
    assert!(!client.is_connected());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_delete_intermediate_route_over_the_wire() {
    let server = start().await;
    let mut client = connected(&server).await;

    client.set("one/two/3", 4).await.unwrap();
    assert!(client.delete("one/two").await.unwrap());
    let err = client.get("one/two/3").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RouteNotFound);
    assert_eq!(client.all().await.unwrap().to_string(), r#"{"one": {}}"#);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_errors_keep_connection_open() {
    let server = start().await;
    let mut client = connected(&server).await;

    client.set("a/b", 1).await.unwrap();
    let err = client.set("a/b/c", 2).await.unwrap_err();
    assert!(matches!(err, NemoriaError::RouteConflict(_)));

    let err = client.get("missing").await.unwrap_err();
    assert!(matches!(err, NemoriaError::RouteNotFound(_)));

    // invalid routes never leave the client
    let err = client.get("a//b").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRoute);

    assert!(client.is_connected());
    assert_eq!(client.get("a/b").await.unwrap(), Value::Int(1));

    let snapshot = server.metrics.snapshot();
    assert_eq!(snapshot.requests_failed, 2);
    server.stop().await.unwrap();
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

#[tokio::test]
async fn test_wrong_password_is_refused() {
    let server = start().await;
    let mut client = Client::new("127.0.0.1", server.addr.port(), "wrong password");

    assert!(!client.connect().await);
    assert!(!client.is_connected());
    assert!(matches!(
        client.get("anything").await,
        Err(NemoriaError::NotConnected)
    ));

    let mut client = Client::new("127.0.0.1", server.addr.port(), "wrong password");
    let err = client.try_connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);

    assert_eq!(server.metrics.snapshot().handshakes_failed, 2);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_namespace_must_match() {
    let server = start().await;

    let mut wrong = server.client().with_namespace("OTHER");
    assert!(!wrong.connect().await);

    let mut right = server.client().with_namespace("TEST");
    assert!(right.connect().await);
    assert_eq!(right.namespace(), Some("TEST"));

    let mut advertised = server.client();
    assert!(advertised.connect().await);
    assert_eq!(advertised.namespace(), Some("TEST"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_connect_to_nothing_fails() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = Client::new("127.0.0.1", port, PASSWORD);
    assert!(!client.connect().await);
}

#[tokio::test]
async fn test_garbage_closes_only_that_connection() {
    let server = start().await;
    let mut client = connected(&server).await;

    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    raw.write_all(b"GET / HTTP/1.1\r\nHost: nemoria\r\n\r\n")
        .await
        .unwrap();
    drop(raw);

    tokio::time::sleep(Duration::from_millis(100)).await;
    client.set("still", "alive").await.unwrap();
    assert_eq!(client.get("still").await.unwrap(), Value::from("alive"));

    server.stop().await.unwrap();
}

/// Hand-encoded bincode `Message::Request(Request::Set)` for route `a` whose
/// value is an int wrapped in `lists` one-element lists.
fn nested_set_payload(lists: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(lists * 12 + 48);
    payload.extend(4u32.to_le_bytes()); // Message::Request
    payload.extend(0u32.to_le_bytes()); // Request::Set
    payload.extend(1u64.to_le_bytes()); // one route segment
    payload.extend(1u64.to_le_bytes());
    payload.push(b'a');
    for _ in 0..lists {
        payload.extend(5u32.to_le_bytes()); // Value::List
        payload.extend(1u64.to_le_bytes());
    }
    payload.extend(2u32.to_le_bytes()); // Value::Int
    payload.extend(7i64.to_le_bytes());
    payload.push(0); // no save options
    payload
}

#[test]
fn test_nested_set_payload_layout() {
    let expected = Message::Request(Request::Set {
        route: Route::top("a").unwrap(),
        value: Value::List(vec![Value::List(vec![Value::Int(7)])]),
        save: None,
    });
    assert_eq!(bincode::serialize(&expected).unwrap(), nested_set_payload(2));
}

#[tokio::test]
async fn test_deeply_nested_frame_closes_only_that_connection() {
    let server = start().await;

    // well past any stack, yet far below the payload cap
    let frame = Packet::new(nested_set_payload(200_000)).to_bytes().unwrap();
    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    raw.write_all(&frame).await.unwrap();

    // the server drops the connection after its hello
    let mut rest = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), raw.read_to_end(&mut rest))
        .await
        .expect("server should close the connection");

    let mut client = connected(&server).await;
    client.ping().await.unwrap();
    client.set("after", 1).await.unwrap();
    assert_eq!(server.metrics.snapshot().protocol_errors, 1);

    client.close().await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_connection_limit() {
    let server = start_with(
        ServerConfig {
            max_connections: 1,
            ..config()
        },
        false,
    )
    .await;

    let mut first = connected(&server).await;
    let mut second = server.client();
    assert!(!second.connect().await);
    assert_eq!(server.metrics.snapshot().connections_refused, 1);

    first.ping().await.unwrap();
    first.close().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(second.connect().await);

    server.stop().await.unwrap();
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[tokio::test]
async fn test_save_request_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let server = start().await;
    let mut client = connected(&server).await;

    client.set("server/port", 1234).await.unwrap();
    client.set("server/host", "localhost").await.unwrap();

    for codec in Codec::ALL {
        let path = dir.path().join(format!("store.{}", codec.extension()));
        let bytes = client
            .save(codec.name(), path.to_string_lossy(), true)
            .await
            .unwrap();
        assert!(bytes > 0);

        let loaded = PersistenceManager::new().load(codec, &path).await.unwrap();
        assert_eq!(loaded, client.all().await.unwrap());
    }

    assert_eq!(server.metrics.snapshot().saves_total, 2);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_mutation_with_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let server = start().await;
    let mut client = connected(&server).await;

    client
        .set_with("user/name", "Alice", json_options(&path))
        .await
        .unwrap();
    assert!(std::fs::read_to_string(&path).unwrap().contains("Alice"));

    client
        .delete_with("user/name", json_options(&path))
        .await
        .unwrap();
    let loaded = PersistenceManager::new().load(Codec::Json, &path).await.unwrap();
    assert_eq!(loaded.to_string(), r#"{"user": {}}"#);

    client.drop_with("user", json_options(&path)).await.unwrap();
    let loaded = PersistenceManager::new().load(Codec::Json, &path).await.unwrap();
    assert_eq!(loaded, Value::empty_map());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_codec_rejects_before_mutating() {
    let server = start().await;
    let mut client = connected(&server).await;

    let err = client
        .set_with("k", 1, SaveOptions::new("xml", "out.xml", false))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedCodec);
    assert_eq!(
        client.get("k").await.unwrap_err().kind(),
        ErrorKind::RouteNotFound
    );

    let err = client.save("toml", "out.toml", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedCodec);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_backing_file_is_loaded_and_written_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output.yaml");
    std::fs::write(&path, "user:\n  profile:\n    name: Alice\n    age: 30\n").unwrap();

    let server = start_with(config().with_file(&path, Some("YAML")), false).await;
    let mut client = connected(&server).await;
    assert_eq!(
        client.get("user/profile/age").await.unwrap(),
        Value::Int(30)
    );
    client.set("user/profile/city", "Berlin").await.unwrap();
    client.close().await;
    server.stop().await.unwrap();

    // the next server starts from what the previous one wrote on shutdown
    let server = start_with(config().with_file(&path, None), false).await;
    let mut client = connected(&server).await;
    assert_eq!(
        client.get("user/profile/city").await.unwrap(),
        Value::from("Berlin")
    );
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_backing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.json");

    let server = start_with(config().with_file(&path, None), false).await;
    let mut client = connected(&server).await;
    assert_eq!(client.all().await.unwrap(), Value::empty_map());
    client.set("created", true).await.unwrap();
    server.stop().await.unwrap();

    let loaded = PersistenceManager::new().load(Codec::Json, &path).await.unwrap();
    let route: Route = "created".parse().unwrap();
    assert_eq!(
        loaded.as_map().unwrap()[route.last()],
        Value::Bool(true)
    );
}

#[tokio::test]
async fn test_corrupt_backing_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ definitely not json").unwrap();

    let err = Server::new(config().with_file(&path, None))
        .unwrap()
        .bind()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PersistenceError);
}

// ============================================================================
// SERVER LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_raise_on_error_stops_server() {
    let server = start_with(config(), true).await;
    let mut client = connected(&server).await;

    client.set("ok", 1).await.unwrap();
    // the failure still reaches the client
    let err = client.get("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RouteNotFound);

    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(matches!(result, Err(NemoriaError::RouteNotFound(_))));
}

#[tokio::test]
async fn test_shutdown_disconnects_clients() {
    let server = start().await;
    let mut client = connected(&server).await;
    client.set("k", "v").await.unwrap();

    server.stop().await.unwrap();

    assert!(client.get("k").await.is_err());
    assert!(!client.is_connected());
    assert!(matches!(
        client.get("k").await,
        Err(NemoriaError::NotConnected)
    ));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let err = Server::new(ServerConfig::new("127.0.0.1", 0, "TEST", "")).unwrap_err();
    assert!(matches!(err, NemoriaError::ConfigError(_)));
}
