//! Integration tests for the socket server.
//!
//! These tests verify that clients connected over a Unix socket behave as
//! hub channels: replies go to the requester, changes to everyone else.

use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout, Duration};

use credsync_core::{CredentialCache, MemoryStore, NoopTelemetry, RawRecord};
use credsync_daemon::api::{start_server, ServerHandle};
use credsync_daemon::{ApiState, SyncContext};

/// Detect whether the sandbox allows binding Unix sockets. Skip tests if not.
fn can_bind_unix_socket() -> bool {
    let path = std::env::temp_dir().join("credsync-socket-permission-check.sock");
    let _ = fs::remove_file(&path);
    let result = std::os::unix::net::UnixListener::bind(&path);
    let ok = result.is_ok();
    let _ = fs::remove_file(&path);
    ok
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(path: &PathBuf) -> Self {
        let stream = UnixStream::connect(path).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn next_frame(&mut self) -> Value {
        let line = timeout(Duration::from_secs(2), self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("connection closed");
        serde_json::from_str(&line).unwrap()
    }

    async fn no_frame(&mut self) -> bool {
        timeout(Duration::from_millis(100), self.lines.next_line())
            .await
            .is_err()
    }
}

/// Helper to set up a test server with a unique temp directory and socket path.
/// Returns the temp directory (which must be kept alive), socket path, context
/// and server handle.
async fn setup_test_server(records: Vec<RawRecord>) -> (TempDir, PathBuf, SyncContext, ServerHandle) {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");

    let store = Arc::new(MemoryStore::with_records(records));
    let cache = Arc::new(CredentialCache::new(store, Arc::new(NoopTelemetry)));
    let context = SyncContext::initialize(ApiState::new(cache, Arc::new(NoopTelemetry)))
        .await
        .unwrap();
    let handle = start_server(&socket_path, context.hub().clone()).await.unwrap();

    // Give the server time to start accepting connections
    sleep(Duration::from_millis(100)).await;

    (temp_dir, socket_path, context, handle)
}

fn record(id: &str, origin: &str) -> RawRecord {
    serde_json::from_value(json!({
        "id": id,
        "origin": origin,
        "username": "user",
        "password": "pass",
    }))
    .unwrap()
}

#[tokio::test]
async fn test_list_items_over_socket() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_list_items_over_socket: Unix sockets not permitted in sandbox");
        return;
    }

    let (_temp_dir, socket_path, _context, handle) =
        setup_test_server(vec![record("FOO", "https://www2.foo.com")]).await;
    let mut client = Client::connect(&socket_path).await;

    client.send(json!({"type": "list_items", "requestId": 1})).await;
    let frame = client.next_frame().await;

    assert_eq!(frame["kind"], "reply");
    assert_eq!(frame["requestId"], 1);
    let items = frame["result"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "FOO");
    assert_eq!(items[0]["title"], "foo.com");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_mutation_fans_out_to_other_connections() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_mutation_fans_out_to_other_connections: Unix sockets not permitted in sandbox");
        return;
    }

    let (_temp_dir, socket_path, context, handle) = setup_test_server(vec![]).await;
    let mut a = Client::connect(&socket_path).await;
    let mut b = Client::connect(&socket_path).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(context.hub().channel_count(), 2);

    a.send(json!({
        "type": "add_item",
        "requestId": "add-1",
        "item": {"origin": "https://example.com", "username": "alice", "password": "secret"},
    }))
    .await;

    let reply = a.next_frame().await;
    assert_eq!(reply["kind"], "reply");
    assert_eq!(reply["requestId"], "add-1");
    assert_eq!(reply["result"]["item"]["username"], "alice");
    assert_eq!(reply["result"]["item"]["formTargetOrigin"], "https://example.com");

    let broadcast = b.next_frame().await;
    assert_eq!(broadcast["kind"], "broadcast");
    assert_eq!(broadcast["event"]["type"], "added_item");
    assert_eq!(broadcast["event"]["item"], reply["result"]["item"]);

    assert!(a.no_frame().await);
    assert!(b.no_frame().await);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_json_gets_validation_error() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_invalid_json_gets_validation_error: Unix sockets not permitted in sandbox");
        return;
    }

    let (_temp_dir, socket_path, _context, handle) = setup_test_server(vec![]).await;
    let mut client = Client::connect(&socket_path).await;

    client.send_raw("{not json").await;
    let frame = client.next_frame().await;
    assert_eq!(frame["kind"], "reply");
    assert_eq!(frame["result"], Value::Null);
    assert_eq!(frame["error"]["kind"], "validation");

    // The connection stays usable.
    client.send(json!({"type": "bogus", "requestId": 2})).await;
    let frame = client.next_frame().await;
    assert_eq!(frame["requestId"], 2);
    assert_eq!(frame["result"], Value::Null);
    assert!(frame.get("error").is_none());

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_closed_connection_is_disconnected() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_closed_connection_is_disconnected: Unix sockets not permitted in sandbox");
        return;
    }

    let (_temp_dir, socket_path, context, handle) =
        setup_test_server(vec![record("FOO", "https://foo.com")]).await;
    let mut a = Client::connect(&socket_path).await;
    let b = Client::connect(&socket_path).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(context.hub().channel_count(), 2);

    drop(b);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(context.hub().channel_count(), 1);

    a.send(json!({"type": "remove_item", "id": "FOO", "requestId": 9})).await;
    let reply = a.next_frame().await;
    assert_eq!(reply["result"], json!({}));
    assert!(reply.get("error").is_none());

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_socket_is_owner_only() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_socket_is_owner_only: Unix sockets not permitted in sandbox");
        return;
    }

    use std::os::unix::fs::PermissionsExt;

    let (_temp_dir, socket_path, _context, handle) = setup_test_server(vec![]).await;
    let mode = fs::metadata(&socket_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    handle.stop().await.unwrap();
}
