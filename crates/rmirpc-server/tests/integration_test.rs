// Integration tests for rmirpc-server
//
// These tests run a real server on an ephemeral port and talk to it with
// raw frames, so they cover the wire behavior independently of the client.

use std::sync::Arc;
use std::time::Duration;

use rmirpc_common::protocol::{
    ArgType, ErrorKind, InvocationRequest, InvocationResponse, Outcome, RpcError,
};
use rmirpc_common::transport::{read_frame, write_frame, JsonCodec};
use rmirpc_server::{MethodTable, Registry, Server, ServerConfig, ServerHandle};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

// ============================================================================
// Test Helpers
// ============================================================================

const MAX_FRAME: usize = 64 * 1024;

fn calc(factor: f64) -> MethodTable {
    MethodTable::builder()
        .method(
            "multiply",
            vec![ArgType::Number, ArgType::Number],
            move |(a, b): (f64, f64)| Ok(a * b * factor),
        )
        .method("sleep", vec![ArgType::Integer], |(ms,): (u64,)| {
            std::thread::sleep(Duration::from_millis(ms));
            Ok(ms)
        })
        .build()
}

async fn start(registry: Arc<Registry>) -> ServerHandle {
    Server::bind(ServerConfig::new().with_bind_addr("127.0.0.1:0"), registry)
        .await
        .unwrap()
        .spawn()
        .unwrap()
}

async fn start_with_calc() -> (ServerHandle, Arc<Registry>) {
    let registry = Arc::new(Registry::new());
    registry.bind("Calc", calc(1.0)).unwrap();
    (start(Arc::clone(&registry)).await, registry)
}

/// Raw framed connection
struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    async fn connect(handle: &ServerHandle) -> Self {
        Self {
            stream: TcpStream::connect(handle.local_addr()).await.unwrap(),
        }
    }

    async fn send(&mut self, id: u64, service: &str, method: &str, args: Vec<Value>) {
        let request = InvocationRequest::new(id, service, method, args);
        write_frame(&mut self.stream, &JsonCodec::encode_request(&request).unwrap())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Option<InvocationResponse> {
        let payload = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut self.stream, MAX_FRAME))
            .await
            .expect("server did not answer in time")
            .unwrap()?;
        Some(JsonCodec::decode_response(&payload).unwrap())
    }

    async fn call(&mut self, id: u64, service: &str, method: &str, args: Vec<Value>) -> InvocationResponse {
        self.send(id, service, method, args).await;
        self.recv().await.expect("connection closed")
    }

    /// True once the server has closed its side.
    async fn is_closed(&mut self) -> bool {
        match tokio::time::timeout(Duration::from_secs(5), read_frame(&mut self.stream, MAX_FRAME)).await {
            Ok(Ok(None)) | Ok(Err(_)) => true,
            Ok(Ok(Some(_))) => false,
            Err(_) => false,
        }
    }
}

fn failure_kind(response: &InvocationResponse) -> ErrorKind {
    match &response.outcome {
        Outcome::Failure { kind, .. } => *kind,
        Outcome::Success { value } => panic!("expected failure, got {}", value),
    }
}

// ============================================================================
// Calls
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_multiply_then_rebind() {
    let (handle, registry) = start_with_calc().await;
    let mut client = TestClient::connect(&handle).await;

    let response = client.call(1, "Calc", "multiply", vec![json!(3), json!(4)]).await;
    assert_eq!(response.id, 1);
    assert_eq!(response.into_result().unwrap(), json!(12.0));

    registry.rebind("Calc", calc(2.0)).unwrap();

    let response = client.call(2, "Calc", "multiply", vec![json!(3), json!(4)]).await;
    assert_eq!(response.into_result().unwrap(), json!(24.0));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_not_bound_keeps_connection_open() {
    let (handle, _registry) = start_with_calc().await;
    let mut client = TestClient::connect(&handle).await;

    let response = client.call(1, "Missing", "anything", vec![]).await;
    assert_eq!(response.id, 1);
    match response.into_result() {
        Err(RpcError::NotBound(name)) => assert_eq!(name, "Missing"),
        other => panic!("expected NotBound, got {:?}", other),
    }

    let response = client.call(2, "Calc", "multiply", vec![json!(2), json!(5)]).await;
    assert_eq!(response.into_result().unwrap(), json!(10.0));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_per_call_failures_keep_connection_open() {
    let (handle, _registry) = start_with_calc().await;
    let mut client = TestClient::connect(&handle).await;

    let unknown = client.call(1, "Calc", "divide", vec![json!(1), json!(2)]).await;
    assert_eq!(failure_kind(&unknown), ErrorKind::UnknownMethod);

    let arity = client.call(2, "Calc", "multiply", vec![json!(1)]).await;
    assert_eq!(failure_kind(&arity), ErrorKind::ArgumentMismatch);

    let types = client.call(3, "Calc", "multiply", vec![json!("x"), json!(1)]).await;
    assert_eq!(failure_kind(&types), ErrorKind::ArgumentMismatch);

    let ok = client.call(4, "Calc", "multiply", vec![json!(1), json!(1)]).await;
    assert!(ok.outcome.is_success());

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pipelined_requests_complete_out_of_order() {
    let (handle, _registry) = start_with_calc().await;
    let mut client = TestClient::connect(&handle).await;

    client.send(1, "Calc", "sleep", vec![json!(500)]).await;
    client.send(2, "Calc", "multiply", vec![json!(6), json!(7)]).await;

    // The fast call overtakes the slow one.
    let first = client.recv().await.unwrap();
    assert_eq!(first.id, 2);
    assert_eq!(first.into_result().unwrap(), json!(42.0));

    let second = client.recv().await.unwrap();
    assert_eq!(second.id, 1);
    assert_eq!(second.into_result().unwrap(), json!(500));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_in_flight_limit_holds_back_later_requests() {
    let registry = Arc::new(Registry::new());
    registry.bind("Calc", calc(1.0)).unwrap();
    let handle = Server::bind(
        ServerConfig::new()
            .with_bind_addr("127.0.0.1:0")
            .with_max_in_flight(1),
        registry,
    )
    .await
    .unwrap()
    .spawn()
    .unwrap();
    let mut client = TestClient::connect(&handle).await;

    client.send(1, "Calc", "sleep", vec![json!(300)]).await;
    client.send(2, "Calc", "multiply", vec![json!(6), json!(7)]).await;

    // With one slot the fast call is not read until the slow one is done.
    let first = client.recv().await.unwrap();
    assert_eq!(first.id, 1);
    let second = client.recv().await.unwrap();
    assert_eq!(second.id, 2);
    assert_eq!(second.into_result().unwrap(), json!(42.0));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_builtin_registry_service() {
    let (handle, _registry) = start_with_calc().await;
    let mut client = TestClient::connect(&handle).await;

    let pong = client.call(1, "_registry", "ping", vec![]).await;
    assert_eq!(pong.into_result().unwrap(), json!("pong"));

    let list = client.call(2, "_registry", "list", vec![]).await;
    assert_eq!(list.into_result().unwrap(), json!(["Calc"]));

    let lookup = client.call(3, "_registry", "lookup", vec![json!("Calc")]).await;
    let descriptor = lookup.into_result().unwrap();
    assert_eq!(descriptor["service"], json!("Calc"));

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Connection-fatal input
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_length_frame_closes_connection() {
    let (handle, _registry) = start_with_calc().await;
    let mut client = TestClient::connect(&handle).await;

    client.stream.write_all(&0u32.to_be_bytes()).await.unwrap();

    // At most an uncorrelated codec failure precedes the close.
    if let Some(response) = client.recv().await {
        assert_eq!(response.id, 0);
        assert_eq!(failure_kind(&response), ErrorKind::Codec);
    }
    assert!(client.is_closed().await);

    // The server still accepts new connections.
    let mut next = TestClient::connect(&handle).await;
    let response = next.call(1, "Calc", "multiply", vec![json!(3), json!(4)]).await;
    assert!(response.outcome.is_success());

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_garbage_payload_closes_connection() {
    let (handle, _registry) = start_with_calc().await;
    let mut client = TestClient::connect(&handle).await;

    write_frame(&mut client.stream, b"definitely not json").await.unwrap();

    let response = client.recv().await.expect("expected a codec failure before close");
    assert_eq!(response.id, 0);
    assert_eq!(failure_kind(&response), ErrorKind::Codec);
    assert!(client.is_closed().await);

    let mut next = TestClient::connect(&handle).await;
    let response = next.call(9, "Calc", "multiply", vec![json!(1), json!(2)]).await;
    assert_eq!(response.id, 9);

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_frame_closes_connection() {
    let registry = Arc::new(Registry::new());
    registry.bind("Calc", calc(1.0)).unwrap();
    let handle = Server::bind(
        ServerConfig::new()
            .with_bind_addr("127.0.0.1:0")
            .with_max_frame_size(128),
        registry,
    )
    .await
    .unwrap()
    .spawn()
    .unwrap();

    let mut client = TestClient::connect(&handle).await;
    client.stream.write_all(&1024u32.to_be_bytes()).await.unwrap();

    if let Some(response) = client.recv().await {
        assert_eq!(failure_kind(&response), ErrorKind::Codec);
    }
    assert!(client.is_closed().await);

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_graceful_shutdown_answers_in_flight_requests() {
    let (handle, _registry) = start_with_calc().await;
    let mut client = TestClient::connect(&handle).await;

    client.send(5, "Calc", "sleep", vec![json!(300)]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let shutdown = tokio::spawn(handle.shutdown());

    let response = client.recv().await.expect("in-flight request was dropped");
    assert_eq!(response.id, 5);
    assert!(client.is_closed().await);

    shutdown.await.unwrap().unwrap();
}
