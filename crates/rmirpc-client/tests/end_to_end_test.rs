//! Client/server end-to-end tests
//!
//! Every test runs a real server on an ephemeral port and talks to it
//! through the public client API.

use std::sync::Arc;
use std::time::Duration;

use rmirpc_client::{Client, ClientConfig, ConnectionManager, StaticResolver};
use rmirpc_common::protocol::{ArgType, RemoteReference, RpcError};
use rmirpc_server::{MethodTable, Registry, Server, ServerConfig, ServerHandle};
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

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
        .method("fail", vec![ArgType::String], |(message,): (String,)| -> rmirpc_common::Result<()> {
            Err(RpcError::Application(message))
        })
        .build()
}

async fn start() -> (ServerHandle, Arc<Registry>) {
    let registry = Arc::new(Registry::new());
    registry.bind("Calc", calc(1.0)).unwrap();

    let handle = Server::bind(
        ServerConfig::new().with_bind_addr("127.0.0.1:0"),
        Arc::clone(&registry),
    )
    .await
    .unwrap()
    .spawn()
    .unwrap();

    (handle, registry)
}

async fn client_for(handle: &ServerHandle, config: ClientConfig) -> Client {
    Client::with_config("127.0.0.1", handle.local_addr().port(), config)
        .await
        .unwrap()
}

// ============================================================================
// Lookup and call
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_lookup_then_call_reaches_bound_target() {
    let (handle, _registry) = start().await;
    let client = client_for(&handle, ClientConfig::default()).await;

    let reference = client.lookup("Calc").await.unwrap();
    assert_eq!(reference.service, "Calc");
    assert_eq!(reference.port, handle.local_addr().port());

    let stub = client.stub("Calc").await.unwrap();
    let product: f64 = stub.call("multiply", vec![json!(3), json!(4)]).await.unwrap();
    assert_eq!(product, 12.0);

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rebind_is_visible_to_existing_client() {
    let (handle, registry) = start().await;
    let client = client_for(&handle, ClientConfig::default()).await;

    let before = client.call("Calc", "multiply", vec![json!(3), json!(4)]).await.unwrap();
    assert_eq!(before, json!(12.0));

    registry.rebind("Calc", calc(2.0)).unwrap();

    let after = client.call("Calc", "multiply", vec![json!(3), json!(4)]).await.unwrap();
    assert_eq!(after, json!(24.0));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bind_on_occupied_name_keeps_old_target() {
    let (handle, registry) = start().await;
    let client = client_for(&handle, ClientConfig::default()).await;

    let err = registry.bind("Calc", calc(10.0)).unwrap_err();
    assert!(matches!(err, RpcError::AlreadyBound(_)));

    let value = client.call("Calc", "multiply", vec![json!(3), json!(4)]).await.unwrap();
    assert_eq!(value, json!(12.0));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_service_is_not_bound_and_connection_is_reused() {
    let (handle, _registry) = start().await;
    let client = client_for(&handle, ClientConfig::default()).await;
    let endpoint = handle.local_addr().to_string();

    let before = client.connections().get(&endpoint).await.unwrap();

    let err = client.call("Missing", "anything", vec![]).await.unwrap_err();
    assert!(matches!(err, RpcError::NotBound(ref name) if name == "Missing"), "got {:?}", err);
    assert!(!err.is_transport());

    let value = client.call("Calc", "multiply", vec![json!(2), json!(3)]).await.unwrap();
    assert_eq!(value, json!(6.0));

    let after = client.connections().get(&endpoint).await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(client.connections().len().await, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unbind_after_lookup_reports_not_bound() {
    let (handle, registry) = start().await;
    let client = client_for(&handle, ClientConfig::default()).await;

    client.lookup("Calc").await.unwrap();
    registry.unbind("Calc").unwrap();

    let err = client.call("Calc", "multiply", vec![json!(1), json!(1)]).await.unwrap_err();
    assert!(matches!(err, RpcError::NotBound(_)));

    // The stale reference was evicted, so the next lookup asks again.
    registry.bind("Calc", calc(3.0)).unwrap();
    let value = client.call("Calc", "multiply", vec![json!(1), json!(1)]).await.unwrap();
    assert_eq!(value, json!(3.0));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_errors_keep_kind_and_message() {
    let (handle, _registry) = start().await;
    let client = client_for(&handle, ClientConfig::default()).await;

    let err = client
        .call("Calc", "fail", vec![json!("insufficient funds")])
        .await
        .unwrap_err();
    match err {
        RpcError::Application(message) => assert_eq!(message, "insufficient funds"),
        other => panic!("expected Application, got {:?}", other),
    }

    let err = client.call("Calc", "divide", vec![]).await.unwrap_err();
    assert!(matches!(err, RpcError::UnknownMethod(ref t) if t == "Calc.divide"));

    let err = client.call("Calc", "multiply", vec![json!(1)]).await.unwrap_err();
    assert!(matches!(err, RpcError::ArgumentMismatch(_)));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_overflowing_result_fails_instead_of_returning_null() {
    let (handle, _registry) = start().await;
    let client = client_for(&handle, ClientConfig::default()).await;

    let err = client
        .call("Calc", "multiply", vec![json!(1e308), json!(10)])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Application(_)), "got {:?}", err);

    // Only that call failed.
    let value = client.call("Calc", "multiply", vec![json!(1.5), json!(4)]).await.unwrap();
    assert_eq!(value, json!(6.0));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_returns_bound_names() {
    let (handle, registry) = start().await;
    registry.bind("PriceCalculator", calc(1.0)).unwrap();
    let client = client_for(&handle, ClientConfig::default()).await;

    assert_eq!(
        client.list().await.unwrap(),
        vec!["Calc".to_string(), "PriceCalculator".to_string()]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_static_resolver_skips_the_registry() {
    let (handle, registry) = start().await;
    registry.bind("PriceCalculator", calc(2.0)).unwrap();
    let port = handle.local_addr().port();

    // Only Calc is known locally, even though the server has more.
    let resolver = StaticResolver::new().with_reference(RemoteReference::new("127.0.0.1", port, "Calc"));
    let client = Client::with_resolver(
        Arc::new(resolver),
        Arc::new(ConnectionManager::new(ClientConfig::default())),
    );

    let value = client.call("Calc", "multiply", vec![json!(3), json!(4)]).await.unwrap();
    assert_eq!(value, json!(12.0));
    assert_eq!(client.list().await.unwrap(), vec!["Calc".to_string()]);

    let err = client
        .call("PriceCalculator", "multiply", vec![json!(1), json!(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::NotBound(ref n) if n == "PriceCalculator"));

    // A stale static entry surfaces the server's answer.
    registry.unbind("Calc").unwrap();
    let err = client.call("Calc", "multiply", vec![json!(1), json!(1)]).await.unwrap_err();
    assert!(matches!(err, RpcError::NotBound(_)));

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Concurrency and failure
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stubs_receive_only_their_own_responses() {
    let (handle, _registry) = start().await;
    let client = Arc::new(client_for(&handle, ClientConfig::default()).await);

    let calls: Vec<_> = (0..50)
        .map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let stub = client.stub("Calc").await.unwrap();
                let value: f64 = stub.call("multiply", vec![json!(i), json!(1)]).await.unwrap();
                (i, value)
            })
        })
        .collect();

    for call in calls {
        let (i, value) = call.await.unwrap();
        assert_eq!(value, i as f64);
    }

    // All of it went over one connection.
    assert_eq!(client.connections().len().await, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_killed_mid_call_fails_with_transport_error() {
    let (handle, _registry) = start().await;
    let config = ClientConfig::new().with_call_timeout(Duration::from_secs(5));
    let client = Arc::new(client_for(&handle, config).await);

    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.call("Calc", "sleep", vec![json!(1500)]).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.abort();

    let err = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("call did not resolve within the call timeout")
        .unwrap()
        .unwrap_err();
    assert!(err.is_transport(), "got {:?}", err);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reconnects_after_server_restart() {
    let (handle, registry) = start().await;
    let addr = handle.local_addr();
    let client = client_for(&handle, ClientConfig::default()).await;

    assert!(client.call("Calc", "multiply", vec![json!(1), json!(2)]).await.is_ok());
    handle.shutdown().await.unwrap();

    // Give the client's reader a moment to observe the close.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let restarted = Server::bind(
        ServerConfig::new().with_bind_addr(addr.to_string()),
        registry,
    )
    .await
    .unwrap()
    .spawn()
    .unwrap();

    let value = client.call("Calc", "multiply", vec![json!(2), json!(2)]).await.unwrap();
    assert_eq!(value, json!(4.0));

    restarted.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_late_response_after_timeout_is_discarded() {
    let (handle, _registry) = start().await;
    let config = ClientConfig::new().with_call_timeout(Duration::from_millis(200));
    let client = client_for(&handle, config).await;

    let err = client.call("Calc", "sleep", vec![json!(600)]).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout(200)), "got {:?}", err);

    // The next call gets its own answer, not the late one.
    let value = client.call("Calc", "multiply", vec![json!(5), json!(5)]).await.unwrap();
    assert_eq!(value, json!(25.0));

    // Let the late response arrive, then call again over the same connection.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let value = client.call("Calc", "multiply", vec![json!(6), json!(6)]).await.unwrap();
    assert_eq!(value, json!(36.0));
    assert_eq!(client.connections().len().await, 1);

    handle.shutdown().await.unwrap();
}
