//! End-to-end HTTP tests for the FaaS control surface.
// crates/faas-server/tests/http_api.rs
// =============================================================================
// Module: HTTP API Tests
// Description: Drive registration and invocation through a live axum server.
// Purpose: Validate status codes, response shapes, limits, and audit output.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use common::EchoSidecar;
use common::LiveServer;
use common::StubRuntime;
use faas_config::AuditConfig;
use faas_core::Engine;
use faas_core::EngineConfig;
use faas_core::InMemoryFunctionStore;
use faas_core::SystemClock;
use faas_server::FaasServer;
use faas_server::INVOKE_PATH;
use faas_server::LEGACY_INVOKE_PATH;
use faas_server::LEGACY_REGISTER_PATH;
use faas_server::REGISTER_PATH;
use faas_server::audit_sink;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

const LIMIT: usize = 64 * 1024;

async fn register(server: &LiveServer, name: &str) -> String {
    let (status, body) =
        server.post(REGISTER_PATH, &json!({ "name": name, "code": "print('hi')" })).await;
    assert_eq!(status, 201, "register failed: {body}");
    body["result"].as_str().unwrap().to_string()
}

// ============================================================================
// SECTION: Registration
// ============================================================================

#[tokio::test]
async fn register_returns_created_uid() {
    let server = LiveServer::start(LIMIT).await;
    let uid = register(&server, "Hello_World").await;
    assert_eq!(uid, "hello-world-1");

    let (status, body) =
        server.post(LEGACY_REGISTER_PATH, &json!({ "name": "second", "code": "x" })).await;
    assert_eq!(status, 201);
    assert_eq!(body, json!({ "result": "second-2" }));
    assert_eq!(server.runtime.containers.lock().unwrap().len(), 2);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn register_validation_failure_is_server_error() {
    let server = LiveServer::start(LIMIT).await;
    let (status, body) = server.post(REGISTER_PATH, &json!({ "name": "", "code": "x" })).await;
    assert_eq!(status, 500);
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("name must not be empty"));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn provisioning_failure_hides_runtime_detail() {
    let server = LiveServer::start(LIMIT).await;
    *server.runtime.fail_create.lock().unwrap() = true;
    let (status, body) = server.post(REGISTER_PATH, &json!({ "name": "f", "code": "x" })).await;
    assert_eq!(status, 500);
    assert_eq!(body, json!({ "error": "container provisioning failed", "kind": "provisioning" }));
    server.shutdown().await.unwrap();
}

// ============================================================================
// SECTION: Invocation
// ============================================================================

#[tokio::test]
async fn invoke_returns_sidecar_result() {
    let server = LiveServer::start(LIMIT).await;
    let uid = register(&server, "echo").await;

    let (status, body) =
        server.post(INVOKE_PATH, &json!({ "name": uid, "params": { "n": 3 } })).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "result": { "echo": { "n": 3 } } }));

    let (status, body) = server.post(LEGACY_INVOKE_PATH, &json!({ "name": uid })).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "result": { "echo": {} } }));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_function_is_not_found_kind() {
    let server = LiveServer::start(LIMIT).await;
    let (status, body) = server.post(INVOKE_PATH, &json!({ "name": "ghost-41" })).await;
    assert_eq!(status, 500);
    assert_eq!(body["kind"], "not_found");
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn application_error_is_reported() {
    let server = LiveServer::start(LIMIT).await;
    let uid = register(&server, "boom").await;
    let (status, body) = server
        .post(INVOKE_PATH, &json!({ "name": uid, "params": { "fail": "division by zero" } }))
        .await;
    assert_eq!(status, 500);
    assert_eq!(body["kind"], "dispatch");
    assert!(body["error"].as_str().unwrap().contains("division by zero"));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn non_object_params_are_bad_requests() {
    let server = LiveServer::start(LIMIT).await;
    let uid = register(&server, "f").await;
    let (status, body) = server.post(INVOKE_PATH, &json!({ "name": uid, "params": [1, 2] })).await;
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "bad_request");
    let (status, _) = server.post(INVOKE_PATH, &json!({ "name": uid, "params": 7 })).await;
    assert_eq!(status, 400);
    assert!(server.runtime.containers.lock().unwrap().values().all(|(_, running)| !running));
    server.shutdown().await.unwrap();
}

// ============================================================================
// SECTION: Request Bodies
// ============================================================================

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let server = LiveServer::start(LIMIT).await;
    let (status, body) = server.post_raw(REGISTER_PATH, "{not json").await;
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "bad_request");

    let (status, _) = server.post(REGISTER_PATH, &json!({ "name": "only-name" })).await;
    assert_eq!(status, 400);
    let (status, _) = server.post(INVOKE_PATH, &json!({ "params": {} })).await;
    assert_eq!(status, 400);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let server = LiveServer::start(256).await;
    let code = "x".repeat(1024);
    let (status, body) = server.post(REGISTER_PATH, &json!({ "name": "big", "code": code })).await;
    assert_eq!(status, 413);
    assert_eq!(body["kind"], "payload_too_large");
    assert!(server.runtime.containers.lock().unwrap().is_empty());
    server.shutdown().await.unwrap();
}

// ============================================================================
// SECTION: Audit
// ============================================================================

#[tokio::test]
async fn audit_records_cold_then_warm_starts() {
    let server = LiveServer::start(LIMIT).await;
    let uid = register(&server, "warmup").await;
    for _ in 0 .. 2 {
        let (status, _) = server.post(INVOKE_PATH, &json!({ "name": uid })).await;
        assert_eq!(status, 200);
    }
    let (status, _) = server.post_raw(INVOKE_PATH, "[]").await;
    assert_eq!(status, 400);

    let events = server.audit.events.lock().unwrap().clone();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].status, 201);
    assert_eq!(events[0].function.as_deref(), Some(uid.as_str()));
    assert_eq!(events[1].start, Some("cold"));
    assert_eq!(events[2].start, Some("warm"));
    assert_eq!(events[3].error_kind, Some("bad_request"));
    assert!(events[3].function.is_none());
    assert!(events.iter().all(|event| event.engine_id == "engine-test"));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn file_audit_sink_writes_json_lines() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("audit.jsonl");
    let sink = audit_sink(&AuditConfig {
        enabled: true,
        path: Some(path.display().to_string()),
    })
    .unwrap();

    let engine = Engine::new(
        EngineConfig {
            engine_id: "engine-file".to_string(),
            ..EngineConfig::default()
        },
        Arc::new(InMemoryFunctionStore::new()),
        Arc::new(StubRuntime::default()),
        Arc::new(EchoSidecar),
        Arc::new(SystemClock),
    );
    let server = FaasServer::new(engine, LIMIT).with_audit(sink);
    let listener = FaasServer::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(listener, async move {
        let _ = rx.await;
    }));

    let response = reqwest::Client::new()
        .post(format!("http://{addr}{REGISTER_PATH}"))
        .header("content-type", "application/json")
        .body(r#"{"name":"audited","code":"secret code"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);
    let event: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(event["event"], "request_audit");
    assert_eq!(event["route"], "register");
    assert_eq!(event["engine_id"], "engine-file");
    assert!(!contents.contains("secret code"));
}

#[test]
fn disabled_audit_needs_no_path() {
    let sink = audit_sink(&AuditConfig {
        enabled: false,
        path: Some("/nonexistent/dir/audit.jsonl".to_string()),
    });
    assert!(sink.is_ok());
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[tokio::test]
async fn shutdown_stops_accepting_requests() {
    let server = LiveServer::start(LIMIT).await;
    let base = server.base_url.clone();
    server.shutdown().await.unwrap();
    let result = reqwest::Client::new().post(format!("{base}{INVOKE_PATH}")).body("{}").send().await;
    assert!(result.is_err());
}
