// crates/faas-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Fixtures
// Description: In-process runtime and sidecar doubles plus a live server.
// Purpose: Exercise the HTTP surface end to end on an ephemeral port.
// Dependencies: faas-server, faas-core, async-trait, tokio
// ============================================================================

//! ## Overview
//! The doubles behave like a healthy Docker daemon and sidecar: containers
//! start instantly and invocations echo their parameters. A `"fail"` key in
//! the parameters makes the sidecar report an application error.

#![allow(dead_code, reason = "Each test binary uses a subset of the fixtures.")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items,
    missing_docs,
    reason = "Test-only fixtures."
)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use faas_core::ContainerId;
use faas_core::ContainerRuntime;
use faas_core::ContainerSpec;
use faas_core::ContainerState;
use faas_core::ContainerSummary;
use faas_core::DispatchFailure;
use faas_core::Engine;
use faas_core::EngineConfig;
use faas_core::FunctionUid;
use faas_core::InMemoryFunctionStore;
use faas_core::RuntimeError;
use faas_core::SidecarClient;
use faas_core::SidecarError;
use faas_core::SystemClock;
use faas_server::AuditSink;
use faas_server::FaasServer;
use faas_server::RequestAuditEvent;
use serde_json::Value;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ============================================================================
// SECTION: Doubles
// ============================================================================

/// Runtime double: containers keyed by id, running flag per container.
#[derive(Default, Clone)]
pub struct StubRuntime {
    pub containers: Arc<Mutex<BTreeMap<ContainerId, (String, bool)>>>,
    pub fail_create: Arc<Mutex<bool>>,
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn ensure_network(&self, _network: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, RuntimeError> {
        if *self.fail_create.lock().unwrap() {
            return Err(RuntimeError::Api("image faas-base-image not found".to_string()));
        }
        let id = ContainerId::new(format!("cid-{}", spec.name.as_str()));
        self.containers.lock().unwrap().insert(id.clone(), (spec.name.as_str().to_string(), false));
        Ok(id)
    }

    async fn start(&self, container_id: &ContainerId) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock().unwrap();
        let entry = containers
            .get_mut(container_id)
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
        entry.1 = true;
        Ok(())
    }

    async fn stop(&self, container_id: &ContainerId) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock().unwrap();
        let entry = containers
            .get_mut(container_id)
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
        entry.1 = false;
        Ok(())
    }

    async fn inspect(&self, container_id: &ContainerId) -> Result<ContainerState, RuntimeError> {
        let containers = self.containers.lock().unwrap();
        let (_, running) = containers
            .get(container_id)
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
        Ok(ContainerState {
            id: container_id.clone(),
            running: *running,
            status: if *running { "running" } else { "created" }.to_string(),
        })
    }

    async fn list_by_name(&self, name: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .filter(|(_, (listed, running))| listed == name && *running)
            .map(|(id, (listed, _))| ContainerSummary {
                id: id.clone(),
                names: vec![listed.clone()],
                state: "running".to_string(),
            })
            .collect())
    }
}

/// Sidecar double that echoes parameters.
#[derive(Default, Clone)]
pub struct EchoSidecar;

#[async_trait]
impl SidecarClient for EchoSidecar {
    async fn health(&self, _host: &FunctionUid) -> Result<(), SidecarError> {
        Ok(())
    }

    async fn invoke(&self, _host: &FunctionUid, params: &Value) -> Result<Value, DispatchFailure> {
        if let Some(message) = params.get("fail").and_then(Value::as_str) {
            return Err(DispatchFailure::Application(message.to_string()));
        }
        Ok(json!({ "echo": params }))
    }
}

/// Audit sink that keeps every event in memory.
#[derive(Default, Clone)]
pub struct RecordingAudit {
    pub events: Arc<Mutex<Vec<RequestAuditEvent>>>,
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: &RequestAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Live Server
// ============================================================================

/// A server running on an ephemeral loopback port.
pub struct LiveServer {
    pub base_url: String,
    pub runtime: StubRuntime,
    pub audit: RecordingAudit,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), faas_server::ServerError>>>,
}

impl LiveServer {
    /// Starts a server with the given body limit.
    pub async fn start(max_body_bytes: usize) -> Self {
        let runtime = StubRuntime::default();
        let engine = Engine::new(
            EngineConfig {
                engine_id: "engine-test".to_string(),
                ..EngineConfig::default()
            },
            Arc::new(InMemoryFunctionStore::new()),
            Arc::new(runtime.clone()),
            Arc::new(EchoSidecar),
            Arc::new(SystemClock),
        );
        let audit = RecordingAudit::default();
        let server =
            FaasServer::new(engine, max_body_bytes).with_audit(Arc::new(audit.clone()));
        let listener =
            FaasServer::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(listener, async move {
            let _ = rx.await;
        }));
        Self {
            base_url: format!("http://{addr}"),
            runtime,
            audit,
            client: reqwest::Client::new(),
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    /// Posts a raw body and returns the status and decoded JSON response.
    pub async fn post_raw(&self, path: &str, body: impl Into<reqwest::Body>) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap();
        (status, body)
    }

    /// Posts a JSON value.
    pub async fn post(&self, path: &str, body: &Value) -> (u16, Value) {
        self.post_raw(path, serde_json::to_vec(body).unwrap()).await
    }

    /// Signals shutdown and waits for the server task.
    pub async fn shutdown(mut self) -> Result<(), faas_server::ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.take().unwrap().await.unwrap()
    }
}
