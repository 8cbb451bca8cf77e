// crates/faas-core/tests/common/mod.rs
// ============================================================================
// Module: FaaS Core Test Fixtures
// Description: Scriptable container runtime and sidecar doubles.
// Purpose: Drive engine and scheduler paths deterministically.
// Dependencies: faas-core, async-trait, serde_json, tokio
// ============================================================================

//! ## Overview
//! Fakes record every call so tests can assert both outcomes and side effects.

#![allow(dead_code, reason = "Each test binary uses a subset of the fixtures.")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items,
    missing_docs,
    reason = "Test-only fixtures."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use faas_core::Clock;
use faas_core::ContainerId;
use faas_core::ContainerRuntime;
use faas_core::ContainerSpec;
use faas_core::ContainerState;
use faas_core::ContainerSummary;
use faas_core::DispatchFailure;
use faas_core::Engine;
use faas_core::EngineConfig;
use faas_core::FunctionId;
use faas_core::FunctionRecord;
use faas_core::FunctionStore;
use faas_core::FunctionUid;
use faas_core::InMemoryFunctionStore;
use faas_core::ManualClock;
use faas_core::RuntimeError;
use faas_core::SidecarClient;
use faas_core::NewFunction;
use faas_core::SidecarError;
use faas_core::StoreError;
use faas_core::Timestamp;
use faas_core::UsageRecord;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Fake Runtime
// ============================================================================

/// One fake container.
#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub name: String,
    pub running: bool,
}

/// Mutable fake runtime state.
#[derive(Debug, Default)]
pub struct RuntimeState {
    pub containers: BTreeMap<ContainerId, FakeContainer>,
    pub specs: Vec<ContainerSpec>,
    pub networks: BTreeSet<String>,
    pub fail_create: bool,
    pub fail_start: bool,
    /// Containers exit right after start and disappear from listings.
    pub crash_on_start: bool,
    pub fail_stop: BTreeSet<ContainerId>,
    pub creates: usize,
    pub starts: usize,
    pub stops: Vec<ContainerId>,
    pub lists: usize,
    /// Delay applied to every listing before it answers.
    pub list_delay: Option<Duration>,
}

/// Container runtime double.
#[derive(Debug, Default, Clone)]
pub struct FakeRuntime {
    pub state: Arc<Mutex<RuntimeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut RuntimeState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    pub fn add_container(&self, id: &str, running: bool) -> ContainerId {
        let container_id = ContainerId::new(id);
        self.with(|state| {
            state.containers.insert(
                container_id.clone(),
                FakeContainer {
                    name: id.to_string(),
                    running,
                },
            );
        });
        container_id
    }

    pub fn is_running(&self, id: &ContainerId) -> bool {
        self.with(|state| state.containers.get(id).is_some_and(|container| container.running))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ensure_network(&self, network: &str) -> Result<(), RuntimeError> {
        self.with(|state| state.networks.insert(network.to_string()));
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, RuntimeError> {
        self.with(|state| {
            state.creates += 1;
            state.specs.push(spec.clone());
            if state.fail_create {
                return Err(RuntimeError::Api("image not found".to_string()));
            }
            let container_id = ContainerId::new(format!("cid-{}", spec.name));
            state.containers.insert(
                container_id.clone(),
                FakeContainer {
                    name: spec.name.to_string(),
                    running: false,
                },
            );
            Ok(container_id)
        })
    }

    async fn start(&self, container_id: &ContainerId) -> Result<(), RuntimeError> {
        self.with(|state| {
            state.starts += 1;
            if state.fail_start {
                return Err(RuntimeError::Api("start refused".to_string()));
            }
            let crash = state.crash_on_start;
            let container = state
                .containers
                .get_mut(container_id)
                .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
            container.running = !crash;
            Ok(())
        })
    }

    async fn stop(&self, container_id: &ContainerId) -> Result<(), RuntimeError> {
        self.with(|state| {
            state.stops.push(container_id.clone());
            if state.fail_stop.contains(container_id) {
                return Err(RuntimeError::Api("stop timed out".to_string()));
            }
            let container = state
                .containers
                .get_mut(container_id)
                .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
            container.running = false;
            Ok(())
        })
    }

    async fn inspect(&self, container_id: &ContainerId) -> Result<ContainerState, RuntimeError> {
        self.with(|state| {
            let container = state
                .containers
                .get(container_id)
                .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
            Ok(ContainerState {
                id: container_id.clone(),
                running: container.running,
                status: if container.running { "running" } else { "exited" }.to_string(),
            })
        })
    }

    async fn list_by_name(&self, name: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let delay = self.with(|state| {
            state.lists += 1;
            state.list_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with(|state| {
            Ok(state
                .containers
                .iter()
                .filter(|(_, container)| container.running && container.name == name)
                .map(|(id, container)| ContainerSummary {
                    id: id.clone(),
                    names: vec![format!("/{}", container.name)],
                    state: "running".to_string(),
                })
                .collect())
        })
    }
}

// ============================================================================
// SECTION: Fake Sidecar
// ============================================================================

/// Mutable fake sidecar state.
#[derive(Debug)]
pub struct SidecarState {
    pub healthy: bool,
    pub health_calls: usize,
    pub invoke_calls: Vec<(String, Value)>,
    pub next_failure: Option<DispatchFailure>,
    pub invoke_delay: Option<Duration>,
}

impl Default for SidecarState {
    fn default() -> Self {
        Self {
            healthy: true,
            health_calls: 0,
            invoke_calls: Vec::new(),
            next_failure: None,
            invoke_delay: None,
        }
    }
}

/// Sidecar double: echoes params back as `{"echo": params}`.
#[derive(Debug, Default, Clone)]
pub struct FakeSidecar {
    pub state: Arc<Mutex<SidecarState>>,
}

impl FakeSidecar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SidecarState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }
}

#[async_trait]
impl SidecarClient for FakeSidecar {
    async fn health(&self, _host: &FunctionUid) -> Result<(), SidecarError> {
        self.with(|state| {
            state.health_calls += 1;
            if state.healthy { Ok(()) } else { Err(SidecarError::Status(503)) }
        })
    }

    async fn invoke(&self, host: &FunctionUid, params: &Value) -> Result<Value, DispatchFailure> {
        let delay = self.with(|state| {
            state.invoke_calls.push((host.to_string(), params.clone()));
            state.invoke_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with(|state| match state.next_failure.take() {
            Some(failure) => Err(failure),
            None => Ok(json!({ "echo": params })),
        })
    }
}

// ============================================================================
// SECTION: Faulty Store
// ============================================================================

/// In-memory store whose writes can be made to fail.
#[derive(Debug, Default, Clone)]
pub struct FaultyStore {
    pub inner: InMemoryFunctionStore,
    pub faults: Arc<Mutex<StoreFaults>>,
}

/// Store writes that should fail.
#[derive(Debug, Default)]
pub struct StoreFaults {
    pub fail_attach: bool,
    pub fail_touch: bool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut StoreFaults) -> R) -> R {
        let mut guard = self.faults.lock().unwrap();
        f(&mut guard)
    }
}

impl FunctionStore for FaultyStore {
    fn insert_function(&self, function: NewFunction) -> Result<FunctionRecord, StoreError> {
        self.inner.insert_function(function)
    }

    fn attach_container(
        &self,
        function_id: FunctionId,
        container_id: &ContainerId,
    ) -> Result<(), StoreError> {
        if self.with(|faults| faults.fail_attach) {
            return Err(StoreError::Db("database is locked".to_string()));
        }
        self.inner.attach_container(function_id, container_id)
    }

    fn get_function(&self, function_id: FunctionId) -> Result<Option<FunctionRecord>, StoreError> {
        self.inner.get_function(function_id)
    }

    fn delete_function(&self, function_id: FunctionId) -> Result<(), StoreError> {
        self.inner.delete_function(function_id)
    }

    fn touch_usage(
        &self,
        container_id: &ContainerId,
        function_id: FunctionId,
        used_at: Timestamp,
    ) -> Result<(), StoreError> {
        if self.with(|faults| faults.fail_touch) {
            return Err(StoreError::Db("disk I/O error".to_string()));
        }
        self.inner.touch_usage(container_id, function_id, used_at)
    }

    fn get_usage(&self, container_id: &ContainerId) -> Result<Option<UsageRecord>, StoreError> {
        self.inner.get_usage(container_id)
    }

    fn idle_usage(&self, cutoff: Timestamp) -> Result<Vec<UsageRecord>, StoreError> {
        self.inner.idle_usage(cutoff)
    }

    fn delete_usage(&self, container_id: &ContainerId) -> Result<(), StoreError> {
        self.inner.delete_usage(container_id)
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Engine wired to fakes.
pub struct Harness {
    pub engine: Engine,
    pub store: InMemoryFunctionStore,
    pub runtime: FakeRuntime,
    pub sidecar: FakeSidecar,
    pub clock: ManualClock,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        engine_id: "engine-test".to_string(),
        ..EngineConfig::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = InMemoryFunctionStore::new();
        let runtime = FakeRuntime::new();
        let sidecar = FakeSidecar::new();
        let clock = ManualClock::new(Timestamp::from_unix_millis(1_000_000));
        let engine = Engine::new(
            config,
            Arc::new(store.clone()),
            Arc::new(runtime.clone()),
            Arc::new(sidecar.clone()),
            Arc::new(clock.clone()) as Arc<dyn Clock>,
        );
        Self {
            engine,
            store,
            runtime,
            sidecar,
            clock,
        }
    }
}
