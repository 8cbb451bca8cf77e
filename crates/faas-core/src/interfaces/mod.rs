// crates/faas-core/src/interfaces/mod.rs
// ============================================================================
// Module: FaaS Interfaces
// Description: Capability interfaces for the store, container runtime, and sidecar.
// Purpose: Define the contract surfaces the engine and scheduler depend on.
// Dependencies: crate::core, async-trait, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The engine never talks to a database, a container daemon, or the network
//! directly. It is handed implementations of the traits in this module:
//! [`FunctionStore`] for durable records, [`ContainerRuntime`] for container
//! lifecycle, [`SidecarClient`] for the per-container function runtime, and
//! [`Clock`] for time. Implementations must report failures rather than
//! coerce them into success-shaped values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::ContainerId;
use crate::core::FunctionId;
use crate::core::FunctionRecord;
use crate::core::FunctionUid;
use crate::core::NewFunction;
use crate::core::Timestamp;
use crate::core::UsageRecord;

// ============================================================================
// SECTION: Function Store
// ============================================================================

/// Function store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("function store io error: {0}")]
    Io(String),
    /// Database engine error.
    #[error("function store db error: {0}")]
    Db(String),
    /// Stored or supplied data is invalid.
    #[error("function store invalid data: {0}")]
    Invalid(String),
    /// Write conflicts with existing data.
    #[error("function store conflict: {0}")]
    Conflict(String),
    /// Store reported an error.
    #[error("function store error: {0}")]
    Store(String),
}

/// Durable record of functions and in-use containers.
///
/// Implementations must tolerate concurrent use by the engine and the cleanup
/// scheduler.
pub trait FunctionStore: Send + Sync {
    /// Inserts a function with no container and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_function(&self, function: NewFunction) -> Result<FunctionRecord, StoreError>;

    /// Attaches a provisioned container to a function.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails or the function is missing.
    fn attach_container(
        &self,
        function_id: FunctionId,
        container_id: &ContainerId,
    ) -> Result<(), StoreError>;

    /// Loads a function by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_function(&self, function_id: FunctionId) -> Result<Option<FunctionRecord>, StoreError>;

    /// Deletes a function by id. Deleting a missing function is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_function(&self, function_id: FunctionId) -> Result<(), StoreError>;

    /// Inserts or refreshes the usage record for a container.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn touch_usage(
        &self,
        container_id: &ContainerId,
        function_id: FunctionId,
        used_at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Loads the usage record for a container.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_usage(&self, container_id: &ContainerId) -> Result<Option<UsageRecord>, StoreError>;

    /// Returns usage records last used strictly before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn idle_usage(&self, cutoff: Timestamp) -> Result<Vec<UsageRecord>, StoreError>;

    /// Deletes the usage record for a container. Missing records are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_usage(&self, container_id: &ContainerId) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Container Runtime
// ============================================================================

/// Container runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The container or network does not exist.
    #[error("container runtime object not found: {0}")]
    NotFound(String),
    /// The runtime rejected the request.
    #[error("container runtime api error: {0}")]
    Api(String),
    /// The runtime could not be reached.
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
}

/// Fixed resource and privilege policy applied to every function container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePolicy {
    /// Memory ceiling in bytes.
    pub memory_bytes: i64,
    /// CFS scheduler period in microseconds.
    pub cpu_period: i64,
    /// CFS quota in microseconds per period.
    pub cpu_quota: i64,
    /// Maximum number of processes.
    pub pids_limit: i64,
    /// Mount the root filesystem read-only.
    pub read_only_root_fs: bool,
    /// Writable tmpfs mounts (path to mount options).
    pub tmpfs: BTreeMap<String, String>,
    /// Linux capabilities to drop.
    pub drop_capabilities: Vec<String>,
    /// Security options passed to the runtime.
    pub security_options: Vec<String>,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            memory_bytes: 512 * 1024 * 1024,
            cpu_period: 100_000,
            cpu_quota: 50_000,
            pids_limit: 20,
            read_only_root_fs: true,
            tmpfs: BTreeMap::from([("/tmp".to_string(), "size=100M".to_string())]),
            drop_capabilities: vec!["ALL".to_string()],
            security_options: vec!["no-new-privileges:true".to_string()],
        }
    }
}

/// Runtime-level health check baked into the container definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    /// Command run inside the container.
    pub test: Vec<String>,
    /// Interval between checks.
    pub interval: Duration,
    /// Timeout for a single check.
    pub timeout: Duration,
    /// Consecutive failures before the container is unhealthy.
    pub retries: u32,
}

/// Everything the runtime needs to provision a function container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name; always the function UID.
    pub name: FunctionUid,
    /// Sidecar image.
    pub image: String,
    /// Environment entries (`KEY=value`), including the function code.
    pub env: Vec<String>,
    /// Labels attached to the container.
    pub labels: BTreeMap<String, String>,
    /// Private network the container joins.
    pub network: String,
    /// Resource policy.
    pub resources: ResourcePolicy,
    /// Optional runtime health check.
    pub health_check: Option<HealthCheckSpec>,
}

/// Result of inspecting a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    /// Container identifier.
    pub id: ContainerId,
    /// Whether the container is running.
    pub running: bool,
    /// Runtime status label (for example `created`, `exited`).
    pub status: String,
}

/// Entry returned by a filtered container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Container identifier.
    pub id: ContainerId,
    /// Container names as reported by the runtime.
    pub names: Vec<String>,
    /// Runtime state label.
    pub state: String,
}

/// Container lifecycle operations required by the engine and scheduler.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ensures the private network exists, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when the network cannot be inspected or created.
    async fn ensure_network(&self, network: &str) -> Result<(), RuntimeError>;

    /// Creates (but does not start) a container.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when provisioning fails.
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, RuntimeError>;

    /// Starts a created or stopped container.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when the start command fails.
    async fn start(&self, container_id: &ContainerId) -> Result<(), RuntimeError>;

    /// Stops a running container without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when the stop command fails.
    async fn stop(&self, container_id: &ContainerId) -> Result<(), RuntimeError>;

    /// Inspects a container.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotFound`] when the container vanished.
    async fn inspect(&self, container_id: &ContainerId) -> Result<ContainerState, RuntimeError>;

    /// Lists running containers whose name is exactly `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when the listing fails.
    async fn list_by_name(&self, name: &str) -> Result<Vec<ContainerSummary>, RuntimeError>;
}

// ============================================================================
// SECTION: Sidecar Client
// ============================================================================

/// Health probe failures.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// The sidecar answered with a non-success status.
    #[error("sidecar health status {0}")]
    Status(u16),
    /// The sidecar could not be reached.
    #[error("sidecar unreachable: {0}")]
    Transport(String),
}

/// Reasons an invocation dispatch failed.
///
/// # Invariants
/// - Every variant is a failure; none may be reported as a success result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchFailure {
    /// Parameters could not be encoded.
    #[error("failed to encode invocation: {0}")]
    Encode(String),
    /// The request never produced a response.
    #[error("sidecar transport failure: {0}")]
    Transport(String),
    /// The request exceeded the dispatch timeout.
    #[error("sidecar request timed out")]
    Timeout,
    /// The sidecar answered with a non-success status.
    #[error("sidecar returned status {0}")]
    Status(u16),
    /// The response body was not a valid invocation result.
    #[error("malformed sidecar response: {0}")]
    MalformedBody(String),
    /// The function itself reported an error.
    #[error("function error: {0}")]
    Application(String),
}

impl DispatchFailure {
    /// Returns a stable label for the failure reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode",
            Self::Transport(_) => "transport",
            Self::Timeout => "timeout",
            Self::Status(_) => "status",
            Self::MalformedBody(_) => "malformed_body",
            Self::Application(_) => "application",
        }
    }
}

/// Client for the per-container function runtime.
///
/// `host` is the function UID, which resolves to the container on the
/// private network.
#[async_trait]
pub trait SidecarClient: Send + Sync {
    /// Probes `GET /health`; succeeds only on HTTP 200.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError`] when the sidecar is not ready.
    async fn health(&self, host: &FunctionUid) -> Result<(), SidecarError>;

    /// Sends `POST /invoke` with `{"params": params}` and returns `result`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchFailure`] for any non-success outcome.
    async fn invoke(&self, host: &FunctionUid, params: &Value) -> Result<Value, DispatchFailure>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of usage timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}
