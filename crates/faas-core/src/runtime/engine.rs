// crates/faas-core/src/runtime/engine.rs
// ============================================================================
// Module: FaaS Engine
// Description: Function registration, readiness handshake, and invocation dispatch.
// Purpose: Orchestrate the store, container runtime, and sidecar for every request.
// Dependencies: crate::{core, interfaces, runtime}, rand, tokio, tracing
// ============================================================================

//! ## Overview
//! The engine is the single execution path for registration and invocation.
//! Both operations run inside one exclusive critical section per engine: at
//! most one registration or invocation touches the cache, store, and runtime
//! at a time, and requests observe the lock's acquisition order. The readiness
//! handshake runs inside that section, so a slow cold start delays every other
//! request for its full, bounded duration.
//!
//! Invariants:
//! - Validation happens before any store or runtime call.
//! - A failed provisioning deletes the just-inserted record. No other step compensates.
//! - A UID is returned only after its container id is attached.
//! - Every dispatch failure is reported as [`EngineError::Dispatch`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::Instrument;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use crate::core::ContainerId;
use crate::core::FunctionId;
use crate::core::FunctionRecord;
use crate::core::FunctionUid;
use crate::core::MAX_CODE_LENGTH;
use crate::core::MAX_NAME_LENGTH;
use crate::core::NewFunction;
use crate::core::resolve_uid;
use crate::interfaces::Clock;
use crate::interfaces::ContainerRuntime;
use crate::interfaces::ContainerSpec;
use crate::interfaces::DispatchFailure;
use crate::interfaces::FunctionStore;
use crate::interfaces::HealthCheckSpec;
use crate::interfaces::ResourcePolicy;
use crate::interfaces::RuntimeError;
use crate::interfaces::SidecarClient;
use crate::interfaces::StoreError;
use crate::runtime::cache::FunctionCache;
use crate::runtime::readiness::ReadinessPolicy;
use crate::runtime::readiness::ReadinessState;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default language tag recorded for new functions.
pub const DEFAULT_LANGUAGE: &str = "py";
/// Default sidecar image.
pub const DEFAULT_IMAGE: &str = "faas-base-image";
/// Default private network.
pub const DEFAULT_NETWORK: &str = "faas-net";
/// Default sidecar HTTP port.
pub const DEFAULT_SIDECAR_PORT: u16 = 5000;
/// Default bound on a single dispatch.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Environment variable carrying the function source into the sidecar.
pub const FUNCTION_CODE_ENV: &str = "FUNCTION_CODE";
/// Container label carrying the engine id.
pub const LABEL_ENGINE_ID: &str = "faas.engine_id";
/// Container label carrying the function id.
pub const LABEL_FUNCTION_ID: &str = "faas.function_id";
/// Container label carrying the function name.
pub const LABEL_FUNCTION_NAME: &str = "faas.function_name";
/// Exclusive upper bound of generated engine id numbers.
const ENGINE_ID_RANGE: u32 = 100_000;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Engine instance identifier, stamped on every container.
    pub engine_id: String,
    /// Language tag recorded for new functions.
    pub language: String,
    /// Sidecar image.
    pub image: String,
    /// Private network shared by the engine and its containers.
    pub network: String,
    /// Sidecar HTTP port inside each container.
    pub sidecar_port: u16,
    /// Readiness handshake policy.
    pub readiness: ReadinessPolicy,
    /// Bound on a single dispatch.
    pub dispatch_timeout: Duration,
    /// Resource policy applied to every container.
    pub resources: ResourcePolicy,
    /// Optional runtime health check baked into each container.
    pub health_check: Option<HealthCheckSpec>,
    /// Cache capacity; `None` keeps every record for the engine lifetime.
    pub cache_capacity: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_id: generate_engine_id(),
            language: DEFAULT_LANGUAGE.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            sidecar_port: DEFAULT_SIDECAR_PORT,
            readiness: ReadinessPolicy::default(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            resources: ResourcePolicy::default(),
            health_check: Some(default_health_check(DEFAULT_SIDECAR_PORT)),
            cache_capacity: None,
        }
    }
}

/// Generates an engine id of the form `engine-<n>`.
#[must_use]
pub fn generate_engine_id() -> String {
    let suffix = rand::thread_rng().gen_range(0..ENGINE_ID_RANGE);
    format!("engine-{suffix}")
}

/// Returns the container-level health check for a sidecar listening on `port`.
#[must_use]
pub fn default_health_check(port: u16) -> HealthCheckSpec {
    HealthCheckSpec {
        test: vec![
            "CMD".to_string(),
            "curl".to_string(),
            "-f".to_string(),
            format!("http://localhost:{port}/health"),
        ],
        interval: Duration::from_secs(5),
        timeout: Duration::from_secs(1),
        retries: 3,
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Engine errors. Each variant is a distinct, terminal failure for the request.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller input rejected before any side effect.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Function store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Container creation failed; the function record was rolled back.
    #[error("container provisioning failed: {0}")]
    Provisioning(#[source] RuntimeError),
    /// Unknown UID.
    #[error("function not found: {0}")]
    NotFound(String),
    /// The recorded container does not exist.
    #[error("container for {uid} is missing: {detail}")]
    ContainerMissing {
        /// Function handle.
        uid: FunctionUid,
        /// Runtime detail.
        detail: String,
    },
    /// The container vanished during the readiness handshake.
    #[error("container for {uid} crashed during startup")]
    ContainerCrashed {
        /// Function handle.
        uid: FunctionUid,
    },
    /// The start command failed.
    #[error("failed to start container for {uid}: {source}")]
    Start {
        /// Function handle.
        uid: FunctionUid,
        /// Runtime error.
        #[source]
        source: RuntimeError,
    },
    /// The sidecar did not become healthy in time.
    #[error("container for {uid} not ready within {}ms", .timeout.as_millis())]
    ReadinessTimeout {
        /// Function handle.
        uid: FunctionUid,
        /// Configured bound.
        timeout: Duration,
    },
    /// The sidecar was reached but the invocation failed.
    #[error("invocation failed: {0}")]
    Dispatch(#[from] DispatchFailure),
}

impl EngineError {
    /// Returns a stable label for the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Store(_) => "store",
            Self::Provisioning(_) => "provisioning",
            Self::NotFound(_) => "not_found",
            Self::ContainerMissing {
                ..
            } => "container_missing",
            Self::ContainerCrashed {
                ..
            } => "container_crashed",
            Self::Start {
                ..
            } => "start",
            Self::ReadinessTimeout {
                ..
            } => "readiness_timeout",
            Self::Dispatch(_) => "dispatch",
        }
    }
}

// ============================================================================
// SECTION: Coordination
// ============================================================================

/// Handle to an engine's critical section.
///
/// Holding a [`CoordinationGuard`] excludes every registration and invocation
/// on the engine that issued the handle.
#[derive(Clone)]
pub struct Coordination {
    /// The engine's critical section, which also owns the cache.
    section: Arc<Mutex<FunctionCache>>,
}

impl Coordination {
    /// Waits for the critical section.
    pub async fn acquire(&self) -> CoordinationGuard {
        CoordinationGuard {
            _guard: Arc::clone(&self.section).lock_owned().await,
        }
    }
}

impl fmt::Debug for Coordination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordination").finish_non_exhaustive()
    }
}

/// Guard held while the critical section is owned by a coordinating caller.
pub struct CoordinationGuard {
    /// Owned lock guard; released on drop.
    _guard: OwnedMutexGuard<FunctionCache>,
}

// ============================================================================
// SECTION: Invocation Results
// ============================================================================

/// Whether an invocation had to start its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    /// The container was already running.
    Warm,
    /// The container was started and passed the readiness handshake.
    Cold,
}

impl StartKind {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

/// Successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Sidecar result, verbatim.
    pub result: Value,
    /// Warm or cold path.
    pub start: StartKind,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Shared engine state.
struct EngineInner {
    /// Engine configuration.
    config: EngineConfig,
    /// Function store.
    store: Arc<dyn FunctionStore>,
    /// Container runtime.
    runtime: Arc<dyn ContainerRuntime>,
    /// Sidecar client.
    sidecar: Arc<dyn SidecarClient>,
    /// Usage clock.
    clock: Arc<dyn Clock>,
    /// Critical section guarding the cache and every store/runtime step.
    section: Arc<Mutex<FunctionCache>>,
}

/// FaaS engine. Clones share the same critical section and cache.
#[derive(Clone)]
pub struct Engine {
    /// Shared state.
    inner: Arc<EngineInner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("engine_id", &self.inner.config.engine_id).finish()
    }
}

impl Engine {
    /// Creates an engine over the supplied collaborators.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn FunctionStore>,
        runtime: Arc<dyn ContainerRuntime>,
        sidecar: Arc<dyn SidecarClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = FunctionCache::new(config.cache_capacity);
        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                runtime,
                sidecar,
                clock,
                section: Arc::new(Mutex::new(cache)),
            }),
        }
    }

    /// Returns the engine instance identifier.
    #[must_use]
    pub fn engine_id(&self) -> &str {
        &self.inner.config.engine_id
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns a handle to the engine's critical section.
    #[must_use]
    pub fn coordination(&self) -> Coordination {
        Coordination {
            section: Arc::clone(&self.inner.section),
        }
    }

    /// Returns the number of cached function records.
    pub async fn cached_functions(&self) -> usize {
        self.inner.section.lock().await.len()
    }

    /// Ensures the private network exists.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Provisioning`] when the network cannot be created.
    pub async fn prepare(&self) -> Result<(), EngineError> {
        let network = &self.inner.config.network;
        self.inner.runtime.ensure_network(network).await.map_err(EngineError::Provisioning)?;
        info!(engine_id = %self.engine_id(), network = %network, "engine network ready");
        Ok(())
    }

    /// Registers a function and provisions its container.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for bad input, [`EngineError::Store`]
    /// for persistence failures, and [`EngineError::Provisioning`] when the
    /// container cannot be created.
    pub async fn create_function(&self, name: &str, code: &str) -> Result<FunctionUid, EngineError> {
        validate_function(name, code)?;
        let span = info_span!("create_function", engine_id = %self.engine_id(), name = %name);
        self.create_validated(name, code).instrument(span).await
    }

    /// Invokes a function and returns the sidecar result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for any lookup, readiness, or dispatch failure,
    /// and [`EngineError::Store`] when a cold start cannot record its usage.
    pub async fn invoke_function(&self, uid: &str, params: Value) -> Result<Value, EngineError> {
        self.invoke_function_detailed(uid, params).await.map(|invocation| invocation.result)
    }

    /// Invokes a function and reports whether the cold-start path was taken.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for any lookup, readiness, or dispatch failure,
    /// and [`EngineError::Store`] when a cold start cannot record its usage.
    pub async fn invoke_function_detailed(
        &self,
        uid: &str,
        params: Value,
    ) -> Result<Invocation, EngineError> {
        let params = normalize_params(params)?;
        let span = info_span!("invoke_function", engine_id = %self.engine_id(), uid = %uid);
        self.invoke_validated(uid, params).instrument(span).await
    }

    /// Registration protocol, run under the critical section.
    async fn create_validated(&self, name: &str, code: &str) -> Result<FunctionUid, EngineError> {
        let inner = &self.inner;
        let mut cache = inner.section.lock().await;

        let record = inner.store.insert_function(NewFunction {
            name: name.to_string(),
            language: inner.config.language.clone(),
            code: code.to_string(),
        })?;
        let uid = record.uid();
        debug!(function_id = %record.id, uid = %uid, "function record inserted");

        let spec = self.container_spec(&record, &uid);
        let container_id = match inner.runtime.create(&spec).await {
            Ok(container_id) => container_id,
            Err(err) => {
                warn!(uid = %uid, error = %err, "container provisioning failed; rolling back");
                if let Err(rollback) = inner.store.delete_function(record.id) {
                    error!(
                        function_id = %record.id,
                        error = %rollback,
                        "rollback failed; orphan function record left behind"
                    );
                }
                return Err(EngineError::Provisioning(err));
            }
        };

        if let Err(err) = inner.store.attach_container(record.id, &container_id) {
            error!(
                uid = %uid,
                container_id = %container_id,
                error = %err,
                "failed to attach container; container left without a usable record"
            );
            return Err(err.into());
        }

        let stored = inner.store.get_function(record.id)?.ok_or_else(|| {
            StoreError::Invalid(format!("function {} vanished after attach", record.id))
        })?;
        cache.insert(uid.clone(), stored);
        info!(uid = %uid, container_id = %container_id, "function created");
        Ok(uid)
    }

    /// Invocation protocol, run under the critical section.
    async fn invoke_validated(&self, raw_uid: &str, params: Value) -> Result<Invocation, EngineError> {
        let inner = &self.inner;
        let mut cache = inner.section.lock().await;
        let cache = &mut *cache;

        let uid =
            FunctionUid::parse(raw_uid).ok_or_else(|| EngineError::NotFound(raw_uid.to_string()))?;
        let record = self.lookup(cache, &uid)?;
        let container_id = record.container_id.clone().ok_or_else(|| {
            EngineError::ContainerMissing {
                uid: uid.clone(),
                detail: "no container attached".to_string(),
            }
        })?;

        let start = self.ensure_ready(&uid, &container_id).await?;
        if start == StartKind::Cold
            && let Err(err) = self.record_usage(&container_id, record.id)
        {
            error!(
                uid = %uid,
                container_id = %container_id,
                error = %err,
                "failed to record usage after cold start"
            );
            return Err(err.into());
        }

        let dispatch = inner.sidecar.invoke(&uid, &params);
        let outcome = match tokio::time::timeout(inner.config.dispatch_timeout, dispatch).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DispatchFailure::Timeout),
        };

        match outcome {
            Ok(result) => {
                if let Err(err) = self.record_usage(&container_id, record.id) {
                    error!(
                        uid = %uid,
                        container_id = %container_id,
                        error = %err,
                        "failed to refresh container usage after dispatch"
                    );
                }
                info!(uid = %uid, start = start.as_str(), "function invoked");
                Ok(Invocation {
                    result,
                    start,
                })
            }
            Err(failure) => {
                warn!(uid = %uid, reason = failure.as_str(), error = %failure, "dispatch failed");
                Err(EngineError::Dispatch(failure))
            }
        }
    }

    /// Resolves a UID through the cache, falling back to the store.
    fn lookup(
        &self,
        cache: &mut FunctionCache,
        uid: &FunctionUid,
    ) -> Result<FunctionRecord, EngineError> {
        if let Some(record) = cache.get(uid) {
            return Ok(record);
        }
        let not_found = || EngineError::NotFound(uid.to_string());
        let function_id = FunctionId::parse(resolve_uid(uid.as_str())).ok_or_else(not_found)?;
        let record = self.inner.store.get_function(function_id)?.ok_or_else(not_found)?;
        if record.uid() != *uid {
            return Err(not_found());
        }
        cache.insert(uid.clone(), record.clone());
        Ok(record)
    }

    /// Drives the readiness state machine for one invocation.
    async fn ensure_ready(
        &self,
        uid: &FunctionUid,
        container_id: &ContainerId,
    ) -> Result<StartKind, EngineError> {
        let runtime = &self.inner.runtime;
        let mut tracker = ReadinessTracker::new(uid);

        let state = match runtime.inspect(container_id).await {
            Ok(state) => state,
            Err(err) => {
                tracker.advance(ReadinessState::Failed);
                return Err(EngineError::ContainerMissing {
                    uid: uid.clone(),
                    detail: err.to_string(),
                });
            }
        };
        tracker.advance(ReadinessState::Inspected);

        if state.running {
            tracker.advance(ReadinessState::Running);
            tracker.advance(ReadinessState::Ready);
            return Ok(StartKind::Warm);
        }

        tracker.advance(ReadinessState::Stopped);
        tracker.advance(ReadinessState::Starting);
        if let Err(source) = runtime.start(container_id).await {
            tracker.advance(ReadinessState::Failed);
            return Err(EngineError::Start {
                uid: uid.clone(),
                source,
            });
        }

        tracker.advance(ReadinessState::AwaitingHealth);
        if let Err(err) = self.await_health(uid).await {
            tracker.advance(ReadinessState::Failed);
            return Err(err);
        }
        tracker.advance(ReadinessState::Ready);
        Ok(StartKind::Cold)
    }

    /// Polls the sidecar until healthy, crashed, or out of time.
    async fn await_health(&self, uid: &FunctionUid) -> Result<(), EngineError> {
        let policy = self.inner.config.readiness;
        let deadline = Instant::now() + policy.timeout;
        let mut backoff = policy.backoff();
        let mut attempts: u32 = 0;
        let timed_out = || EngineError::ReadinessTimeout {
            uid: uid.clone(),
            timeout: policy.timeout,
        };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(uid = %uid, attempts, "readiness handshake timed out");
                return Err(timed_out());
            }
            attempts = attempts.saturating_add(1);
            match tokio::time::timeout(remaining, self.inner.sidecar.health(uid)).await {
                Ok(Ok(())) => {
                    debug!(uid = %uid, attempts, "sidecar healthy");
                    return Ok(());
                }
                Ok(Err(err)) => debug!(uid = %uid, attempts, error = %err, "health probe failed"),
                Err(_) => debug!(uid = %uid, attempts, "health probe timed out"),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let listing = self.inner.runtime.list_by_name(uid.as_str());
            match tokio::time::timeout(remaining, listing).await {
                Ok(Ok(containers)) if containers.is_empty() => {
                    warn!(uid = %uid, attempts, "container disappeared during readiness handshake");
                    return Err(EngineError::ContainerCrashed {
                        uid: uid.clone(),
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!(uid = %uid, error = %err, "container listing failed"),
                Err(_) => {
                    warn!(uid = %uid, attempts, "container listing outlived readiness deadline");
                    return Err(timed_out());
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(uid = %uid, attempts, "readiness handshake timed out");
                return Err(timed_out());
            }
            tokio::time::sleep(backoff.next_delay().min(remaining)).await;
        }
    }

    /// Upserts the usage record.
    fn record_usage(
        &self,
        container_id: &ContainerId,
        function_id: FunctionId,
    ) -> Result<(), StoreError> {
        let now = self.inner.clock.now();
        self.inner.store.touch_usage(container_id, function_id, now)
    }

    /// Builds the container definition for a function.
    fn container_spec(&self, record: &FunctionRecord, uid: &FunctionUid) -> ContainerSpec {
        let config = &self.inner.config;
        let labels = BTreeMap::from([
            (LABEL_ENGINE_ID.to_string(), config.engine_id.clone()),
            (LABEL_FUNCTION_ID.to_string(), record.id.to_string()),
            (LABEL_FUNCTION_NAME.to_string(), record.name.clone()),
        ]);
        ContainerSpec {
            name: uid.clone(),
            image: config.image.clone(),
            env: vec![format!("{FUNCTION_CODE_ENV}={}", record.code)],
            labels,
            network: config.network.clone(),
            resources: config.resources.clone(),
            health_check: config.health_check.clone(),
        }
    }
}

// ============================================================================
// SECTION: Readiness Tracking
// ============================================================================

/// Logs readiness transitions for one invocation.
struct ReadinessTracker<'a> {
    /// Function handle.
    uid: &'a FunctionUid,
    /// Current state.
    state: ReadinessState,
}

impl<'a> ReadinessTracker<'a> {
    /// Starts tracking in [`ReadinessState::Unknown`].
    const fn new(uid: &'a FunctionUid) -> Self {
        Self {
            uid,
            state: ReadinessState::Unknown,
        }
    }

    /// Moves to `next`, logging the transition.
    fn advance(&mut self, next: ReadinessState) {
        if !self.state.can_transition_to(next) {
            warn!(uid = %self.uid, from = %self.state, to = %next, "unexpected readiness transition");
        }
        debug!(uid = %self.uid, from = %self.state, to = %next, "readiness transition");
        self.state = next;
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates registration input.
fn validate_function(name: &str, code: &str) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::Validation("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(EngineError::Validation(format!(
            "name exceeds {MAX_NAME_LENGTH} characters"
        )));
    }
    if code.is_empty() {
        return Err(EngineError::Validation("code must not be empty".to_string()));
    }
    if code.chars().count() > MAX_CODE_LENGTH {
        return Err(EngineError::Validation(format!(
            "code exceeds {MAX_CODE_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Normalizes invocation parameters to a JSON object.
fn normalize_params(params: Value) -> Result<Value, EngineError> {
    match params {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(params),
        _ => Err(EngineError::Validation("params must be a JSON object".to_string())),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
