// crates/faas-core/src/lib.rs
// ============================================================================
// Module: FaaS Core Library
// Description: Public API surface for the FaaS engine core.
// Purpose: Expose core types, interfaces, and runtime orchestration.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! FaaS core turns submitted function code into an invocable service backed by
//! a lazily started container, and reclaims containers that go idle. It has no
//! I/O of its own: the function store, container runtime, and sidecar client
//! are supplied through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::Clock;
pub use interfaces::ContainerRuntime;
pub use interfaces::ContainerSpec;
pub use interfaces::ContainerState;
pub use interfaces::ContainerSummary;
pub use interfaces::DispatchFailure;
pub use interfaces::FunctionStore;
pub use interfaces::HealthCheckSpec;
pub use interfaces::ResourcePolicy;
pub use interfaces::RuntimeError;
pub use interfaces::SidecarClient;
pub use interfaces::SidecarError;
pub use interfaces::StoreError;
pub use runtime::Backoff;
pub use runtime::CleanupConfig;
pub use runtime::CleanupError;
pub use runtime::CleanupReport;
pub use runtime::CleanupScheduler;
pub use runtime::Coordination;
pub use runtime::CoordinationGuard;
pub use runtime::DEFAULT_CLEANUP_INTERVAL;
pub use runtime::DEFAULT_DISPATCH_TIMEOUT;
pub use runtime::DEFAULT_IDLE_THRESHOLD;
pub use runtime::DEFAULT_IMAGE;
pub use runtime::DEFAULT_LANGUAGE;
pub use runtime::DEFAULT_NETWORK;
pub use runtime::DEFAULT_SIDECAR_PORT;
pub use runtime::Engine;
pub use runtime::EngineConfig;
pub use runtime::EngineError;
pub use runtime::FUNCTION_CODE_ENV;
pub use runtime::FunctionCache;
pub use runtime::InMemoryFunctionStore;
pub use runtime::Invocation;
pub use runtime::LABEL_ENGINE_ID;
pub use runtime::LABEL_FUNCTION_ID;
pub use runtime::LABEL_FUNCTION_NAME;
pub use runtime::ManualClock;
pub use runtime::ReadinessPolicy;
pub use runtime::ReadinessState;
pub use runtime::StartKind;
pub use runtime::SystemClock;
pub use runtime::default_health_check;
pub use runtime::generate_engine_id;
