// crates/faas-core/src/runtime/mod.rs
// ============================================================================
// Module: FaaS Runtime
// Description: Engine, readiness handshake, cache, cleanup scheduler, and helpers.
// Purpose: Execute registration, invocation, and reclamation against the interfaces.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules hold all orchestration logic. Every outer surface (HTTP,
//! CLI) calls into [`Engine`] and [`CleanupScheduler`] rather than touching
//! the store or container runtime directly.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod cache;
pub mod cleanup;
pub mod clock;
pub mod engine;
pub mod readiness;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::FunctionCache;
pub use cleanup::CleanupConfig;
pub use cleanup::CleanupError;
pub use cleanup::CleanupReport;
pub use cleanup::CleanupScheduler;
pub use cleanup::DEFAULT_CLEANUP_INTERVAL;
pub use cleanup::DEFAULT_IDLE_THRESHOLD;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use engine::Coordination;
pub use engine::CoordinationGuard;
pub use engine::DEFAULT_DISPATCH_TIMEOUT;
pub use engine::DEFAULT_IMAGE;
pub use engine::DEFAULT_LANGUAGE;
pub use engine::DEFAULT_NETWORK;
pub use engine::DEFAULT_SIDECAR_PORT;
pub use engine::Engine;
pub use engine::EngineConfig;
pub use engine::EngineError;
pub use engine::FUNCTION_CODE_ENV;
pub use engine::Invocation;
pub use engine::LABEL_ENGINE_ID;
pub use engine::LABEL_FUNCTION_ID;
pub use engine::LABEL_FUNCTION_NAME;
pub use engine::StartKind;
pub use engine::default_health_check;
pub use engine::generate_engine_id;
pub use readiness::Backoff;
pub use readiness::ReadinessPolicy;
pub use readiness::ReadinessState;
pub use store::InMemoryFunctionStore;
