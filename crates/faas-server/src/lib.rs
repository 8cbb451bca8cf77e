// crates/faas-server/src/lib.rs
// ============================================================================
// Module: FaaS Server Library
// Description: HTTP control surface for the FaaS engine.
// Purpose: Expose registration and invocation over HTTP with audit and metrics.
// Dependencies: faas-core, faas-config, axum, tokio
// ============================================================================

//! ## Overview
//! `faas-server` wraps an [`faas_core::Engine`] in an axum router. It owns
//! request marshaling, body limits, per-request audit events, and metrics
//! hooks; every semantic decision stays in the engine.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod server;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::RequestAuditEvent;
pub use audit::RequestAuditEventParams;
pub use audit::StderrAuditSink;
pub use server::FaasServer;
pub use server::INVOKE_PATH;
pub use server::LEGACY_INVOKE_PATH;
pub use server::LEGACY_REGISTER_PATH;
pub use server::REGISTER_PATH;
pub use server::ServerError;
pub use server::audit_sink;
pub use telemetry::NoopMetrics;
pub use telemetry::Outcome;
pub use telemetry::REQUEST_LATENCY_BUCKETS_MS;
pub use telemetry::RequestMetricEvent;
pub use telemetry::Route;
pub use telemetry::ServerMetrics;
