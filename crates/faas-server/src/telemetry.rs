// crates/faas-server/src/telemetry.rs
// ============================================================================
// Module: Server Telemetry
// Description: Observability hooks for the HTTP control surface.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A thin metrics interface for request counters and latency histograms.
//! Deployments plug in their own exporter by implementing [`ServerMetrics`];
//! the default [`NoopMetrics`] discards everything. Labels never carry
//! function code or invocation parameters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
///
/// Cold starts wait up to the readiness bound plus the dispatch timeout, so
/// the upper buckets reach past 20 seconds.
pub const REQUEST_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 20_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Request route classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Function registration.
    Register,
    /// Function invocation.
    Invoke,
}

impl Route {
    /// Returns a stable label for the route.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Invoke => "invoke",
        }
    }
}

/// Request outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The request succeeded.
    Ok,
    /// The request failed.
    Error,
}

impl Outcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Metric event payload for a single request.
#[derive(Debug, Clone)]
pub struct RequestMetricEvent {
    /// Route served.
    pub route: Route,
    /// Request outcome.
    pub outcome: Outcome,
    /// HTTP status code returned.
    pub status: u16,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Warm or cold start label for successful invocations.
    pub start: Option<&'static str>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for HTTP requests and latencies.
pub trait ServerMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: &RequestMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: &RequestMetricEvent, latency: Duration);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl ServerMetrics for NoopMetrics {
    fn record_request(&self, _event: &RequestMetricEvent) {}

    fn record_latency(&self, _event: &RequestMetricEvent, _latency: Duration) {}
}
