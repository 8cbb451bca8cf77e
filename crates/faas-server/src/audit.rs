// crates/faas-server/src/audit.rs
// ============================================================================
// Module: Request Audit
// Description: Structured audit events for HTTP requests.
// Purpose: Emit one JSON line per request without logging payloads.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every request handled by the server produces a [`RequestAuditEvent`]. The
//! event records the route, outcome, and sizes, plus the function handle when
//! one is known. Function code and invocation parameters are never recorded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::telemetry::Outcome;
use crate::telemetry::Route;

// ============================================================================
// SECTION: Event
// ============================================================================

/// Audit payload for a single HTTP request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event discriminator.
    pub event: &'static str,
    /// Wall-clock time the event was recorded, in unix milliseconds.
    pub timestamp_ms: u128,
    /// Engine instance that served the request.
    pub engine_id: String,
    /// Route served.
    pub route: Route,
    /// Request outcome.
    pub outcome: Outcome,
    /// HTTP status code returned.
    pub status: u16,
    /// Normalized error kind label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    /// Function handle, when the request named or produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Warm or cold start label for successful invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<&'static str>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
    /// Handling latency in milliseconds.
    pub latency_ms: u128,
}

/// Inputs for [`RequestAuditEvent::new`].
#[derive(Debug, Clone)]
pub struct RequestAuditEventParams {
    /// Engine instance that served the request.
    pub engine_id: String,
    /// Route served.
    pub route: Route,
    /// Request outcome.
    pub outcome: Outcome,
    /// HTTP status code returned.
    pub status: u16,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Function handle.
    pub function: Option<String>,
    /// Warm or cold start label.
    pub start: Option<&'static str>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
    /// Handling latency in milliseconds.
    pub latency_ms: u128,
}

impl RequestAuditEvent {
    /// Creates a new request audit event stamped with the current time.
    #[must_use]
    pub fn new(params: RequestAuditEventParams) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "request_audit",
            timestamp_ms,
            engine_id: params.engine_id,
            route: params.route,
            outcome: params.outcome,
            status: params.status,
            error_kind: params.error_kind,
            function: params.function,
            start: params.start,
            request_bytes: params.request_bytes,
            response_bytes: params.response_bytes,
            latency_ms: params.latency_ms,
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for request events.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &RequestAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &RequestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &RequestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &RequestAuditEvent) {}
}
