// crates/faas-server/src/server.rs
// ============================================================================
// Module: FaaS HTTP Server
// Description: axum routes for function registration and invocation.
// Purpose: Marshal HTTP requests into engine calls with bounded bodies.
// Dependencies: faas-core, faas-config, axum, tokio
// ============================================================================

//! ## Overview
//! The server is a thin marshaling layer over [`Engine`]. It exposes
//! `POST /register` and `POST /invoke`, plus the historical
//! `/api/functions/v1/create` and `/api/functions/v1/invoke` aliases.
//! Request bodies are bounded by `max_body_bytes`. Engine failures map to
//! `500` with a terse message and a stable `kind` label; full error detail is
//! logged, never returned. Each request emits one audit event and one metric
//! event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use faas_config::AuditConfig;
use faas_config::ServerConfig;
use faas_core::DispatchFailure;
use faas_core::Engine;
use faas_core::EngineError;
use faas_core::FunctionUid;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;
use tracing::warn;

use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::RequestAuditEvent;
use crate::audit::RequestAuditEventParams;
use crate::audit::StderrAuditSink;
use crate::telemetry::NoopMetrics;
use crate::telemetry::Outcome;
use crate::telemetry::RequestMetricEvent;
use crate::telemetry::Route;
use crate::telemetry::ServerMetrics;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Registration path.
pub const REGISTER_PATH: &str = "/register";
/// Historical registration path.
pub const LEGACY_REGISTER_PATH: &str = "/api/functions/v1/create";
/// Invocation path.
pub const INVOKE_PATH: &str = "/invoke";
/// Historical invocation path.
pub const LEGACY_INVOKE_PATH: &str = "/api/functions/v1/invoke";

/// Error kind for unreadable or malformed request bodies.
const KIND_BAD_REQUEST: &str = "bad_request";
/// Error kind for oversized request bodies.
const KIND_PAYLOAD_TOO_LARGE: &str = "payload_too_large";

/// Response written if a reply cannot be serialized.
const SERIALIZATION_FALLBACK: &[u8] =
    br#"{"error":"response serialization failed","kind":"internal"}"#;

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP control surface over an [`Engine`].
#[derive(Clone)]
pub struct FaasServer {
    /// Engine handling every request.
    engine: Engine,
    /// Maximum accepted request body size.
    max_body_bytes: usize,
    /// Request audit sink.
    audit: Arc<dyn AuditSink>,
    /// Request metrics sink.
    metrics: Arc<dyn ServerMetrics>,
}

impl FaasServer {
    /// Creates a server with audit and metrics disabled.
    #[must_use]
    pub fn new(engine: Engine, max_body_bytes: usize) -> Self {
        Self {
            engine,
            max_body_bytes,
            audit: Arc::new(NoopAuditSink),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Creates a server from validated server configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Init`] when the audit log cannot be opened.
    pub fn from_config(config: &ServerConfig, engine: Engine) -> Result<Self, ServerError> {
        let audit = audit_sink(&config.audit)?;
        Ok(Self::new(engine, config.max_body_bytes).with_audit(audit))
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn ServerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = Arc::new(ServerState {
            engine: self.engine.clone(),
            max_body_bytes: self.max_body_bytes,
            audit: Arc::clone(&self.audit),
            metrics: Arc::clone(&self.metrics),
        });
        Router::new()
            .route(REGISTER_PATH, post(handle_register))
            .route(LEGACY_REGISTER_PATH, post(handle_register))
            .route(INVOKE_PATH, post(handle_invoke))
            .route(LEGACY_INVOKE_PATH, post(handle_invoke))
            .layer(DefaultBodyLimit::max(self.max_body_bytes.saturating_add(1)))
            .with_state(state)
    }

    /// Binds a TCP listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
        TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind failed on {addr}: {err}")))
    }

    /// Serves requests on `listener` until `shutdown` resolves, then drains
    /// in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when the server fails.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|err| ServerError::Transport(format!("listener address: {err}")))?;
        info!(
            addr = %local,
            engine_id = self.engine.engine_id(),
            max_body_bytes = self.max_body_bytes,
            "faas server listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))?;
        info!("faas server stopped");
        Ok(())
    }
}

/// Builds the audit sink selected by configuration.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the audit file cannot be opened.
pub fn audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileAuditSink::new(Path::new(path))
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Request Handling
// ============================================================================

/// Shared state for request handlers.
struct ServerState {
    /// Engine handling every request.
    engine: Engine,
    /// Maximum accepted request body size.
    max_body_bytes: usize,
    /// Request audit sink.
    audit: Arc<dyn AuditSink>,
    /// Request metrics sink.
    metrics: Arc<dyn ServerMetrics>,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
struct RegisterRequest {
    /// Human-readable function name.
    name: String,
    /// Function source code.
    code: String,
}

/// Invocation request body.
#[derive(Debug, Deserialize)]
struct InvokeRequest {
    /// Function handle.
    name: String,
    /// Invocation parameters; absent or null means `{}`.
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

/// Handler outcome before serialization.
struct Reply {
    /// HTTP status.
    status: StatusCode,
    /// JSON body.
    body: Value,
    /// Error kind label for failures.
    error_kind: Option<&'static str>,
    /// Function handle for the audit trail.
    function: Option<String>,
    /// Warm or cold start label.
    start: Option<&'static str>,
}

impl Reply {
    /// Builds a success reply wrapping `result`.
    fn success(status: StatusCode, result: Value) -> Self {
        Self {
            status,
            body: json!({ "result": result }),
            error_kind: None,
            function: None,
            start: None,
        }
    }

    /// Builds a failure reply.
    fn failure(status: StatusCode, kind: &'static str, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message, "kind": kind }),
            error_kind: Some(kind),
            function: None,
            start: None,
        }
    }

    /// Builds the `500` reply for an engine failure.
    fn engine_failure(route: Route, err: &EngineError) -> Self {
        warn!(route = route.as_str(), kind = err.kind(), error = %err, "request failed");
        Self::failure(StatusCode::INTERNAL_SERVER_ERROR, err.kind(), &public_message(err))
    }

    /// Attaches a function handle for the audit trail.
    fn with_function(mut self, function: Option<String>) -> Self {
        self.function = function;
        self
    }
}

/// Handles `POST /register`.
async fn handle_register(
    State(state): State<Arc<ServerState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let started = Instant::now();
    let request_bytes = body.as_ref().map_or(0, Bytes::len);
    let reply = match decode_body::<RegisterRequest>(state.max_body_bytes, body) {
        Ok(request) => match state.engine.create_function(&request.name, &request.code).await {
            Ok(uid) => Reply::success(StatusCode::CREATED, Value::String(uid.as_str().to_string()))
                .with_function(Some(uid.as_str().to_string())),
            Err(err) => Reply::engine_failure(Route::Register, &err),
        },
        Err(reply) => reply,
    };
    state.respond(Route::Register, request_bytes, reply, started)
}

/// Handles `POST /invoke`.
async fn handle_invoke(
    State(state): State<Arc<ServerState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let started = Instant::now();
    let request_bytes = body.as_ref().map_or(0, Bytes::len);
    let reply = match decode_body::<InvokeRequest>(state.max_body_bytes, body) {
        Ok(request) => {
            let function = FunctionUid::parse(&request.name).map(|uid| uid.as_str().to_string());
            let params = Value::Object(request.params.unwrap_or_default());
            match state.engine.invoke_function_detailed(&request.name, params).await {
                Ok(invocation) => {
                    let mut reply = Reply::success(StatusCode::OK, invocation.result);
                    reply.start = Some(invocation.start.as_str());
                    reply.with_function(function)
                }
                Err(err) => Reply::engine_failure(Route::Invoke, &err).with_function(function),
            }
        }
        Err(reply) => reply,
    };
    state.respond(Route::Invoke, request_bytes, reply, started)
}

impl ServerState {
    /// Serializes a reply and records its audit and metric events.
    fn respond(
        &self,
        route: Route,
        request_bytes: usize,
        reply: Reply,
        started: Instant,
    ) -> Response {
        let payload =
            serde_json::to_vec(&reply.body).unwrap_or_else(|_| SERIALIZATION_FALLBACK.to_vec());
        let outcome = if reply.status.is_success() { Outcome::Ok } else { Outcome::Error };
        let latency = started.elapsed();
        let metric = RequestMetricEvent {
            route,
            outcome,
            status: reply.status.as_u16(),
            error_kind: reply.error_kind,
            start: reply.start,
            request_bytes,
            response_bytes: payload.len(),
        };
        self.metrics.record_request(&metric);
        self.metrics.record_latency(&metric, latency);
        self.audit.record(&RequestAuditEvent::new(RequestAuditEventParams {
            engine_id: self.engine.engine_id().to_string(),
            route,
            outcome,
            status: metric.status,
            error_kind: reply.error_kind,
            function: reply.function,
            start: reply.start,
            request_bytes,
            response_bytes: metric.response_bytes,
            latency_ms: latency.as_millis(),
        }));
        (reply.status, [(CONTENT_TYPE, HeaderValue::from_static("application/json"))], payload)
            .into_response()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads and decodes a bounded JSON request body.
fn decode_body<T: DeserializeOwned>(
    max_body_bytes: usize,
    body: Result<Bytes, BytesRejection>,
) -> Result<T, Reply> {
    let too_large = || {
        Reply::failure(
            StatusCode::PAYLOAD_TOO_LARGE,
            KIND_PAYLOAD_TOO_LARGE,
            "request body exceeds limit",
        )
    };
    let bytes = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            Reply::failure(StatusCode::BAD_REQUEST, KIND_BAD_REQUEST, "unreadable request body")
        }
    })?;
    if bytes.len() > max_body_bytes {
        return Err(too_large());
    }
    serde_json::from_slice(&bytes).map_err(|_| {
        Reply::failure(StatusCode::BAD_REQUEST, KIND_BAD_REQUEST, "malformed request body")
    })
}

/// Returns the caller-facing message for an engine error.
///
/// Store, runtime, and transport details stay in the logs.
fn public_message(err: &EngineError) -> String {
    match err {
        EngineError::Store(_) => "function store failure".to_string(),
        EngineError::Provisioning(_) => "container provisioning failed".to_string(),
        EngineError::ContainerMissing {
            uid,
            ..
        } => format!("container for {uid} is missing"),
        EngineError::Start {
            uid,
            ..
        } => format!("failed to start container for {uid}"),
        EngineError::Dispatch(
            failure @ (DispatchFailure::Transport(_)
            | DispatchFailure::Encode(_)
            | DispatchFailure::MalformedBody(_)),
        ) => format!("invocation failed: {}", failure.as_str()),
        EngineError::Validation(_)
        | EngineError::NotFound(_)
        | EngineError::ContainerCrashed {
            ..
        }
        | EngineError::ReadinessTimeout {
            ..
        }
        | EngineError::Dispatch(_) => err.to_string(),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
