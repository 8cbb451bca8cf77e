// crates/faas-providers/src/sidecar.rs
// ============================================================================
// Module: HTTP Sidecar Client
// Description: SidecarClient implementation speaking the sidecar HTTP protocol.
// Purpose: Probe readiness and dispatch invocations with strict limits.
// Dependencies: faas-core, reqwest, serde, serde_json
// ============================================================================

//! ## Overview
//! The sidecar inside each function container answers `GET /health` and
//! `POST /invoke`. [`HttpSidecarClient`] addresses it by substituting the
//! function UID into an endpoint template, which on the private container
//! network is simply `http://{uid}:5000`.
//!
//! Every non-success outcome is reported as a distinct [`DispatchFailure`]:
//! status, transport, timeout, malformed body, and application error are never
//! folded into a result value. Response bodies are read up to a size limit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use faas_core::DispatchFailure;
use faas_core::FunctionUid;
use faas_core::SidecarClient;
use faas_core::SidecarError;
use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Placeholder replaced by the function UID in endpoint templates.
pub const UID_PLACEHOLDER: &str = "{uid}";

/// Default endpoint template: the container name on the private network.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "http://{uid}:5000";

/// Health probe path.
const HEALTH_PATH: &str = "/health";

/// Invocation path.
const INVOKE_PATH: &str = "/invoke";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the HTTP sidecar client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpSidecarConfig {
    /// Base URL template; [`UID_PLACEHOLDER`] is replaced by the function UID.
    pub endpoint_template: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Maximum accepted response size, in bytes.
    pub max_response_bytes: usize,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpSidecarConfig {
    fn default() -> Self {
        Self {
            endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_string(),
            request_timeout_ms: 10_000,
            max_response_bytes: 1024 * 1024,
            user_agent: "faas-engine/0.1".to_string(),
        }
    }
}

/// Errors raised while building the sidecar client.
#[derive(Debug, Error)]
pub enum SidecarConfigError {
    /// The endpoint template does not produce an http(s) URL.
    #[error("invalid sidecar endpoint template: {0}")]
    Endpoint(String),
    /// A limit is zero.
    #[error("invalid sidecar limit: {0}")]
    Limit(String),
    /// The HTTP client could not be constructed.
    #[error("sidecar http client build failed: {0}")]
    Client(String),
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// `POST /invoke` request body.
#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    /// Caller parameters, passed through verbatim.
    params: &'a Value,
}

/// `POST /invoke` response body.
#[derive(Debug, Deserialize)]
struct InvokeResponse {
    /// Function result.
    #[serde(default)]
    result: Value,
    /// Application-level error; non-empty means failure.
    #[serde(default)]
    error: Option<String>,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// HTTP implementation of [`SidecarClient`].
#[derive(Debug, Clone)]
pub struct HttpSidecarClient {
    /// Client configuration.
    config: HttpSidecarConfig,
    /// Shared HTTP client.
    client: Client,
}

impl HttpSidecarClient {
    /// Builds a client, validating the endpoint template and limits.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarConfigError`] when the configuration is unusable.
    pub fn new(config: HttpSidecarConfig) -> Result<Self, SidecarConfigError> {
        if config.request_timeout_ms == 0 {
            return Err(SidecarConfigError::Limit("request_timeout_ms must be non-zero".to_string()));
        }
        if config.max_response_bytes == 0 {
            return Err(SidecarConfigError::Limit("max_response_bytes must be non-zero".to_string()));
        }
        let sample = config.endpoint_template.replace(UID_PLACEHOLDER, "probe-1");
        let url = Url::parse(&sample)
            .map_err(|err| SidecarConfigError::Endpoint(format!("{sample}: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SidecarConfigError::Endpoint(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .redirect(Policy::none())
            .no_proxy()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| SidecarConfigError::Client(err.to_string()))?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpSidecarConfig {
        &self.config
    }

    /// Resolves `path` against the endpoint for `host`.
    fn endpoint(&self, host: &FunctionUid, path: &str) -> Result<Url, String> {
        let raw = self.config.endpoint_template.replace(UID_PLACEHOLDER, host.as_str());
        let base = Url::parse(&raw).map_err(|err| format!("{raw}: {err}"))?;
        base.join(path).map_err(|err| format!("{raw}{path}: {err}"))
    }
}

#[async_trait]
impl SidecarClient for HttpSidecarClient {
    async fn health(&self, host: &FunctionUid) -> Result<(), SidecarError> {
        let url = self.endpoint(host, HEALTH_PATH).map_err(SidecarError::Transport)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| SidecarError::Transport(err.to_string()))?;
        let status = response.status();
        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(SidecarError::Status(status.as_u16()))
        }
    }

    async fn invoke(&self, host: &FunctionUid, params: &Value) -> Result<Value, DispatchFailure> {
        let url = self.endpoint(host, INVOKE_PATH).map_err(DispatchFailure::Transport)?;
        let body = serde_json::to_vec(&InvokeRequest {
            params,
        })
        .map_err(|err| DispatchFailure::Encode(err.to_string()))?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport_failure)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(DispatchFailure::Status(status.as_u16()));
        }
        let bytes = read_limited(response, self.config.max_response_bytes).await?;
        let parsed: InvokeResponse = serde_json::from_slice(&bytes)
            .map_err(|err| DispatchFailure::MalformedBody(err.to_string()))?;
        match parsed.error {
            Some(error) if !error.is_empty() => Err(DispatchFailure::Application(error)),
            _ => Ok(parsed.result),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Classifies a request error as a timeout or a transport failure.
fn transport_failure(err: reqwest::Error) -> DispatchFailure {
    if err.is_timeout() {
        DispatchFailure::Timeout
    } else {
        DispatchFailure::Transport(err.to_string())
    }
}

/// Reads a response body, failing once it exceeds `limit` bytes.
async fn read_limited(mut response: Response, limit: usize) -> Result<Vec<u8>, DispatchFailure> {
    let declared = response.content_length().and_then(|len| usize::try_from(len).ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(DispatchFailure::MalformedBody(format!("response exceeds {limit} bytes")));
    }
    let mut body = Vec::with_capacity(declared.unwrap_or(0));
    while let Some(chunk) = response.chunk().await.map_err(transport_failure)? {
        if body.len() + chunk.len() > limit {
            return Err(DispatchFailure::MalformedBody(format!("response exceeds {limit} bytes")));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
