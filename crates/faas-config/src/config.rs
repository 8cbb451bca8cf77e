// crates/faas-config/src/config.rs
// ============================================================================
// Module: FaaS Configuration
// Description: Configuration loading, environment overrides, and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: faas-core, faas-providers, faas-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits,
//! then overlaid with the environment variables the deployment has always
//! used (`ENGINE_ID`, `CLEANUP_INTERVAL`, `DELETE_AFTER`, `FAAS_DB_PATH`).
//! Every section has defaults, so an absent default config file yields a
//! working single-node setup. Invalid values fail closed at startup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use faas_core::CleanupConfig;
use faas_core::EngineConfig;
use faas_core::MAX_LANGUAGE_LENGTH;
use faas_core::ReadinessPolicy;
use faas_core::ResourcePolicy;
use faas_core::default_health_check;
use faas_core::generate_engine_id;
use faas_providers::DockerConnection;
use faas_providers::DockerRuntimeConfig;
use faas_providers::HttpSidecarConfig;
use faas_providers::UID_PLACEHOLDER;
use faas_store_sqlite::ConnectRetry;
use faas_store_sqlite::SqliteStoreConfig;
use faas_store_sqlite::SqliteStoreMode;
use faas_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "faas.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "FAAS_CONFIG";
/// Environment variable overriding the engine id.
pub const ENGINE_ID_ENV_VAR: &str = "ENGINE_ID";
/// Environment variable overriding the cleanup interval (Go duration).
pub const CLEANUP_INTERVAL_ENV_VAR: &str = "CLEANUP_INTERVAL";
/// Environment variable overriding the idle threshold (Go duration).
pub const DELETE_AFTER_ENV_VAR: &str = "DELETE_AFTER";
/// Environment variable overriding the store database path.
pub const DB_PATH_ENV_VAR: &str = "FAAS_DB_PATH";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum accepted request body size in bytes.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Maximum engine id length.
pub(crate) const MAX_ENGINE_ID_LENGTH: usize = 128;
/// Maximum store connect attempts.
pub(crate) const MAX_CONNECT_ATTEMPTS: u32 = 100;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// FaaS engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FaasConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineSection,
    /// Cleanup scheduler configuration.
    #[serde(default)]
    pub cleanup: CleanupSection,
    /// Function store configuration.
    #[serde(default)]
    pub store: StoreSection,
    /// Container runtime connection.
    #[serde(default)]
    pub runtime: DockerRuntimeConfig,
    /// Sidecar client configuration.
    #[serde(default)]
    pub sidecar: SidecarSection,
}

impl FaasConfig {
    /// Loads configuration from disk, applies environment overrides, and
    /// validates the result.
    ///
    /// An explicit `path` (or `FAAS_CONFIG`) must exist. When neither is given
    /// and `faas.toml` is absent from the working directory, defaults are used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path)? {
            Some(resolved) => Self::read(&resolved)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not valid config TOML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Reads and parses a config file with size and encoding limits.
    fn read(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::parse(content)
    }

    /// Overlays environment variables read through `lookup`.
    ///
    /// Blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a duration value is malformed.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(engine_id) = lookup(ENGINE_ID_ENV_VAR) {
            self.engine.engine_id = Some(engine_id.trim().to_string());
        }
        if let Some(raw) = lookup(CLEANUP_INTERVAL_ENV_VAR) {
            self.cleanup.interval_secs = whole_seconds(CLEANUP_INTERVAL_ENV_VAR, &raw)?;
        }
        if let Some(raw) = lookup(DELETE_AFTER_ENV_VAR) {
            self.cleanup.idle_threshold_secs = whole_seconds(DELETE_AFTER_ENV_VAR, &raw)?;
        }
        if let Some(path) = lookup(DB_PATH_ENV_VAR) {
            self.store.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.engine.validate()?;
        self.cleanup.validate()?;
        self.store.validate()?;
        validate_runtime(&self.runtime)?;
        self.sidecar.validate()?;
        Ok(())
    }

    /// Builds the engine configuration, generating an engine id when unset.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let engine = &self.engine;
        EngineConfig {
            engine_id: engine.engine_id.clone().unwrap_or_else(generate_engine_id),
            language: engine.language.clone(),
            image: engine.image.clone(),
            network: engine.network.clone(),
            sidecar_port: engine.sidecar_port,
            readiness: engine.readiness.policy(),
            dispatch_timeout: Duration::from_millis(engine.dispatch_timeout_ms),
            resources: engine.resources.policy(),
            health_check: engine.health_check.then(|| default_health_check(engine.sidecar_port)),
            cache_capacity: engine.cache_capacity,
        }
    }

    /// Builds the cleanup scheduler configuration.
    #[must_use]
    pub const fn cleanup_config(&self) -> CleanupConfig {
        self.cleanup.config()
    }

    /// Builds the `SQLite` store configuration.
    #[must_use]
    pub fn store_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.store.path.clone(),
            busy_timeout_ms: self.store.busy_timeout_ms,
            journal_mode: self.store.journal_mode,
            sync_mode: self.store.sync_mode,
        }
    }

    /// Returns the store open retry policy.
    #[must_use]
    pub const fn connect_retry(&self) -> ConnectRetry {
        ConnectRetry {
            attempts: self.store.connect_attempts,
            delay: Duration::from_millis(self.store.connect_delay_ms),
        }
    }

    /// Builds the sidecar client configuration.
    ///
    /// Without an explicit template the sidecar is addressed by container
    /// name on the configured sidecar port.
    #[must_use]
    pub fn sidecar_config(&self) -> HttpSidecarConfig {
        let endpoint_template = self.sidecar.endpoint_template.clone().unwrap_or_else(|| {
            format!("http://{UID_PLACEHOLDER}:{}", self.engine.sidecar_port)
        });
        HttpSidecarConfig {
            endpoint_template,
            request_timeout_ms: self.sidecar.request_timeout_ms,
            max_response_bytes: self.sidecar.max_response_bytes,
            ..HttpSidecarConfig::default()
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Request audit configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            audit: AuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is invalid: {}", self.bind)))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid("server.max_body_bytes exceeds limit".to_string()));
        }
        self.audit.validate()
    }
}

/// Request audit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Emit one audit line per request.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Append audit lines to this file instead of stderr.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Engine configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Engine id; generated at startup when unset.
    #[serde(default)]
    pub engine_id: Option<String>,
    /// Language tag recorded for new functions.
    #[serde(default = "default_language")]
    pub language: String,
    /// Sidecar image.
    #[serde(default = "default_image")]
    pub image: String,
    /// Private container network.
    #[serde(default = "default_network")]
    pub network: String,
    /// Sidecar port inside each container.
    #[serde(default = "default_sidecar_port")]
    pub sidecar_port: u16,
    /// Dispatch timeout in milliseconds.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// Function cache capacity; unset keeps every record.
    #[serde(default)]
    pub cache_capacity: Option<usize>,
    /// Bake a container-level health check into each container.
    #[serde(default = "default_true")]
    pub health_check: bool,
    /// Readiness handshake policy.
    #[serde(default)]
    pub readiness: ReadinessSection,
    /// Container resource policy.
    #[serde(default)]
    pub resources: ResourcesSection,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            engine_id: None,
            language: default_language(),
            image: default_image(),
            network: default_network(),
            sidecar_port: default_sidecar_port(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            cache_capacity: None,
            health_check: true,
            readiness: ReadinessSection::default(),
            resources: ResourcesSection::default(),
        }
    }
}

impl EngineSection {
    /// Validates engine configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(engine_id) = &self.engine_id {
            let trimmed = engine_id.trim();
            if trimmed.is_empty() || trimmed.len() > MAX_ENGINE_ID_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "engine.engine_id must be 1..={MAX_ENGINE_ID_LENGTH} characters"
                )));
            }
        }
        if self.language.trim().is_empty() || self.language.chars().count() > MAX_LANGUAGE_LENGTH
        {
            return Err(ConfigError::Invalid(format!(
                "engine.language must be 1..={MAX_LANGUAGE_LENGTH} characters"
            )));
        }
        require_non_empty("engine.image", &self.image)?;
        require_non_empty("engine.network", &self.network)?;
        if self.sidecar_port == 0 {
            return Err(ConfigError::Invalid("engine.sidecar_port must be non-zero".to_string()));
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.dispatch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.readiness.validate()?;
        self.resources.validate()
    }
}

/// Readiness handshake section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadinessSection {
    /// First wait between health probes, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Ceiling for any single wait, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Backoff growth factor.
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
    /// Overall handshake bound, in milliseconds.
    #[serde(default = "default_readiness_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_backoff_multiplier(),
            timeout_ms: default_readiness_timeout_ms(),
        }
    }
}

impl ReadinessSection {
    /// Converts the section into a readiness policy.
    #[must_use]
    pub const fn policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Validates the backoff shape and bound.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.readiness.initial_backoff_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "engine.readiness.max_backoff_ms must be >= initial_backoff_ms".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "engine.readiness.multiplier must be a finite value >= 1.0".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.readiness.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Container resource policy section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourcesSection {
    /// Memory ceiling in bytes.
    pub memory_bytes: i64,
    /// CPU CFS period in microseconds.
    pub cpu_period: i64,
    /// CPU CFS quota in microseconds.
    pub cpu_quota: i64,
    /// Process count ceiling.
    pub pids_limit: i64,
    /// Mount the root filesystem read-only.
    pub read_only_root_fs: bool,
    /// Tmpfs mounts keyed by path.
    pub tmpfs: BTreeMap<String, String>,
    /// Capabilities to drop.
    pub drop_capabilities: Vec<String>,
    /// Security options.
    pub security_options: Vec<String>,
}

impl Default for ResourcesSection {
    fn default() -> Self {
        let policy = ResourcePolicy::default();
        Self {
            memory_bytes: policy.memory_bytes,
            cpu_period: policy.cpu_period,
            cpu_quota: policy.cpu_quota,
            pids_limit: policy.pids_limit,
            read_only_root_fs: policy.read_only_root_fs,
            tmpfs: policy.tmpfs,
            drop_capabilities: policy.drop_capabilities,
            security_options: policy.security_options,
        }
    }
}

impl ResourcesSection {
    /// Converts the section into a resource policy.
    #[must_use]
    pub fn policy(&self) -> ResourcePolicy {
        ResourcePolicy {
            memory_bytes: self.memory_bytes,
            cpu_period: self.cpu_period,
            cpu_quota: self.cpu_quota,
            pids_limit: self.pids_limit,
            read_only_root_fs: self.read_only_root_fs,
            tmpfs: self.tmpfs.clone(),
            drop_capabilities: self.drop_capabilities.clone(),
            security_options: self.security_options.clone(),
        }
    }

    /// Validates that every ceiling is set.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("memory_bytes", self.memory_bytes),
            ("cpu_period", self.cpu_period),
            ("cpu_quota", self.cpu_quota),
            ("pids_limit", self.pids_limit),
        ] {
            if value <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "engine.resources.{field} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Cleanup
// ============================================================================

/// Cleanup scheduler section.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupSection {
    /// Run the scheduler inside `faas serve`.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between ticks.
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
    /// Idle seconds after which a container is reclaimed.
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
}

impl Default for CleanupSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_cleanup_interval_secs(),
            idle_threshold_secs: default_idle_threshold_secs(),
        }
    }
}

impl CleanupSection {
    /// Converts the section into a scheduler configuration.
    #[must_use]
    pub const fn config(&self) -> CleanupConfig {
        CleanupConfig {
            interval: Duration::from_secs(self.interval_secs),
            idle_threshold: Duration::from_secs(self.idle_threshold_secs),
        }
    }

    /// Validates scheduler timing.
    fn validate(&self) -> Result<(), ConfigError> {
        self.config().validate().map_err(|err| ConfigError::Invalid(format!("cleanup: {err}")))
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Function store section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// `SQLite` database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Open attempts at startup.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Delay between open attempts, in milliseconds.
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            connect_attempts: default_connect_attempts(),
            connect_delay_ms: default_connect_delay_ms(),
        }
    }
}

impl StoreSection {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("store.path", &self.path.to_string_lossy())?;
        if self.connect_attempts == 0 || self.connect_attempts > MAX_CONNECT_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "store.connect_attempts must be 1..={MAX_CONNECT_ATTEMPTS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Sidecar
// ============================================================================

/// Sidecar client section.
#[derive(Debug, Clone, Deserialize)]
pub struct SidecarSection {
    /// Endpoint template containing `{uid}`; defaults to the container name
    /// on `engine.sidecar_port`.
    #[serde(default)]
    pub endpoint_template: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_sidecar_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum sidecar response size in bytes.
    #[serde(default = "default_sidecar_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for SidecarSection {
    fn default() -> Self {
        Self {
            endpoint_template: None,
            request_timeout_ms: default_sidecar_request_timeout_ms(),
            max_response_bytes: default_sidecar_max_response_bytes(),
        }
    }
}

impl SidecarSection {
    /// Validates sidecar limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(template) = &self.endpoint_template {
            require_non_empty("sidecar.endpoint_template", template)?;
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sidecar.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::Invalid(
                "sidecar.max_response_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Durations
// ============================================================================

/// Parses a Go-style duration string such as `300s`, `5m`, or `1h30m`.
///
/// Supported units are `ns`, `us`, `µs`, `ms`, `s`, `m`, and `h`; each number
/// may carry a decimal fraction. A bare `0` is accepted.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for empty, signed, or unit-less input.
pub fn parse_go_duration(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::Invalid(format!("invalid duration: {raw:?}"));
    let text = raw.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err(invalid());
    }
    let mut total_nanos: f64 = 0.0;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len =
            rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[.. number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len ..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(rest.len());
        let scale = match &rest[.. unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len ..];
        total_nanos += value * scale;
    }
    Duration::try_from_secs_f64(total_nanos / 1e9).map_err(|_| invalid())
}

/// Parses a Go duration from an environment variable as whole seconds.
fn whole_seconds(variable: &str, raw: &str) -> Result<u64, ConfigError> {
    let duration = parse_go_duration(raw)
        .map_err(|err| ConfigError::Invalid(format!("{variable}: {err}")))?;
    if duration.subsec_nanos() != 0 {
        return Err(ConfigError::Invalid(format!("{variable} must be a whole number of seconds")));
    }
    Ok(duration.as_secs())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment; `None` means defaults.
fn resolve_path(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    let default_path = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(default_path.is_file().then_some(default_path))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Rejects blank strings.
fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    Ok(())
}

/// Validates the Docker connection settings.
fn validate_runtime(runtime: &DockerRuntimeConfig) -> Result<(), ConfigError> {
    if runtime.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "runtime.timeout_secs must be greater than zero".to_string(),
        ));
    }
    match &runtime.connection {
        DockerConnection::LocalDefaults => Ok(()),
        DockerConnection::Socket {
            path,
        } => validate_path_string("runtime.connection.path", path),
        DockerConnection::Http {
            address,
        } => require_non_empty("runtime.connection.address", address),
    }
}

/// Default bind address.
fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Default maximum request body size in bytes.
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Serde default for opt-out flags.
const fn default_true() -> bool {
    true
}

/// Default language tag.
fn default_language() -> String {
    faas_core::DEFAULT_LANGUAGE.to_string()
}

/// Default sidecar image.
fn default_image() -> String {
    faas_core::DEFAULT_IMAGE.to_string()
}

/// Default container network.
fn default_network() -> String {
    faas_core::DEFAULT_NETWORK.to_string()
}

/// Default sidecar port.
const fn default_sidecar_port() -> u16 {
    faas_core::DEFAULT_SIDECAR_PORT
}

/// Default dispatch timeout in milliseconds.
const fn default_dispatch_timeout_ms() -> u64 {
    10_000
}

/// Default initial backoff in milliseconds.
const fn default_initial_backoff_ms() -> u64 {
    500
}

/// Default backoff ceiling in milliseconds.
const fn default_max_backoff_ms() -> u64 {
    5_000
}

/// Default backoff multiplier.
const fn default_backoff_multiplier() -> f64 {
    1.5
}

/// Default readiness bound in milliseconds.
const fn default_readiness_timeout_ms() -> u64 {
    10_000
}

/// Default cleanup interval in seconds.
const fn default_cleanup_interval_secs() -> u64 {
    300
}

/// Default idle threshold in seconds.
const fn default_idle_threshold_secs() -> u64 {
    600
}

/// Default store path.
fn default_store_path() -> PathBuf {
    PathBuf::from("faas.sqlite")
}

/// Default `SQLite` busy timeout in milliseconds.
const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

/// Default store open attempts.
const fn default_connect_attempts() -> u32 {
    10
}

/// Default delay between store open attempts, in milliseconds.
const fn default_connect_delay_ms() -> u64 {
    3_000
}

/// Default sidecar request timeout in milliseconds.
const fn default_sidecar_request_timeout_ms() -> u64 {
    10_000
}

/// Default sidecar response ceiling in bytes.
const fn default_sidecar_max_response_bytes() -> usize {
    1024 * 1024
}
