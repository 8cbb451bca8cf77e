// crates/faas-providers/src/docker.rs
// ============================================================================
// Module: Docker Container Runtime
// Description: ContainerRuntime implementation backed by the Docker Engine API.
// Purpose: Provision, start, stop, and observe function containers.
// Dependencies: faas-core, bollard, serde
// ============================================================================

//! ## Overview
//! [`DockerRuntime`] maps the engine's container capability onto the Docker
//! Engine API through `bollard`. Every container is created with the fixed
//! [`ResourcePolicy`] carried in its [`ContainerSpec`]; nothing about isolation
//! is negotiated per function.
//!
//! Listing only reports running containers. A container that exited while the
//! engine was waiting for its health endpoint therefore disappears from the
//! listing, which is what lets readiness fail fast on a crash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::API_DEFAULT_VERSION;
use bollard::Docker;
use bollard::container::Config;
use bollard::container::CreateContainerOptions;
use bollard::container::InspectContainerOptions;
use bollard::container::ListContainersOptions;
use bollard::container::StartContainerOptions;
use bollard::container::StopContainerOptions;
use bollard::errors::Error as BollardError;
use bollard::models::HealthConfig;
use bollard::models::HostConfig;
use bollard::network::CreateNetworkOptions;
use bollard::network::InspectNetworkOptions;
use faas_core::ContainerId;
use faas_core::ContainerRuntime;
use faas_core::ContainerSpec;
use faas_core::ContainerState;
use faas_core::ContainerSummary;
use faas_core::HealthCheckSpec;
use faas_core::RuntimeError;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default request timeout for Docker API calls, in seconds.
pub const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 120;

/// Network driver used when the private network has to be created.
const NETWORK_DRIVER: &str = "bridge";

/// HTTP status Docker returns when an object does not exist.
const STATUS_NOT_FOUND: u16 = 404;

/// HTTP status Docker returns when a stop targets an already stopped container.
const STATUS_NOT_MODIFIED: u16 = 304;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// How to reach the Docker daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DockerConnection {
    /// Use `DOCKER_HOST` or the platform default socket.
    #[default]
    LocalDefaults,
    /// Connect to an explicit unix socket path.
    Socket {
        /// Socket path, for example `/var/run/docker.sock`.
        path: String,
    },
    /// Connect to a plain HTTP endpoint, for example `tcp://127.0.0.1:2375`.
    Http {
        /// Daemon address.
        address: String,
    },
}

/// Docker runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DockerRuntimeConfig {
    /// Daemon connection mode.
    pub connection: DockerConnection,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DockerRuntimeConfig {
    fn default() -> Self {
        Self {
            connection: DockerConnection::LocalDefaults,
            timeout_secs: DEFAULT_DOCKER_TIMEOUT_SECS,
        }
    }
}

/// Errors raised while connecting to the Docker daemon.
#[derive(Debug, Error)]
pub enum DockerConnectError {
    /// The client could not be constructed for the configured endpoint.
    #[error("docker connection failed: {0}")]
    Connect(String),
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Docker-backed [`ContainerRuntime`].
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    /// Shared Docker API client.
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the daemon described by `config`.
    ///
    /// No request is issued; an unreachable daemon surfaces on first use.
    ///
    /// # Errors
    ///
    /// Returns [`DockerConnectError`] when the endpoint is malformed.
    pub fn connect(config: &DockerRuntimeConfig) -> Result<Self, DockerConnectError> {
        let docker = match &config.connection {
            DockerConnection::LocalDefaults => Docker::connect_with_local_defaults(),
            DockerConnection::Socket {
                path,
            } => Docker::connect_with_socket(path, config.timeout_secs, API_DEFAULT_VERSION),
            DockerConnection::Http {
                address,
            } => Docker::connect_with_http(address, config.timeout_secs, API_DEFAULT_VERSION),
        }
        .map_err(|err| DockerConnectError::Connect(err.to_string()))?;
        Ok(Self {
            docker,
        })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(docker: Docker) -> Self {
        Self {
            docker,
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ensure_network(&self, network: &str) -> Result<(), RuntimeError> {
        match self.docker.inspect_network(network, None::<InspectNetworkOptions<String>>).await {
            Ok(_) => {
                debug!(network, "container network present");
                return Ok(());
            }
            Err(BollardError::DockerResponseServerError {
                status_code: STATUS_NOT_FOUND,
                ..
            }) => {}
            Err(err) => return Err(map_error(err, network)),
        }
        let options = CreateNetworkOptions {
            name: network.to_string(),
            driver: NETWORK_DRIVER.to_string(),
            check_duplicate: true,
            ..CreateNetworkOptions::default()
        };
        self.docker.create_network(options).await.map_err(|err| map_error(err, network))?;
        info!(network, driver = NETWORK_DRIVER, "created container network");
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, RuntimeError> {
        let options = CreateContainerOptions {
            name: spec.name.as_str().to_string(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|err| map_error(err, spec.name.as_str()))?;
        for warning in &response.warnings {
            debug!(container = spec.name.as_str(), warning, "docker create warning");
        }
        Ok(ContainerId::new(response.id))
    }

    async fn start(&self, container_id: &ContainerId) -> Result<(), RuntimeError> {
        self.docker
            .start_container(container_id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|err| map_error(err, container_id.as_str()))
    }

    async fn stop(&self, container_id: &ContainerId) -> Result<(), RuntimeError> {
        match self
            .docker
            .stop_container(container_id.as_str(), None::<StopContainerOptions>)
            .await
        {
            Ok(())
            | Err(BollardError::DockerResponseServerError {
                status_code: STATUS_NOT_MODIFIED,
                ..
            }) => Ok(()),
            Err(err) => Err(map_error(err, container_id.as_str())),
        }
    }

    async fn inspect(&self, container_id: &ContainerId) -> Result<ContainerState, RuntimeError> {
        let response = self
            .docker
            .inspect_container(container_id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|err| map_error(err, container_id.as_str()))?;
        let state = response.state.unwrap_or_default();
        Ok(ContainerState {
            id: response.id.map_or_else(|| container_id.clone(), ContainerId::new),
            running: state.running.unwrap_or(false),
            status: state.status.map(|status| status.to_string()).unwrap_or_default(),
        })
    }

    async fn list_by_name(&self, name: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![format!("^/{name}$")]);
        let options = ListContainersOptions {
            all: false,
            filters,
            ..ListContainersOptions::default()
        };
        let listed =
            self.docker.list_containers(Some(options)).await.map_err(|err| map_error(err, name))?;
        Ok(listed
            .into_iter()
            .filter_map(|summary| {
                let names: Vec<String> = summary
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .map(|listed| listed.trim_start_matches('/').to_string())
                    .collect();
                if !names.iter().any(|listed| listed == name) {
                    return None;
                }
                Some(ContainerSummary {
                    id: ContainerId::new(summary.id?),
                    names,
                    state: summary.state.unwrap_or_default(),
                })
            })
            .collect())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the Docker create request for a container spec.
fn container_config(spec: &ContainerSpec) -> Config<String> {
    let resources = &spec.resources;
    let host_config = HostConfig {
        memory: Some(resources.memory_bytes),
        cpu_period: Some(resources.cpu_period),
        cpu_quota: Some(resources.cpu_quota),
        pids_limit: Some(resources.pids_limit),
        readonly_rootfs: Some(resources.read_only_root_fs),
        tmpfs: Some(resources.tmpfs.clone().into_iter().collect()),
        cap_drop: Some(resources.drop_capabilities.clone()),
        security_opt: Some(resources.security_options.clone()),
        network_mode: Some(spec.network.clone()),
        ..HostConfig::default()
    };
    Config {
        image: Some(spec.image.clone()),
        env: Some(spec.env.clone()),
        labels: Some(spec.labels.clone().into_iter().collect()),
        healthcheck: spec.health_check.as_ref().map(health_config),
        host_config: Some(host_config),
        ..Config::default()
    }
}

/// Converts a health check into Docker's nanosecond representation.
fn health_config(check: &HealthCheckSpec) -> HealthConfig {
    HealthConfig {
        test: Some(check.test.clone()),
        interval: Some(duration_nanos(check.interval)),
        timeout: Some(duration_nanos(check.timeout)),
        retries: Some(i64::from(check.retries)),
        ..HealthConfig::default()
    }
}

/// Converts a duration to saturating nanoseconds.
fn duration_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// Maps a bollard error onto the runtime error taxonomy.
fn map_error(err: BollardError, target: &str) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: STATUS_NOT_FOUND,
            message,
        } => RuntimeError::NotFound(format!("{target}: {message}")),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api(format!("{target}: status {status_code}: {message}")),
        other => RuntimeError::Unavailable(other.to_string()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
