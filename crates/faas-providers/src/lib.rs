// crates/faas-providers/src/lib.rs
// ============================================================================
// Module: FaaS Providers
// Description: Concrete container runtime and sidecar client implementations.
// Purpose: Connect the engine core to Docker and the per-container sidecar.
// Dependencies: faas-core, bollard, reqwest
// ============================================================================

//! ## Overview
//! This crate implements the external capabilities the engine depends on:
//! [`DockerRuntime`] provisions and observes containers through the Docker
//! Engine API, and [`HttpSidecarClient`] speaks the sidecar's `/health` and
//! `/invoke` protocol with bounded timeouts and response sizes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod docker;
pub mod sidecar;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use docker::DEFAULT_DOCKER_TIMEOUT_SECS;
pub use docker::DockerConnectError;
pub use docker::DockerConnection;
pub use docker::DockerRuntime;
pub use docker::DockerRuntimeConfig;
pub use sidecar::DEFAULT_ENDPOINT_TEMPLATE;
pub use sidecar::HttpSidecarClient;
pub use sidecar::HttpSidecarConfig;
pub use sidecar::SidecarConfigError;
pub use sidecar::UID_PLACEHOLDER;
