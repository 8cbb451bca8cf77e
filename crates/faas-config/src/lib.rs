// crates/faas-config/src/lib.rs
// ============================================================================
// Module: FaaS Config Library
// Description: Canonical configuration model and validation.
// Purpose: Single source of truth for faas.toml semantics.
// Dependencies: faas-core, faas-providers, faas-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `faas-config` defines the configuration model for the engine, the cleanup
//! scheduler, the function store, and the outer surfaces. Validation is strict
//! and fails closed; the model converts into the typed configs each crate
//! consumes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
