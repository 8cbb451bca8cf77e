// crates/faas-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Function Store
// Description: Durable FunctionStore backend using SQLite.
// Purpose: Persist function definitions and container usage across restarts.
// Dependencies: faas-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`FunctionStore`](faas_core::FunctionStore)
//! holding the `functions` and `running_containers` tables shared by the
//! engine and the cleanup scheduler.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::ConnectRetry;
pub use store::SqliteFunctionStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
