// crates/faas-core/src/core/mod.rs
// ============================================================================
// Module: FaaS Core Types
// Description: Identifiers, records, and time values.
// Purpose: Group the data model shared by every crate in the workspace.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types are plain data: no I/O, no clocks, no locks.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod identifiers;
pub mod records;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::ContainerId;
pub use identifiers::FunctionId;
pub use identifiers::FunctionUid;
pub use identifiers::MAX_CONTAINER_NAME_LENGTH;
pub use identifiers::resolve_uid;
pub use identifiers::sanitize_name;
pub use records::FunctionRecord;
pub use records::MAX_CODE_LENGTH;
pub use records::MAX_LANGUAGE_LENGTH;
pub use records::MAX_NAME_LENGTH;
pub use records::NewFunction;
pub use records::UsageRecord;
pub use time::Timestamp;
