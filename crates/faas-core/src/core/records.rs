// crates/faas-core/src/core/records.rs
// ============================================================================
// Module: FaaS Records
// Description: Persisted function and usage records.
// Purpose: Define the durable data model shared by the engine, scheduler, and stores.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A [`FunctionRecord`] is created by registration with no container, gains a
//! container id once provisioning succeeds, and is otherwise immutable. A
//! [`UsageRecord`] exists while a container is started and not yet reclaimed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ContainerId;
use crate::core::identifiers::FunctionId;
use crate::core::identifiers::FunctionUid;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum function name length, in characters.
pub const MAX_NAME_LENGTH: usize = 50;
/// Maximum function source length, in characters.
pub const MAX_CODE_LENGTH: usize = 10_000;
/// Maximum language tag length, in characters.
pub const MAX_LANGUAGE_LENGTH: usize = 50;

// ============================================================================
// SECTION: Function Records
// ============================================================================

/// Insert payload for a new function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFunction {
    /// Caller-supplied label.
    pub name: String,
    /// Sidecar runtime tag.
    pub language: String,
    /// Caller-supplied source text.
    pub code: String,
}

/// Persisted function definition.
///
/// # Invariants
/// - `id` is assigned by the store and never changes.
/// - `container_id` is `None` until provisioning succeeds, then set once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Store-assigned identifier.
    pub id: FunctionId,
    /// Caller-supplied label.
    pub name: String,
    /// Sidecar runtime tag (informational).
    pub language: String,
    /// Caller-supplied source text.
    pub code: String,
    /// Provisioned container, once attached.
    pub container_id: Option<ContainerId>,
}

impl FunctionRecord {
    /// Returns the external handle for this record.
    #[must_use]
    pub fn uid(&self) -> FunctionUid {
        FunctionUid::generate(&self.name, self.id)
    }
}

// ============================================================================
// SECTION: Usage Records
// ============================================================================

/// One row per started, not yet reclaimed, container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Container the record tracks (primary key).
    pub container_id: ContainerId,
    /// Function backed by the container.
    pub function_id: FunctionId,
    /// Last time the container served an invocation.
    pub last_used_at: Timestamp,
}
