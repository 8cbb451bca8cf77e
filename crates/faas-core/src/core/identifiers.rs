// crates/faas-core/src/core/identifiers.rs
// ============================================================================
// Module: FaaS Identifiers
// Description: Function, container, and external handle identifiers.
// Purpose: Map durable numeric ids to container-safe external handles and back.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Functions are keyed by a store-assigned numeric [`FunctionId`]. Callers never
//! see that id directly; they hold a [`FunctionUid`] of the form
//! `<sanitized-name>-<id>`, which doubles as the container name and the sidecar
//! host name on the private network. UIDs are derived, never stored.
//!
//! Invariants:
//! - A generated UID is at most [`MAX_CONTAINER_NAME_LENGTH`] characters.
//! - A generated UID only contains `[a-z0-9-]` and always ends with `-<id>`.
//! - Resolving a UID is a pure split on the last `-`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Container naming ceiling; UIDs never exceed it.
pub const MAX_CONTAINER_NAME_LENGTH: usize = 63;

/// Name portion used when sanitization leaves nothing usable.
const FALLBACK_NAME: &str = "fn";

// ============================================================================
// SECTION: Function Identifier
// ============================================================================

/// Durable function identifier assigned by the function store.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(NonZeroU64);

impl FunctionId {
    /// Creates a new function identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a function identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Parses the textual id produced by [`resolve_uid`].
    ///
    /// Returns `None` for the empty sentinel, non-digits, zero, or overflow.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        raw.parse::<u64>().ok().and_then(Self::from_raw)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

// ============================================================================
// SECTION: Container Identifier
// ============================================================================

/// Container identifier issued by the container runtime.
///
/// # Invariants
/// - Opaque string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Function UID
// ============================================================================

/// Externally visible function handle, `<sanitized-name>-<id>`.
///
/// # Invariants
/// - Valid container name: `[a-z0-9-]+`, at most 63 characters, no leading `-`.
/// - The `-<id>` suffix is always present and parses to a non-zero id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FunctionUid(String);

impl FunctionUid {
    /// Derives the UID for a function name and id.
    ///
    /// The name is lower-cased, `_` becomes `-`, everything outside
    /// `[a-z0-9-]` is stripped, and the name is truncated so the suffix always
    /// fits inside the container naming ceiling.
    #[must_use]
    pub fn generate(name: &str, id: FunctionId) -> Self {
        let suffix = format!("-{id}");
        let max_name_length = MAX_CONTAINER_NAME_LENGTH.saturating_sub(suffix.len());
        let mut sanitized = sanitize_name(name);
        // sanitized names are ASCII, so byte truncation is char-safe
        sanitized.truncate(max_name_length);
        let trimmed = sanitized.trim_start_matches('-');
        let name_part = if trimmed.is_empty() { FALLBACK_NAME } else { trimmed };
        Self(format!("{name_part}{suffix}"))
    }

    /// Parses and validates an externally supplied UID.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.len() > MAX_CONTAINER_NAME_LENGTH || raw.starts_with('-') {
            return None;
        }
        if !raw.bytes().all(is_uid_byte) {
            return None;
        }
        if !raw.contains('-') {
            return None;
        }
        FunctionId::parse(resolve_uid(raw))?;
        Some(Self(raw.to_string()))
    }

    /// Returns the function id encoded in the suffix.
    #[must_use]
    pub fn function_id(&self) -> Option<FunctionId> {
        FunctionId::parse(resolve_uid(&self.0))
    }

    /// Returns the UID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for FunctionUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for FunctionUid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom("invalid function uid"))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the id portion of a UID: the substring after the last `-`.
///
/// A UID without any `-` yields the empty string, which never matches a
/// stored function.
#[must_use]
pub fn resolve_uid(uid: &str) -> &str {
    uid.rfind('-').map_or("", |index| &uid[index + 1..])
}

/// Lower-cases a name, maps `_` to `-`, and strips everything outside `[a-z0-9-]`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.replace('_', "-").to_lowercase().chars().filter(|ch| is_uid_char(*ch)).collect()
}

/// Returns true for characters allowed in a UID.
const fn is_uid_char(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-'
}

/// Returns true for bytes allowed in a UID.
const fn is_uid_byte(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-'
}
