// crates/faas-core/src/runtime/readiness.rs
// ============================================================================
// Module: FaaS Readiness Handshake
// Description: Readiness states, backoff schedule, and polling policy.
// Purpose: Gate dispatch after a container (re)start on a bounded health loop.
// Dependencies: std
// ============================================================================

//! ## Overview
//! After a container is started the engine polls the sidecar health endpoint
//! until it answers, the container disappears, or the overall timeout elapses.
//! The wait between probes starts at [`ReadinessPolicy::initial_backoff`],
//! grows by [`ReadinessPolicy::multiplier`] after each failed probe, and never
//! exceeds [`ReadinessPolicy::max_backoff`].
//!
//! The loop itself lives in the engine; this module holds the pure pieces so
//! the schedule can be tested without a runtime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Default first wait between health probes.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Default ceiling for a single wait.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);
/// Default backoff growth factor.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;
/// Default overall readiness bound.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded exponential backoff policy for the readiness handshake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessPolicy {
    /// First wait between probes.
    pub initial_backoff: Duration,
    /// Ceiling for any single wait.
    pub max_backoff: Duration,
    /// Growth factor applied after each failed probe.
    pub multiplier: f64,
    /// Overall bound on the handshake.
    pub timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }
}

impl ReadinessPolicy {
    /// Returns a fresh backoff schedule for this policy.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        Backoff {
            current: self.initial_backoff,
            max: self.max_backoff,
            multiplier: self.multiplier,
        }
    }
}

// ============================================================================
// SECTION: Backoff
// ============================================================================

/// Iterator over successive waits: `initial`, `initial * m`, ... capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Next wait to hand out.
    current: Duration,
    /// Ceiling.
    max: Duration,
    /// Growth factor.
    multiplier: f64,
}

impl Backoff {
    /// Returns the next wait and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        let grown = self.current.mul_f64(self.multiplier.max(1.0));
        self.current = grown.min(self.max);
        delay
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_delay())
    }
}

// ============================================================================
// SECTION: States
// ============================================================================

/// Readiness state machine for one invocation.
///
/// `Unknown -> Inspected -> {Running, Stopped}`; `Stopped -> Starting ->
/// AwaitingHealth -> Ready`; `Running -> Ready`; any step may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// Nothing known about the container yet.
    Unknown,
    /// Container inspected.
    Inspected,
    /// Container already running; handshake skipped.
    Running,
    /// Container exists but is not running.
    Stopped,
    /// Start command issued.
    Starting,
    /// Polling the sidecar health endpoint.
    AwaitingHealth,
    /// Ready for dispatch.
    Ready,
    /// Terminal failure.
    Failed,
}

impl ReadinessState {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Inspected => "inspected",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::AwaitingHealth => "awaiting_health",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// Returns true when `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unknown, Self::Inspected)
                | (Self::Inspected, Self::Running | Self::Stopped)
                | (Self::Stopped, Self::Starting)
                | (Self::Starting, Self::AwaitingHealth)
                | (Self::AwaitingHealth | Self::Running, Self::Ready)
                | (
                    Self::Unknown
                        | Self::Inspected
                        | Self::Stopped
                        | Self::Starting
                        | Self::AwaitingHealth,
                    Self::Failed
                )
        )
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
