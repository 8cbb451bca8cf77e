// crates/faas-core/src/runtime/cleanup.rs
// ============================================================================
// Module: FaaS Cleanup Scheduler
// Description: Periodic reclamation of idle function containers.
// Purpose: Bound resource use by stopping containers nobody has used recently.
// Dependencies: crate::{core, interfaces, runtime}, tokio, tracing
// ============================================================================

//! ## Overview
//! Each tick queries the store for usage records idle past the threshold,
//! stops their containers, and clears the records. Containers are stopped,
//! never removed, so a later invocation can restart them.
//!
//! A stop failure aborts the rest of the batch. A container that is already
//! gone still has its usage record cleared.
//!
//! When given the engine's [`Coordination`] handle, a tick holds the engine
//! critical section and re-reads each record before stopping it, so a
//! container is never stopped while an invocation is using it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::core::Timestamp;
use crate::core::UsageRecord;
use crate::interfaces::Clock;
use crate::interfaces::ContainerRuntime;
use crate::interfaces::FunctionStore;
use crate::interfaces::RuntimeError;
use crate::interfaces::StoreError;
use crate::runtime::engine::Coordination;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default interval between ticks.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default idle threshold.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// Cleanup scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Interval between ticks.
    pub interval: Duration,
    /// Minimum idle time before a container is reclaimed.
    pub idle_threshold: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CLEANUP_INTERVAL,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
        }
    }
}

impl CleanupConfig {
    /// Validates the interval/threshold relationship.
    ///
    /// # Errors
    ///
    /// Returns [`CleanupError::InvalidConfig`] when either duration is zero or
    /// the threshold is shorter than the interval.
    pub fn validate(&self) -> Result<(), CleanupError> {
        if self.interval.is_zero() {
            return Err(CleanupError::InvalidConfig("cleanup interval must be non-zero".into()));
        }
        if self.idle_threshold.is_zero() {
            return Err(CleanupError::InvalidConfig("idle threshold must be non-zero".into()));
        }
        if self.idle_threshold < self.interval {
            return Err(CleanupError::InvalidConfig(format!(
                "idle threshold ({}s) must not be shorter than the cleanup interval ({}s)",
                self.idle_threshold.as_secs(),
                self.interval.as_secs()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors and Reports
// ============================================================================

/// Cleanup scheduler errors.
#[derive(Debug, Error)]
pub enum CleanupError {
    /// Invalid scheduler configuration.
    #[error("invalid cleanup config: {0}")]
    InvalidConfig(String),
    /// The idle query failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Idle records returned by the store.
    pub candidates: usize,
    /// Containers stopped (or already gone) and cleared.
    pub stopped: usize,
    /// Records skipped because they were used after the query.
    pub skipped: usize,
    /// Whether the batch was aborted by a runtime or store error.
    pub aborted: bool,
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Periodic idle-container reclaimer.
#[derive(Clone)]
pub struct CleanupScheduler {
    /// Scheduler configuration.
    config: CleanupConfig,
    /// Function store shared with the engine.
    store: Arc<dyn FunctionStore>,
    /// Container runtime shared with the engine.
    runtime: Arc<dyn ContainerRuntime>,
    /// Clock used for cutoffs.
    clock: Arc<dyn Clock>,
    /// Optional engine critical section.
    coordination: Option<Coordination>,
}

impl fmt::Debug for CleanupScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupScheduler")
            .field("config", &self.config)
            .field("coordinated", &self.coordination.is_some())
            .finish_non_exhaustive()
    }
}

impl CleanupScheduler {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`CleanupError::InvalidConfig`] when the configuration is invalid.
    pub fn new(
        config: CleanupConfig,
        store: Arc<dyn FunctionStore>,
        runtime: Arc<dyn ContainerRuntime>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CleanupError> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            runtime,
            clock,
            coordination: None,
        })
    }

    /// Serializes ticks with an engine's registrations and invocations.
    #[must_use]
    pub fn with_coordination(mut self, coordination: Coordination) -> Self {
        self.coordination = Some(coordination);
        self
    }

    /// Returns the scheduler configuration.
    #[must_use]
    pub const fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Runs one reclamation pass.
    ///
    /// # Errors
    ///
    /// Returns [`CleanupError::Store`] when the idle query itself fails.
    /// Per-container failures abort the batch and are reported in the
    /// returned [`CleanupReport`].
    pub async fn tick(&self) -> Result<CleanupReport, CleanupError> {
        let _guard = match &self.coordination {
            Some(coordination) => Some(coordination.acquire().await),
            None => None,
        };
        let cutoff = self.clock.now().saturating_sub(self.config.idle_threshold);
        let idle = self.store.idle_usage(cutoff)?;
        let mut report = CleanupReport {
            candidates: idle.len(),
            ..CleanupReport::default()
        };
        debug!(candidates = report.candidates, cutoff = %cutoff, "cleanup tick");

        for usage in idle {
            match self.reclaim(&usage, cutoff).await {
                Ok(true) => report.stopped += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    error!(
                        container_id = %usage.container_id,
                        error = %err,
                        "reclamation failed; aborting remaining batch"
                    );
                    report.aborted = true;
                    break;
                }
            }
        }

        if report.stopped > 0 || report.aborted {
            info!(
                candidates = report.candidates,
                stopped = report.stopped,
                skipped = report.skipped,
                aborted = report.aborted,
                "cleanup tick finished"
            );
        }
        Ok(report)
    }

    /// Runs ticks on the configured interval until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut interval = tokio::time::interval_at(start, self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!(
            interval_secs = self.config.interval.as_secs(),
            idle_threshold_secs = self.config.idle_threshold.as_secs(),
            "cleanup scheduler started"
        );
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("cleanup scheduler stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "cleanup tick failed");
                    }
                }
            }
        }
    }

    /// Stops one idle container and clears its record.
    ///
    /// Returns `Ok(false)` when the record was refreshed after the idle query.
    async fn reclaim(
        &self,
        usage: &UsageRecord,
        cutoff: Timestamp,
    ) -> Result<bool, ReclaimError> {
        let current = self.store.get_usage(&usage.container_id)?;
        match current {
            None => return Ok(false),
            Some(current) if current.last_used_at >= cutoff => {
                debug!(container_id = %usage.container_id, "container used since idle query; skipping");
                return Ok(false);
            }
            Some(_) => {}
        }

        match self.runtime.stop(&usage.container_id).await {
            Ok(()) => {}
            Err(RuntimeError::NotFound(detail)) => {
                warn!(container_id = %usage.container_id, detail = %detail, "idle container already gone");
            }
            Err(err) => return Err(err.into()),
        }
        self.store.delete_usage(&usage.container_id)?;
        info!(
            container_id = %usage.container_id,
            function_id = %usage.function_id,
            "idle container stopped"
        );
        Ok(true)
    }
}

/// Failure while reclaiming one container.
#[derive(Debug, Error)]
enum ReclaimError {
    /// Store read or delete failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Stop command failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
