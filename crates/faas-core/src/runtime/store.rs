// crates/faas-core/src/runtime/store.rs
// ============================================================================
// Module: FaaS In-Memory Store
// Description: In-memory function store.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryFunctionStore`] implements [`FunctionStore`] over mutex-guarded
//! maps for tests and local demos. It is not durable. Clones share state, so
//! the engine and the cleanup scheduler can hold the same instance.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::ContainerId;
use crate::core::FunctionId;
use crate::core::FunctionRecord;
use crate::core::NewFunction;
use crate::core::Timestamp;
use crate::core::UsageRecord;
use crate::interfaces::FunctionStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Mutable state behind the in-memory store.
#[derive(Debug, Default)]
struct InMemoryState {
    /// Last assigned function id.
    last_id: u64,
    /// Functions keyed by id.
    functions: BTreeMap<FunctionId, FunctionRecord>,
    /// Usage records keyed by container id.
    usage: BTreeMap<ContainerId, UsageRecord>,
}

/// In-memory function store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFunctionStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryFunctionStore {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored functions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the store mutex is poisoned.
    pub fn function_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.functions.len())
    }

    /// Returns every usage record, ordered by container id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the store mutex is poisoned.
    pub fn usage_records(&self) -> Result<Vec<UsageRecord>, StoreError> {
        Ok(self.lock()?.usage.values().cloned().collect())
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, InMemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("function store mutex poisoned".to_string()))
    }
}

impl FunctionStore for InMemoryFunctionStore {
    fn insert_function(&self, function: NewFunction) -> Result<FunctionRecord, StoreError> {
        let mut guard = self.lock()?;
        let next = guard
            .last_id
            .checked_add(1)
            .and_then(NonZeroU64::new)
            .ok_or_else(|| StoreError::Invalid("function id space exhausted".to_string()))?;
        guard.last_id = next.get();
        let record = FunctionRecord {
            id: FunctionId::new(next),
            name: function.name,
            language: function.language,
            code: function.code,
            container_id: None,
        };
        guard.functions.insert(record.id, record.clone());
        Ok(record)
    }

    fn attach_container(
        &self,
        function_id: FunctionId,
        container_id: &ContainerId,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let record = guard
            .functions
            .get_mut(&function_id)
            .ok_or_else(|| StoreError::Invalid(format!("function {function_id} not found")))?;
        record.container_id = Some(container_id.clone());
        Ok(())
    }

    fn get_function(&self, function_id: FunctionId) -> Result<Option<FunctionRecord>, StoreError> {
        Ok(self.lock()?.functions.get(&function_id).cloned())
    }

    fn delete_function(&self, function_id: FunctionId) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.usage.values().any(|usage| usage.function_id == function_id) {
            return Err(StoreError::Conflict(format!(
                "function {function_id} still has usage records"
            )));
        }
        guard.functions.remove(&function_id);
        Ok(())
    }

    fn touch_usage(
        &self,
        container_id: &ContainerId,
        function_id: FunctionId,
        used_at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if !guard.functions.contains_key(&function_id) {
            return Err(StoreError::Invalid(format!("function {function_id} not found")));
        }
        guard.usage.insert(
            container_id.clone(),
            UsageRecord {
                container_id: container_id.clone(),
                function_id,
                last_used_at: used_at,
            },
        );
        Ok(())
    }

    fn get_usage(&self, container_id: &ContainerId) -> Result<Option<UsageRecord>, StoreError> {
        Ok(self.lock()?.usage.get(container_id).cloned())
    }

    fn idle_usage(&self, cutoff: Timestamp) -> Result<Vec<UsageRecord>, StoreError> {
        let guard = self.lock()?;
        let mut idle: Vec<UsageRecord> =
            guard.usage.values().filter(|usage| usage.last_used_at < cutoff).cloned().collect();
        idle.sort_by_key(|usage| usage.last_used_at);
        Ok(idle)
    }

    fn delete_usage(&self, container_id: &ContainerId) -> Result<(), StoreError> {
        self.lock()?.usage.remove(container_id);
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
