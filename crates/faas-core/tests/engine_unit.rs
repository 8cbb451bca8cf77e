// crates/faas-core/tests/engine_unit.rs
// ============================================================================
// Module: Engine Unit Tests
// Description: Registration, readiness, and dispatch behavior of the engine.
// Purpose: Pin down compensation, warm/cold paths, and failure reporting.
// Dependencies: faas-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Drives [`faas_core::Engine`] against in-memory and scripted collaborators.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::FakeRuntime;
use common::FakeSidecar;
use common::FaultyStore;
use common::Harness;
use common::test_config;
use faas_core::Clock;
use faas_core::DispatchFailure;
use faas_core::Engine;
use faas_core::EngineConfig;
use faas_core::EngineError;
use faas_core::FunctionId;
use faas_core::FunctionStore;
use faas_core::FunctionUid;
use faas_core::ManualClock;
use faas_core::StartKind;
use faas_core::Timestamp;
use serde_json::json;
use tokio::time::Instant;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Engine over a store whose writes can be made to fail.
fn faulty_engine() -> (Engine, FaultyStore, FakeRuntime, FakeSidecar) {
    let store = FaultyStore::new();
    let runtime = FakeRuntime::new();
    let sidecar = FakeSidecar::new();
    let clock = ManualClock::new(Timestamp::from_unix_millis(1_000_000));
    let engine = Engine::new(
        test_config(),
        Arc::new(store.clone()),
        Arc::new(runtime.clone()),
        Arc::new(sidecar.clone()),
        Arc::new(clock) as Arc<dyn Clock>,
    );
    (engine, store, runtime, sidecar)
}

// ============================================================================
// SECTION: Registration
// ============================================================================

#[tokio::test]
async fn create_returns_sanitized_uid_and_provisions_container() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("Hello_World", "def handler(p): return p").await.unwrap();
    assert_eq!(uid.as_str(), "hello-world-1");

    let record = harness.store.get_function(FunctionId::from_raw(1).unwrap()).unwrap().unwrap();
    assert_eq!(record.container_id.as_ref().map(|id| id.as_str()), Some("cid-hello-world-1"));
    assert_eq!(record.language, "py");

    let spec = harness.runtime.with(|state| state.specs[0].clone());
    assert_eq!(spec.name, uid);
    assert_eq!(spec.image, "faas-base-image");
    assert_eq!(spec.network, "faas-net");
    assert_eq!(spec.env, vec!["FUNCTION_CODE=def handler(p): return p".to_string()]);
    assert_eq!(spec.labels.get("faas.engine_id").map(String::as_str), Some("engine-test"));
    assert_eq!(spec.labels.get("faas.function_name").map(String::as_str), Some("Hello_World"));
    assert_eq!(spec.resources.memory_bytes, 512 * 1024 * 1024);
    assert!(spec.resources.read_only_root_fs);
    assert_eq!(harness.engine.cached_functions().await, 1);
}

#[tokio::test]
async fn validation_failures_leave_no_trace() {
    let harness = Harness::new();
    let empty = harness.engine.create_function("", "code").await;
    let long = harness.engine.create_function(&"n".repeat(51), "code").await;
    let no_code = harness.engine.create_function("name", "").await;
    let huge = harness.engine.create_function("name", &"x".repeat(10_001)).await;

    for result in [empty, long, no_code, huge] {
        assert!(matches!(result, Err(EngineError::Validation(_))), "got {result:?}");
    }
    assert_eq!(harness.store.function_count().unwrap(), 0);
    assert_eq!(harness.runtime.with(|state| state.creates), 0);
}

#[tokio::test]
async fn provisioning_failure_rolls_back_record() {
    let harness = Harness::new();
    harness.runtime.with(|state| state.fail_create = true);

    let result = harness.engine.create_function("doomed", "code").await;
    assert!(matches!(result, Err(EngineError::Provisioning(_))), "got {result:?}");
    assert_eq!(harness.runtime.with(|state| state.creates), 1);
    assert!(harness.store.get_function(FunctionId::from_raw(1).unwrap()).unwrap().is_none());
    assert_eq!(harness.store.function_count().unwrap(), 0);
    assert_eq!(harness.engine.cached_functions().await, 0);
}

#[tokio::test]
async fn attach_failure_keeps_record_and_container_without_caching() {
    let (engine, store, runtime, _sidecar) = faulty_engine();
    store.with(|faults| faults.fail_attach = true);

    let result = engine.create_function("orphan", "code").await;
    let err = result.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)), "got {err:?}");
    assert_eq!(err.kind(), "store");

    assert_eq!(store.inner.function_count().unwrap(), 1);
    let record = store.get_function(FunctionId::from_raw(1).unwrap()).unwrap().unwrap();
    assert!(record.container_id.is_none());
    assert_eq!(runtime.with(|state| state.containers.len()), 1);
    assert!(runtime.with(|state| state.stops.is_empty()));
    assert_eq!(engine.cached_functions().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_get_distinct_uids() {
    let harness = Harness::new();
    let mut tasks = Vec::new();
    for index in 0..16 {
        let engine = harness.engine.clone();
        tasks.push(tokio::spawn(async move {
            engine.create_function(&format!("fn_{index}"), "code").await
        }));
    }

    let mut uids = BTreeSet::new();
    let mut ids = BTreeSet::new();
    for task in tasks {
        let uid = task.await.unwrap().unwrap();
        let id = uid.function_id().unwrap();
        let record = harness.store.get_function(id).unwrap().unwrap();
        assert_eq!(record.uid(), uid);
        ids.insert(id);
        uids.insert(uid);
    }
    assert_eq!(uids.len(), 16);
    assert_eq!(ids.len(), 16);
}

// ============================================================================
// SECTION: Invocation
// ============================================================================

#[tokio::test]
async fn first_invoke_is_cold_and_second_is_warm() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("adder", "code").await.unwrap();

    let first = harness.engine.invoke_function_detailed(uid.as_str(), json!({"a": 1})).await.unwrap();
    assert_eq!(first.start, StartKind::Cold);
    assert_eq!(first.result, json!({"echo": {"a": 1}}));
    let probes_after_cold = harness.sidecar.with(|state| state.health_calls);
    assert_eq!(probes_after_cold, 1);

    let second = harness.engine.invoke_function_detailed(uid.as_str(), json!({"a": 2})).await.unwrap();
    assert_eq!(second.start, StartKind::Warm);
    assert_eq!(harness.sidecar.with(|state| state.health_calls), probes_after_cold);
    assert_eq!(harness.runtime.with(|state| state.starts), 1);
}

#[tokio::test]
async fn null_params_become_empty_object() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("noop", "code").await.unwrap();
    let result = harness.engine.invoke_function(uid.as_str(), serde_json::Value::Null).await.unwrap();
    assert_eq!(result, json!({"echo": {}}));
}

#[tokio::test]
async fn non_object_params_are_rejected_before_any_runtime_call() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("noop", "code").await.unwrap();
    let result = harness.engine.invoke_function(uid.as_str(), json!([1, 2, 3])).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
    assert_eq!(harness.runtime.with(|state| state.starts), 0);
}

#[tokio::test]
async fn unknown_uids_are_not_found() {
    let harness = Harness::new();
    let _ = harness.engine.create_function("hello", "code").await.unwrap();

    for uid in ["nope-99", "noDash", "other-1", "hello-0", ""] {
        let result = harness.engine.invoke_function(uid, json!({})).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))), "{uid}: {result:?}");
    }
}

#[tokio::test]
async fn cache_miss_falls_back_to_store() {
    let first = Harness::new();
    let uid = first.engine.create_function("shared", "code").await.unwrap();

    let second = faas_core::Engine::new(
        test_config(),
        std::sync::Arc::new(first.store.clone()),
        std::sync::Arc::new(first.runtime.clone()),
        std::sync::Arc::new(first.sidecar.clone()),
        std::sync::Arc::new(first.clock.clone()),
    );
    assert_eq!(second.cached_functions().await, 0);
    let result = second.invoke_function(uid.as_str(), json!({})).await.unwrap();
    assert_eq!(result, json!({"echo": {}}));
    assert_eq!(second.cached_functions().await, 1);
}

#[tokio::test]
async fn bounded_cache_still_serves_evicted_functions() {
    let harness = Harness::with_config(EngineConfig {
        cache_capacity: Some(1),
        ..test_config()
    });
    let a = harness.engine.create_function("a", "code").await.unwrap();
    let b = harness.engine.create_function("b", "code").await.unwrap();
    assert_eq!(harness.engine.cached_functions().await, 1);
    assert!(harness.engine.invoke_function(a.as_str(), json!({})).await.is_ok());
    assert!(harness.engine.invoke_function(b.as_str(), json!({})).await.is_ok());
    assert_eq!(harness.engine.cached_functions().await, 1);
}

#[tokio::test]
async fn vanished_container_is_missing() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("ghost", "code").await.unwrap();
    harness.runtime.with(|state| state.containers.clear());

    let result = harness.engine.invoke_function(uid.as_str(), json!({})).await;
    assert!(matches!(result, Err(EngineError::ContainerMissing { .. })), "got {result:?}");
}

#[tokio::test]
async fn start_failure_is_reported() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("stuck", "code").await.unwrap();
    harness.runtime.with(|state| state.fail_start = true);

    let result = harness.engine.invoke_function(uid.as_str(), json!({})).await;
    assert!(matches!(result, Err(EngineError::Start { .. })), "got {result:?}");
    assert!(harness.store.usage_records().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn crash_during_readiness_fails_fast() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("crashy", "code").await.unwrap();
    harness.runtime.with(|state| state.crash_on_start = true);
    harness.sidecar.with(|state| state.healthy = false);

    let started = Instant::now();
    let result = harness.engine.invoke_function(uid.as_str(), json!({})).await;
    assert!(matches!(result, Err(EngineError::ContainerCrashed { .. })), "got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(harness.sidecar.with(|state| state.health_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn readiness_times_out_after_bounded_backoff() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("slow", "code").await.unwrap();
    harness.sidecar.with(|state| state.healthy = false);

    let started = Instant::now();
    let result = harness.engine.invoke_function(uid.as_str(), json!({})).await;
    let elapsed = started.elapsed();
    assert!(matches!(result, Err(EngineError::ReadinessTimeout { .. })), "got {result:?}");
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(11));
    let probes = harness.sidecar.with(|state| state.health_calls);
    assert!((5..=7).contains(&probes), "probes = {probes}");
    assert!(harness.sidecar.with(|state| state.invoke_calls.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn slow_container_listing_cannot_outlast_readiness_timeout() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("stuck", "code").await.unwrap();
    harness.sidecar.with(|state| state.healthy = false);
    harness.runtime.with(|state| state.list_delay = Some(Duration::from_secs(60)));

    let started = Instant::now();
    let result = harness.engine.invoke_function(uid.as_str(), json!({})).await;
    let elapsed = started.elapsed();
    assert!(matches!(result, Err(EngineError::ReadinessTimeout { .. })), "got {result:?}");
    assert!(elapsed >= Duration::from_secs(10), "elapsed = {elapsed:?}");
    assert!(elapsed <= Duration::from_secs(11), "elapsed = {elapsed:?}");
    assert_eq!(harness.runtime.with(|state| state.lists), 1);
}

#[tokio::test(start_paused = true)]
async fn registration_waits_for_an_invocation_in_readiness() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("first", "code").await.unwrap();
    harness.sidecar.with(|state| state.healthy = false);

    let engine = harness.engine.clone();
    let pending_invoke =
        tokio::spawn(async move { engine.invoke_function(uid.as_str(), json!({})).await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.runtime.with(|state| state.starts), 1);

    let engine = harness.engine.clone();
    let pending_create = tokio::spawn(async move { engine.create_function("second", "code").await });
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.runtime.with(|state| state.creates), 1);
    assert_eq!(harness.store.function_count().unwrap(), 1);
    assert!(!pending_create.is_finished());

    let invoked = pending_invoke.await.unwrap();
    assert!(matches!(invoked, Err(EngineError::ReadinessTimeout { .. })), "got {invoked:?}");
    let created = pending_create.await.unwrap().unwrap();
    assert_eq!(created.as_str(), "second-2");
    assert_eq!(harness.runtime.with(|state| state.creates), 2);
}

// ============================================================================
// SECTION: Dispatch and Usage
// ============================================================================

#[tokio::test]
async fn dispatch_failures_are_reported_and_do_not_refresh_usage() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("flaky", "code").await.unwrap();
    harness.engine.invoke_function(uid.as_str(), json!({})).await.unwrap();
    let usage = harness.store.usage_records().unwrap();
    assert_eq!(usage.len(), 1);
    let first_use = usage[0].last_used_at;

    harness.clock.advance(Duration::from_secs(60));
    harness
        .sidecar
        .with(|state| state.next_failure = Some(DispatchFailure::Application("boom".to_string())));
    let result = harness.engine.invoke_function(uid.as_str(), json!({})).await;
    assert!(
        matches!(result, Err(EngineError::Dispatch(DispatchFailure::Application(ref msg))) if msg == "boom"),
        "got {result:?}"
    );
    assert_eq!(harness.store.usage_records().unwrap()[0].last_used_at, first_use);

    harness.engine.invoke_function(uid.as_str(), json!({})).await.unwrap();
    let refreshed = harness.store.usage_records().unwrap()[0].last_used_at;
    assert_eq!(refreshed, first_use.saturating_add(Duration::from_secs(60)));
}

#[tokio::test]
async fn non_success_status_is_a_dispatch_failure() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("teapot", "code").await.unwrap();
    harness.sidecar.with(|state| state.next_failure = Some(DispatchFailure::Status(502)));
    let result = harness.engine.invoke_function(uid.as_str(), json!({})).await;
    assert!(matches!(result, Err(EngineError::Dispatch(DispatchFailure::Status(502)))));
    assert_eq!(result.unwrap_err().kind(), "dispatch");
}

#[tokio::test(start_paused = true)]
async fn slow_dispatch_times_out() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("sleepy", "code").await.unwrap();
    harness.sidecar.with(|state| state.invoke_delay = Some(Duration::from_secs(30)));
    let result = harness.engine.invoke_function(uid.as_str(), json!({})).await;
    assert!(matches!(result, Err(EngineError::Dispatch(DispatchFailure::Timeout))), "got {result:?}");
}

#[tokio::test]
async fn cold_start_records_usage_even_when_dispatch_fails() {
    let harness = Harness::new();
    let uid = harness.engine.create_function("cold", "code").await.unwrap();
    harness.sidecar.with(|state| state.next_failure = Some(DispatchFailure::Status(500)));
    let result = harness.engine.invoke_function(uid.as_str(), json!({})).await;
    assert!(result.is_err());
    let usage = harness.store.usage_records().unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].function_id, uid.function_id().unwrap());
}

#[tokio::test]
async fn cold_start_usage_failure_is_a_store_error() {
    let (engine, store, runtime, sidecar) = faulty_engine();
    let uid = engine.create_function("untracked", "code").await.unwrap();
    store.with(|faults| faults.fail_touch = true);

    let err = engine.invoke_function(uid.as_str(), json!({})).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)), "got {err:?}");
    assert_eq!(err.kind(), "store");
    assert!(sidecar.with(|state| state.invoke_calls.is_empty()));
    assert!(store.inner.usage_records().unwrap().is_empty());

    store.with(|faults| faults.fail_touch = false);
    let invocation = engine.invoke_function_detailed(uid.as_str(), json!({})).await.unwrap();
    assert_eq!(invocation.start, StartKind::Warm);
    assert_eq!(store.inner.usage_records().unwrap().len(), 1);
    assert_eq!(runtime.with(|state| state.starts), 1);
}

#[tokio::test]
async fn prepare_bootstraps_network() {
    let harness = Harness::new();
    harness.engine.prepare().await.unwrap();
    assert!(harness.runtime.with(|state| state.networks.contains("faas-net")));
}

#[test]
fn uid_round_trips_through_serde() {
    let uid: FunctionUid = serde_json::from_str("\"hello-world-7\"").unwrap();
    assert_eq!(uid.function_id().map(FunctionId::get), Some(7));
    assert!(serde_json::from_str::<FunctionUid>("\"noDash\"").is_err());
}
