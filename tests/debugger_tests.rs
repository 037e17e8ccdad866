//! Step-through debugging scenarios: breakpoints, sessions, error analysis.

use agentflow_observability::{ErrorSeverity, FlowStatus, ObservabilityHub, SessionStatus};
use serde_json::json;
use std::collections::HashMap;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn breakpoint_with_max_hits_one_fires_exactly_once() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();

    let session_id = debugger.create_session("job1").await;
    debugger
        .add_breakpoint(&session_id, "B", "invoke", None, Some(1))
        .await
        .unwrap();

    let first = debugger
        .check_breakpoints("B", "invoke", &json!({}), "job1")
        .await;
    assert_eq!(first.as_deref(), Some(session_id.as_str()));

    let session = debugger.session(&session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Paused);
    assert_eq!(session.breakpoints[0].hit_count, 1);

    debugger.continue_execution(&session_id, false).await.unwrap();

    // Identical second event: the breakpoint is exhausted and stays inert.
    let second = debugger
        .check_breakpoints("B", "invoke", &json!({}), "job1")
        .await;
    assert!(second.is_none());
    let session = debugger.session(&session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.breakpoints.len(), 1);
    assert_eq!(session.breakpoints[0].hit_count, 1);
}

#[tokio::test]
async fn breakpoint_with_max_hits_two_fires_exactly_twice() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();

    let session_id = debugger.create_session("job1").await;
    debugger
        .add_breakpoint(&session_id, "B", "invoke", None, Some(2))
        .await
        .unwrap();

    for expected_hits in [1u32, 2] {
        let hit = debugger
            .check_breakpoints("B", "invoke", &json!({}), "job1")
            .await;
        assert!(hit.is_some(), "hit {expected_hits} should fire");
        let session = debugger.session(&session_id).await.unwrap();
        assert_eq!(session.breakpoints[0].hit_count, expected_hits);
        debugger.continue_execution(&session_id, false).await.unwrap();
    }

    let third = debugger
        .check_breakpoints("B", "invoke", &json!({}), "job1")
        .await;
    assert!(third.is_none());
    let session = debugger.session(&session_id).await.unwrap();
    // hit_count never exceeds max_hits.
    assert_eq!(session.breakpoints[0].hit_count, 2);
}

#[tokio::test]
async fn breakpoints_match_in_insertion_order() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();
    let session_id = debugger.create_session("job1").await;

    let first = debugger
        .add_breakpoint(&session_id, "B", "invoke", None, None)
        .await
        .unwrap();
    let _second = debugger
        .add_breakpoint(&session_id, "B", "invoke", None, None)
        .await
        .unwrap();

    debugger
        .check_breakpoints("B", "invoke", &json!({}), "job1")
        .await
        .unwrap();
    let trace = debugger.step_trace(&session_id).await.unwrap();
    assert_eq!(trace[0].breakpoint_id.as_deref(), Some(first.as_str()));
}

#[tokio::test]
async fn disabled_breakpoints_are_skipped() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();
    let session_id = debugger.create_session("job1").await;
    let breakpoint_id = debugger
        .add_breakpoint(&session_id, "B", "invoke", None, None)
        .await
        .unwrap();
    debugger
        .set_breakpoint_enabled(&session_id, &breakpoint_id, false)
        .await
        .unwrap();

    assert!(debugger
        .check_breakpoints("B", "invoke", &json!({}), "job1")
        .await
        .is_none());
}

#[tokio::test]
async fn step_mode_walks_events_one_at_a_time() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();
    let session_id = debugger.create_session("job1").await;

    debugger.step_next(&session_id).await.unwrap();
    assert!(debugger
        .check_breakpoints("A", "plan", &json!({"step": 1}), "job1")
        .await
        .is_some());

    debugger.step_next(&session_id).await.unwrap();
    assert!(debugger
        .check_breakpoints("B", "execute", &json!({"step": 2}), "job1")
        .await
        .is_some());

    let trace = debugger.step_trace(&session_id).await.unwrap();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].agent_id, "A");
    assert_eq!(trace[1].agent_id, "B");
    // Step history is append-only and survives resumes.
    debugger.continue_execution(&session_id, false).await.unwrap();
    assert_eq!(debugger.step_trace(&session_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn conditions_gate_hits_on_event_data() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();
    let session_id = debugger.create_session("job1").await;
    debugger
        .add_breakpoint(
            &session_id,
            "B",
            "invoke",
            Some("attempt >= 3 and error.kind contains 'timeout'"),
            None,
        )
        .await
        .unwrap();

    let miss = debugger
        .check_breakpoints(
            "B",
            "invoke",
            &json!({"attempt": 3, "error": {"kind": "refused"}}),
            "job1",
        )
        .await;
    assert!(miss.is_none());

    let hit = debugger
        .check_breakpoints(
            "B",
            "invoke",
            &json!({"attempt": 4, "error": {"kind": "timeout waiting for B"}}),
            "job1",
        )
        .await;
    assert!(hit.is_some());
}

#[tokio::test]
async fn sessions_for_other_correlations_are_untouched() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();
    let watching = debugger.create_session("job1").await;
    let other = debugger.create_session("job2").await;
    debugger
        .add_breakpoint(&watching, "B", "invoke", None, None)
        .await
        .unwrap();

    debugger
        .check_breakpoints("B", "invoke", &json!({}), "job1")
        .await
        .unwrap();

    assert_eq!(
        debugger.session(&other).await.unwrap().status,
        SessionStatus::Active
    );
    assert!(debugger.session(&other).await.unwrap().step_history.is_empty());
}

#[tokio::test]
async fn oldest_active_session_wins_for_a_shared_correlation() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();

    let older = debugger.create_session("job1").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = debugger.create_session("job1").await;
    for session_id in [&older, &newer] {
        debugger
            .add_breakpoint(session_id, "B", "invoke", None, None)
            .await
            .unwrap();
    }

    // Every event routes to the oldest active session, call after call.
    for _ in 0..3 {
        let hit = debugger
            .check_breakpoints("B", "invoke", &json!({}), "job1")
            .await;
        assert_eq!(hit.as_deref(), Some(older.as_str()));
        debugger.continue_execution(&older, false).await.unwrap();
    }
    let untouched = debugger.session(&newer).await.unwrap();
    assert_eq!(untouched.status, SessionStatus::Active);
    assert!(untouched.step_history.is_empty());
    assert_eq!(untouched.breakpoints[0].hit_count, 0);
}

#[tokio::test]
async fn sessions_serialize_with_condition_source() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();
    let session_id = debugger.create_session("job1").await;
    debugger
        .add_breakpoint(&session_id, "B", "invoke", Some("size > 100"), None)
        .await
        .unwrap();

    let session = debugger.session(&session_id).await.unwrap();
    let serialized = serde_json::to_value(&session).expect("session serializes");
    assert_eq!(serialized["breakpoints"][0]["condition"], "size > 100");
}

#[tokio::test]
async fn error_analysis_classifies_and_suggests() {
    init_logging();
    let hub = ObservabilityHub::default();
    let debugger = hub.debugger();
    let context = HashMap::new();

    let analysis = debugger
        .analyze_error(
            "B",
            "connection refused while calling inference backend",
            &context,
            "job1",
        )
        .await;
    assert_eq!(analysis.error_type, "ConnectionError");
    assert!(!analysis.suggestions.is_empty());
    assert!(analysis.suggestions.len() <= 5);

    let panic_analysis = debugger
        .analyze_error("B", "worker panicked: index out of range", &context, "job1")
        .await;
    assert_eq!(panic_analysis.severity, ErrorSeverity::Critical);
}

#[tokio::test]
async fn optimization_suggestions_come_from_flow_history() {
    init_logging();
    let hub = ObservabilityHub::default();
    let recorder = hub.recorder();
    let debugger = hub.debugger();

    // A large payload plus a high failure rate in one run.
    let big_payload = json!({ "blob": "x".repeat(2 * 1024 * 1024) });
    let heavy = recorder.start("A", "B", "transfer", &big_payload, "job1").await;
    recorder.complete(&heavy, FlowStatus::Completed, None, None).await;
    let failing = recorder.start("A", "C", "invoke", &json!({}), "job1").await;
    recorder
        .complete(&failing, FlowStatus::Failed, None, Some("boom".into()))
        .await;

    let recommendations = debugger.suggest_optimizations("job1").await;
    assert!(recommendations.iter().any(|r| r.contains("A -> B")));
    assert!(recommendations.iter().any(|r| r.contains("C")));

    assert!(debugger.suggest_optimizations("unknown-run").await.is_empty());
}
