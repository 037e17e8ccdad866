//! Agent reliability scenarios over the sliding execution window.

use agentflow_observability::{HealthStatus, ObservabilityHub};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn twenty_executions_with_one_failure_is_degraded() {
    init_logging();
    let hub = ObservabilityHub::default();
    let health = hub.health();

    for i in 0..20 {
        let success = i != 7;
        let error = (!success).then(|| "transient failure".to_string());
        health
            .record("worker", success, 42.0, &format!("job-{i}"), error)
            .await;
    }

    let report = health.health("worker").await;
    assert!((report.error_rate - 0.05).abs() < 1e-9);
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.total_executions, 20);
    assert_eq!(report.failed_executions, 1);
    assert_eq!(report.recent_failures.len(), 1);
    assert_eq!(report.recent_failures[0].job_id, "job-7");
}

#[tokio::test]
async fn boundary_rates_classify_exactly() {
    init_logging();
    let hub = ObservabilityHub::default();
    let health = hub.health();

    // 4 failures out of 20: exactly 20% is failing, not degraded.
    for i in 0..20 {
        let success = i >= 4;
        health.record("edge", success, 10.0, "job", None).await;
    }
    assert_eq!(health.health("edge").await.status, HealthStatus::Failing);

    // 1 failure out of 25: 4% stays healthy.
    for i in 0..25 {
        let success = i != 0;
        health.record("steady", success, 10.0, "job", None).await;
    }
    assert_eq!(health.health("steady").await.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn unknown_agent_reports_unknown_not_error() {
    init_logging();
    let hub = ObservabilityHub::default();
    let report = hub.health().health("never-seen").await;
    assert_eq!(report.status, HealthStatus::Unknown);
    assert_eq!(report.total_executions, 0);

    // Health reports feed straight into the polling API.
    let serialized = serde_json::to_value(&report).expect("serializable");
    assert_eq!(serialized["status"], "unknown");
}

#[tokio::test]
async fn health_is_independent_of_flow_recording() {
    init_logging();
    let hub = ObservabilityHub::default();
    hub.recorder()
        .start("A", "B", "invoke", &serde_json::json!({}), "job1")
        .await;

    // Flow traffic alone never changes execution health.
    assert_eq!(hub.health().health("B").await.status, HealthStatus::Unknown);

    hub.health().record("B", true, 5.0, "job1", None).await;
    assert_eq!(hub.health().health("B").await.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn all_health_lists_every_tracked_agent() {
    init_logging();
    let hub = ObservabilityHub::default();
    hub.health().record("a", true, 1.0, "j", None).await;
    hub.health().record("b", false, 1.0, "j", Some("x".into())).await;

    let all = hub.health().all_health().await;
    assert_eq!(all.len(), 2);
    assert_eq!(all["a"].status, HealthStatus::Healthy);
    assert_eq!(all["b"].status, HealthStatus::Failing);
}
