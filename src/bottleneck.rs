//! Bottleneck classification over recorder and analytics state.
//!
//! [`BottleneckDetector::detect`] evaluates five independent rules per known
//! agent and returns ephemeral reports. Nothing about the underlying state is
//! mutated; the only detector-side state is the process-lifetime occurrence
//! counter per `(agent, type)` pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::analytics::TrendDirection;
use crate::config::DetectorConfig;
use crate::recorder::FlowRecorder;
use crate::types::AgentStatus;

/// Category of a detected bottleneck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckType {
    Latency,
    ErrorRate,
    Stuck,
    Throughput,
    Predicted,
}

impl BottleneckType {
    fn as_str(self) -> &'static str {
        match self {
            BottleneckType::Latency => "latency",
            BottleneckType::ErrorRate => "error_rate",
            BottleneckType::Stuck => "stuck",
            BottleneckType::Throughput => "throughput",
            BottleneckType::Predicted => "predicted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One detected bottleneck condition. Recomputed on every `detect()` call;
/// the id is deterministic per `(agent, type)` so unchanged state produces
/// structurally equal reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckReport {
    pub id: String,
    pub bottleneck_type: BottleneckType,
    pub agent_id: String,
    pub severity: Severity,
    pub metrics: HashMap<String, f64>,
    pub recommendations: Vec<String>,
    /// Times this `(agent, type)` condition has newly appeared over the
    /// process lifetime. Steady-state repeats do not advance it.
    pub occurrence_count: u64,
    pub detected_at: DateTime<Utc>,
}

#[derive(Default)]
struct DetectorState {
    occurrences: HashMap<(String, BottleneckType), u64>,
    firing: HashSet<(String, BottleneckType)>,
}

/// Read-only classifier over the recorder's agents and analytics series.
pub struct BottleneckDetector {
    config: DetectorConfig,
    recorder: Arc<FlowRecorder>,
    state: Mutex<DetectorState>,
}

impl BottleneckDetector {
    pub fn new(config: DetectorConfig, recorder: Arc<FlowRecorder>) -> Self {
        Self {
            config,
            recorder,
            state: Mutex::new(DetectorState::default()),
        }
    }

    /// Evaluate all rules for every known agent. An agent may yield several
    /// reports at once.
    pub async fn detect(&self) -> Vec<BottleneckReport> {
        let window = self.config.window_hours;
        let now = Utc::now();
        let agent_states = self.recorder.agent_states().await;
        let mut reports = Vec::new();

        let mut agent_ids: Vec<&String> = agent_states.keys().collect();
        agent_ids.sort();

        for agent_id in agent_ids {
            let state = &agent_states[agent_id];
            let summary = self.recorder.agent_summary(agent_id, window).await;

            // Rule 1: elevated error rate.
            if summary.sample_count > 0 && summary.failure_rate > self.config.error_rate_threshold {
                let severity = if summary.failure_rate > self.config.error_rate_high {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let mut metrics = HashMap::new();
                metrics.insert("error_rate".to_string(), summary.failure_rate);
                metrics.insert("sample_count".to_string(), summary.sample_count as f64);
                reports.push(self.report(
                    agent_id,
                    BottleneckType::ErrorRate,
                    severity,
                    metrics,
                    vec![
                        format!(
                            "Agent {agent_id} is failing {:.0}% of flows; inspect recent errors",
                            summary.failure_rate * 100.0
                        ),
                        "Check upstream payloads for malformed data".to_string(),
                        "Review the agent's recent configuration changes".to_string(),
                    ],
                    now,
                ));
            }

            // Rule 2: elevated average latency, escalating with magnitude.
            if summary.sample_count > 0 && summary.avg_latency_ms > self.config.latency_medium_ms {
                let severity = if summary.avg_latency_ms > self.config.latency_critical_ms {
                    Severity::Critical
                } else if summary.avg_latency_ms > self.config.latency_high_ms {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let mut recommendations = vec![
                    format!(
                        "Average latency for {agent_id} is {:.0} ms; profile the agent's workload",
                        summary.avg_latency_ms
                    ),
                    "Consider splitting large payloads or caching intermediate results"
                        .to_string(),
                ];
                let trend = self.recorder.latency_trend(agent_id, window).await;
                if trend.map(|t| t.direction) == Some(TrendDirection::Degrading) {
                    recommendations.insert(
                        0,
                        format!(
                            "Urgent: latency for {agent_id} is still rising; intervene before it degrades further"
                        ),
                    );
                }
                let mut metrics = HashMap::new();
                metrics.insert("avg_latency_ms".to_string(), summary.avg_latency_ms);
                metrics.insert("p95_latency_ms".to_string(), summary.p95_latency_ms);
                reports.push(self.report(
                    agent_id,
                    BottleneckType::Latency,
                    severity,
                    metrics,
                    recommendations,
                    now,
                ));
            }

            // Rule 3: busy agent with no activity past the stuck threshold.
            let inactive_secs = (now - state.last_activity).num_seconds().max(0) as f64;
            if state.status == AgentStatus::Busy
                && inactive_secs > self.config.stuck_threshold.as_secs() as f64
            {
                let mut metrics = HashMap::new();
                metrics.insert("seconds_since_activity".to_string(), inactive_secs);
                reports.push(self.report(
                    agent_id,
                    BottleneckType::Stuck,
                    Severity::High,
                    metrics,
                    vec![
                        format!(
                            "Agent {agent_id} has been busy without activity for {inactive_secs:.0}s; it may be stuck"
                        ),
                        "Check for deadlocked downstream calls or missing completions".to_string(),
                    ],
                    now,
                ));
            }

            // Rule 4: low throughput despite enough flows to judge.
            let flows_per_hour = summary.sample_count as f64 / window;
            if flows_per_hour < self.config.min_throughput_per_hour
                && summary.sample_count > self.config.min_flows_for_throughput
            {
                let mut metrics = HashMap::new();
                metrics.insert("flows_per_hour".to_string(), flows_per_hour);
                metrics.insert("sample_count".to_string(), summary.sample_count as f64);
                reports.push(self.report(
                    agent_id,
                    BottleneckType::Throughput,
                    Severity::Medium,
                    metrics,
                    vec![
                        format!(
                            "Agent {agent_id} is processing only {flows_per_hour:.1} flows/hour"
                        ),
                        "Check for queueing ahead of the agent or slow upstream producers"
                            .to_string(),
                    ],
                    now,
                ));
            }

            // Rule 5: predictive, from the latency trend forecast.
            if let Some(forecast) = self.recorder.predict_bottleneck(agent_id).await {
                let mut metrics = HashMap::new();
                metrics.insert("confidence".to_string(), forecast.confidence);
                metrics.insert(
                    "time_to_bottleneck_hours".to_string(),
                    forecast.time_to_bottleneck_hours,
                );
                metrics.insert(
                    "predicted_latency_ms".to_string(),
                    forecast.predicted_latency_ms,
                );
                reports.push(self.report(
                    agent_id,
                    BottleneckType::Predicted,
                    Severity::Low,
                    metrics,
                    vec![format!(
                        "Latency for {agent_id} is trending toward a bottleneck in ~{:.1}h (confidence {:.0}%)",
                        forecast.time_to_bottleneck_hours, forecast.confidence
                    )],
                    now,
                ));
            }
        }

        self.apply_occurrences(&mut reports).await;
        reports
    }

    fn report(
        &self,
        agent_id: &str,
        bottleneck_type: BottleneckType,
        severity: Severity,
        metrics: HashMap<String, f64>,
        recommendations: Vec<String>,
        detected_at: DateTime<Utc>,
    ) -> BottleneckReport {
        BottleneckReport {
            id: format!("{agent_id}:{}", bottleneck_type.as_str()),
            bottleneck_type,
            agent_id: agent_id.to_string(),
            severity,
            metrics,
            recommendations,
            occurrence_count: 0,
            detected_at,
        }
    }

    /// Advance the lifetime occurrence counter for conditions that newly
    /// appeared since the previous pass, then stamp every report.
    async fn apply_occurrences(&self, reports: &mut [BottleneckReport]) {
        let mut state = self.state.lock().await;
        let current: HashSet<(String, BottleneckType)> = reports
            .iter()
            .map(|r| (r.agent_id.clone(), r.bottleneck_type))
            .collect();
        for key in &current {
            if !state.firing.contains(key) {
                *state.occurrences.entry(key.clone()).or_insert(0) += 1;
            }
        }
        state.firing = current;
        for report in reports.iter_mut() {
            let key = (report.agent_id.clone(), report.bottleneck_type);
            report.occurrence_count = state.occurrences.get(&key).copied().unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyticsConfig, RecorderConfig};
    use serde_json::json;

    async fn recorder_with_failures(failed: usize, total: usize) -> Arc<FlowRecorder> {
        let recorder = Arc::new(FlowRecorder::new(
            RecorderConfig::default(),
            AnalyticsConfig::default(),
        ));
        for i in 0..total {
            let flow_id = recorder
                .start("driver", "worker", "invoke", &json!({}), "run")
                .await;
            let status = if i < failed {
                crate::types::FlowStatus::Failed
            } else {
                crate::types::FlowStatus::Completed
            };
            let error = (i < failed).then(|| "downstream failure".to_string());
            recorder.complete(&flow_id, status, None, error).await;
        }
        recorder
    }

    #[tokio::test]
    async fn error_rate_rule_fires_with_severity() {
        let recorder = recorder_with_failures(6, 10).await;
        let detector = BottleneckDetector::new(DetectorConfig::default(), recorder);
        let reports = detector.detect().await;
        let report = reports
            .iter()
            .find(|r| r.bottleneck_type == BottleneckType::ErrorRate && r.agent_id == "worker")
            .expect("error rate report");
        assert_eq!(report.severity, Severity::High);
        assert!(report.metrics["error_rate"] > 0.5);
        assert_eq!(report.occurrence_count, 1);
    }

    #[tokio::test]
    async fn repeated_detect_is_structurally_stable() {
        let recorder = recorder_with_failures(6, 10).await;
        let detector = BottleneckDetector::new(DetectorConfig::default(), recorder);
        let first = detector.detect().await;
        let second = detector.detect().await;
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.severity, b.severity);
            assert_eq!(a.recommendations, b.recommendations);
            // Occurrence count holds steady while the condition persists.
            assert_eq!(a.occurrence_count, b.occurrence_count);
        }
    }

    #[tokio::test]
    async fn healthy_agents_produce_no_reports() {
        let recorder = recorder_with_failures(0, 3).await;
        let detector = BottleneckDetector::new(DetectorConfig::default(), recorder);
        // Three fast successful flows: under every threshold.
        assert!(detector.detect().await.is_empty());
    }
}
