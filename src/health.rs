//! Independent sliding-window agent reliability tracking.
//!
//! [`AgentHealthMonitor`] is deliberately decoupled from the flow recorder:
//! it classifies over its whole retained execution window, not over a time
//! window. That policy difference with the hour-based bottleneck rules is
//! intentional and must not be unified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::HealthConfig;

/// One recorded agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub duration_ms: f64,
    pub job_id: String,
    pub error: Option<String>,
}

/// Health classification over the retained window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failing,
    /// No executions recorded yet.
    Unknown,
}

/// Computed health view for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: String,
    pub status: HealthStatus,
    /// failed / total over the entire retained window.
    pub error_rate: f64,
    pub total_executions: usize,
    pub failed_executions: usize,
    pub avg_duration_ms: f64,
    pub last_execution: Option<DateTime<Utc>>,
    /// Most recent failures, oldest first, from the failure ring.
    pub recent_failures: Vec<ExecutionRecord>,
}

struct AgentWindow {
    records: VecDeque<ExecutionRecord>,
    failures: VecDeque<ExecutionRecord>,
}

/// Fixed-capacity per-agent execution tracker with whole-window health.
pub struct AgentHealthMonitor {
    config: HealthConfig,
    inner: Arc<RwLock<HashMap<String, AgentWindow>>>,
}

impl AgentHealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record one execution outcome for an agent. Failures also land in the
    /// smaller failure ring kept for quick inspection.
    pub async fn record(
        &self,
        agent_id: &str,
        success: bool,
        duration_ms: f64,
        job_id: &str,
        error: Option<String>,
    ) {
        let record = ExecutionRecord {
            timestamp: Utc::now(),
            success,
            duration_ms,
            job_id: job_id.to_string(),
            error,
        };
        let mut inner = self.inner.write().await;
        let window = inner
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentWindow {
                records: VecDeque::new(),
                failures: VecDeque::new(),
            });
        window.records.push_back(record.clone());
        while window.records.len() > self.config.window_size {
            window.records.pop_front();
        }
        if !success {
            window.failures.push_back(record);
            while window.failures.len() > self.config.failure_window_size {
                window.failures.pop_front();
            }
        }
    }

    /// Health of one agent, computed over the entire retained window.
    pub async fn health(&self, agent_id: &str) -> AgentHealth {
        let inner = self.inner.read().await;
        match inner.get(agent_id) {
            Some(window) => self.classify(agent_id, window),
            None => AgentHealth {
                agent_id: agent_id.to_string(),
                status: HealthStatus::Unknown,
                error_rate: 0.0,
                total_executions: 0,
                failed_executions: 0,
                avg_duration_ms: 0.0,
                last_execution: None,
                recent_failures: Vec::new(),
            },
        }
    }

    /// Health of every tracked agent.
    pub async fn all_health(&self) -> HashMap<String, AgentHealth> {
        let inner = self.inner.read().await;
        inner
            .iter()
            .map(|(agent_id, window)| (agent_id.clone(), self.classify(agent_id, window)))
            .collect()
    }

    fn classify(&self, agent_id: &str, window: &AgentWindow) -> AgentHealth {
        let total = window.records.len();
        if total == 0 {
            return AgentHealth {
                agent_id: agent_id.to_string(),
                status: HealthStatus::Unknown,
                error_rate: 0.0,
                total_executions: 0,
                failed_executions: 0,
                avg_duration_ms: 0.0,
                last_execution: None,
                recent_failures: Vec::new(),
            };
        }
        let failed = window.records.iter().filter(|r| !r.success).count();
        let error_rate = failed as f64 / total as f64;
        let status = if error_rate < self.config.healthy_threshold {
            HealthStatus::Healthy
        } else if error_rate < self.config.degraded_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Failing
        };
        let avg_duration_ms =
            window.records.iter().map(|r| r.duration_ms).sum::<f64>() / total as f64;
        AgentHealth {
            agent_id: agent_id.to_string(),
            status,
            error_rate,
            total_executions: total,
            failed_executions: failed,
            avg_duration_ms,
            last_execution: window.records.back().map(|r| r.timestamp),
            recent_failures: window.failures.iter().cloned().collect(),
        }
    }
}
