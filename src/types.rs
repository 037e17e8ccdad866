//! Core value types shared across the observability subsystem.
//!
//! Everything here is a plain serde-serializable value. Consumers of the
//! public read surface (snapshot, detect, summaries) receive clones of these
//! types, never live references into locked state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Lifecycle status of a single flow event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Active,
    Completed,
    Failed,
}

/// One directed data-transfer event between two agents within a workflow run.
///
/// Created active by [`FlowRecorder::start`](crate::recorder::FlowRecorder::start)
/// and mutated exactly once on completion: latency is computed, status is
/// updated, and the stored history snapshot is replaced in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Process-unique identifier for this flow.
    pub flow_id: String,
    pub source_agent: String,
    pub target_agent: String,
    pub event_type: String,
    /// Start time of the transfer.
    pub timestamp: DateTime<Utc>,
    /// Groups all flow events of one workflow execution.
    pub correlation_id: String,
    pub status: FlowStatus,
    /// Wall-clock duration from start to completion, set on completion only.
    pub latency_ms: Option<f64>,
    /// Serialized size of the payload measured at start.
    pub payload_size_bytes: Option<usize>,
    pub metadata: HashMap<String, Value>,
}

/// Current activity status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Waiting,
    Error,
}

/// Rolling per-agent performance counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPerformanceMetrics {
    /// Exponential moving average of completion latency (alpha = 0.1).
    pub avg_latency_ms: f64,
    pub total_flows: u64,
    pub completed_flows: u64,
    pub failed_flows: u64,
}

/// Tracked state of one known agent, updated on every flow start/completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub name: String,
    pub category: String,
    pub status: AgentStatus,
    /// Event type the agent is currently involved in, if any.
    pub current_operation: Option<String>,
    pub last_activity: DateTime<Utc>,
    /// Most recent error reported for this agent, if any.
    pub last_error: Option<String>,
    pub performance_metrics: AgentPerformanceMetrics,
}

impl AgentState {
    pub(crate) fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            name: agent_id.to_string(),
            category: "unknown".to_string(),
            status: AgentStatus::Idle,
            current_operation: None,
            last_activity: Utc::now(),
            last_error: None,
            performance_metrics: AgentPerformanceMetrics::default(),
        }
    }
}

/// Aggregate flow counters refreshed on every write and by the monitor loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub total_flows: u64,
    pub active_flows: usize,
    pub completed_flows: u64,
    pub failed_flows: u64,
    pub flows_last_hour: usize,
    /// Mean completion latency over the retained history.
    pub avg_latency_ms: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Atomic point-in-time view of the whole recorder, safe to serialize and
/// hand to a polling API layer.
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub agent_states: HashMap<String, AgentState>,
    pub active_flows: Vec<Flow>,
    /// Most recent flows from the global history, newest last, capped at the
    /// configured recent-flows limit.
    pub recent_flows: Vec<Flow>,
    pub metrics: FlowMetrics,
}
