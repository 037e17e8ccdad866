//! Flow recording: the write path of the observability core.
//!
//! [`FlowRecorder`] records directed data-transfer events between agents,
//! maintains the active flow set, bounded global and per-correlation history
//! rings, and per-agent state, and feeds latency/outcome samples into
//! [`PerformanceAnalytics`]. A background monitor task periodically refreshes
//! aggregate metrics and logs bottleneck reports.

use anyhow::Result;
use chrono::Utc;
use log::{debug, warn};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::analytics::{
    error_metric, latency_metric, AgentPerformanceSummary, BottleneckForecast, MetricPoint,
    PerformanceAnalytics, Trend,
};
use crate::bottleneck::BottleneckDetector;
use crate::config::{AnalyticsConfig, RecorderConfig};
use crate::types::{AgentState, AgentStatus, Flow, FlowMetrics, FlowStatus, SystemSnapshot};

/// Callback invoked synchronously on every flow start and completion.
/// An `Err` return is logged and skipped; it never aborts the operation.
pub type FlowCallback = Box<dyn Fn(&Flow) -> Result<()> + Send + Sync>;

/// Callback invoked when an agent's state changes.
pub type AgentStateCallback = Box<dyn Fn(&AgentState) -> Result<()> + Send + Sync>;

/// Callback invoked when a flow completes as failed: `(agent_id, error)`.
pub type ErrorCallback = Box<dyn Fn(&str, &str) -> Result<()> + Send + Sync>;

struct RecorderInner {
    config: RecorderConfig,
    active_flows: HashMap<String, Flow>,
    flow_history: VecDeque<Flow>,
    correlation_history: HashMap<String, VecDeque<Flow>>,
    agent_states: HashMap<String, AgentState>,
    analytics: PerformanceAnalytics,
    metrics: FlowMetrics,
    flow_callbacks: Vec<FlowCallback>,
    agent_callbacks: Vec<AgentStateCallback>,
    error_callbacks: Vec<ErrorCallback>,
}

impl RecorderInner {
    fn touch_agent(
        &mut self,
        agent_id: &str,
        status: AgentStatus,
        operation: Option<&str>,
    ) -> AgentState {
        let state = self
            .agent_states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState::new(agent_id));
        state.status = status;
        state.current_operation = operation.map(str::to_string);
        state.last_activity = Utc::now();
        state.clone()
    }

    fn push_history(&mut self, flow: Flow) {
        let max = self.config.max_flow_history;
        self.flow_history.push_back(flow.clone());
        while self.flow_history.len() > max {
            self.flow_history.pop_front();
        }
        let per_correlation = self
            .correlation_history
            .entry(flow.correlation_id.clone())
            .or_default();
        per_correlation.push_back(flow);
        while per_correlation.len() > max {
            per_correlation.pop_front();
        }
    }

    /// Replace the history snapshots of a flow with its completed form, so
    /// each flow appears exactly once in each ring.
    fn update_history(&mut self, flow: &Flow) {
        if let Some(slot) = self
            .flow_history
            .iter_mut()
            .find(|f| f.flow_id == flow.flow_id)
        {
            *slot = flow.clone();
        }
        if let Some(ring) = self.correlation_history.get_mut(&flow.correlation_id) {
            if let Some(slot) = ring.iter_mut().find(|f| f.flow_id == flow.flow_id) {
                *slot = flow.clone();
            }
        }
    }

    fn refresh_metrics(&mut self) {
        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        let mut completed = 0u64;
        let mut failed = 0u64;
        let mut latency_sum = 0.0;
        let mut latency_count = 0usize;
        let mut last_hour = 0usize;
        for flow in &self.flow_history {
            match flow.status {
                FlowStatus::Completed => completed += 1,
                FlowStatus::Failed => failed += 1,
                FlowStatus::Active => {}
            }
            if let Some(latency) = flow.latency_ms {
                latency_sum += latency;
                latency_count += 1;
            }
            if flow.timestamp >= hour_ago {
                last_hour += 1;
            }
        }
        self.metrics = FlowMetrics {
            total_flows: self.metrics.total_flows,
            active_flows: self.active_flows.len(),
            completed_flows: completed,
            failed_flows: failed,
            flows_last_hour: last_hour,
            avg_latency_ms: if latency_count > 0 {
                latency_sum / latency_count as f64
            } else {
                0.0
            },
            last_updated: Some(Utc::now()),
        };
    }

    fn dispatch_flow_callbacks(&self, flow: &Flow) {
        for callback in &self.flow_callbacks {
            if let Err(e) = callback(flow) {
                warn!("flow callback failed for {}: {e:#}", flow.flow_id);
            }
        }
    }

    fn dispatch_agent_callbacks(&self, state: &AgentState) {
        for callback in &self.agent_callbacks {
            if let Err(e) = callback(state) {
                warn!("agent state callback failed for {}: {e:#}", state.agent_id);
            }
        }
    }

    fn dispatch_error_callbacks(&self, agent_id: &str, error: &str) {
        for callback in &self.error_callbacks {
            if let Err(e) = callback(agent_id, error) {
                warn!("error callback failed for {agent_id}: {e:#}");
            }
        }
    }
}

/// Records flows between agents and derives per-agent and aggregate metrics.
///
/// All mutable state lives behind one lock; callbacks run synchronously
/// inside the critical section and must not block on I/O.
pub struct FlowRecorder {
    config: RecorderConfig,
    inner: Arc<RwLock<RecorderInner>>,
}

impl FlowRecorder {
    pub fn new(config: RecorderConfig, analytics_config: AnalyticsConfig) -> Self {
        let inner = RecorderInner {
            config: config.clone(),
            active_flows: HashMap::new(),
            flow_history: VecDeque::new(),
            correlation_history: HashMap::new(),
            agent_states: HashMap::new(),
            analytics: PerformanceAnalytics::new(analytics_config),
            metrics: FlowMetrics::default(),
            flow_callbacks: Vec::new(),
            agent_callbacks: Vec::new(),
            error_callbacks: Vec::new(),
        };
        Self {
            config,
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Register an agent with a display name and category before its first
    /// flow. Unregistered agents are created on demand with defaults.
    pub async fn register_agent(&self, agent_id: &str, name: &str, category: &str) {
        let mut inner = self.inner.write().await;
        let state = inner
            .agent_states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState::new(agent_id));
        state.name = name.to_string();
        state.category = category.to_string();
    }

    pub async fn register_flow_callback(&self, callback: FlowCallback) {
        self.inner.write().await.flow_callbacks.push(callback);
    }

    pub async fn register_agent_callback(&self, callback: AgentStateCallback) {
        self.inner.write().await.agent_callbacks.push(callback);
    }

    pub async fn register_error_callback(&self, callback: ErrorCallback) {
        self.inner.write().await.error_callbacks.push(callback);
    }

    /// Record the start of a data transfer and return its flow id.
    ///
    /// The source agent becomes busy and the target waiting; the new flow is
    /// registered in the active set and both history rings, then flow
    /// callbacks fire with the active snapshot.
    pub async fn start(
        &self,
        source_agent: &str,
        target_agent: &str,
        event_type: &str,
        payload: &Value,
        correlation_id: &str,
    ) -> String {
        let flow_id = Uuid::new_v4().to_string();
        let payload_size_bytes = serde_json::to_vec(payload).map(|b| b.len()).ok();
        let flow = Flow {
            flow_id: flow_id.clone(),
            source_agent: source_agent.to_string(),
            target_agent: target_agent.to_string(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            correlation_id: correlation_id.to_string(),
            status: FlowStatus::Active,
            latency_ms: None,
            payload_size_bytes,
            metadata: HashMap::new(),
        };

        let mut inner = self.inner.write().await;
        let source_state = inner.touch_agent(source_agent, AgentStatus::Busy, Some(event_type));
        let target_state = inner.touch_agent(target_agent, AgentStatus::Waiting, Some(event_type));
        for agent_id in [source_agent, target_agent] {
            if let Some(state) = inner.agent_states.get_mut(agent_id) {
                state.performance_metrics.total_flows += 1;
            }
        }
        inner.metrics.total_flows += 1;
        inner.active_flows.insert(flow_id.clone(), flow.clone());
        inner.push_history(flow.clone());
        inner.refresh_metrics();

        inner.dispatch_agent_callbacks(&source_state);
        inner.dispatch_agent_callbacks(&target_state);
        inner.dispatch_flow_callbacks(&flow);
        debug!(
            "flow started: {flow_id} {source_agent} -> {target_agent} ({event_type}) corr={correlation_id}"
        );
        flow_id
    }

    /// Complete an active flow. Unknown flow ids are logged and ignored:
    /// flows may legitimately complete twice or after a reset.
    pub async fn complete(
        &self,
        flow_id: &str,
        status: FlowStatus,
        result: Option<Value>,
        error: Option<String>,
    ) {
        let mut inner = self.inner.write().await;
        let Some(mut flow) = inner.active_flows.remove(flow_id) else {
            warn!("completion for unknown flow id {flow_id}; ignoring");
            return;
        };

        let now = Utc::now();
        let latency_ms = (now - flow.timestamp).num_milliseconds().max(0) as f64;
        flow.latency_ms = Some(latency_ms);
        flow.status = if status == FlowStatus::Active {
            // Completing back to active makes no sense; treat as completed.
            FlowStatus::Completed
        } else {
            status
        };
        if let Some(result) = result {
            flow.metadata.insert("result".to_string(), result);
        }
        if let Some(error_text) = &error {
            flow.metadata
                .insert("error".to_string(), json!(error_text));
        }
        let failed = flow.status == FlowStatus::Failed;

        // Anomaly check runs against the trailing samples recorded before
        // this completion.
        let metric = latency_metric(&flow.target_agent);
        if inner.analytics.is_anomalous(&metric, latency_ms) {
            flow.metadata.insert("anomaly".to_string(), json!(true));
            debug!("anomalous latency {latency_ms}ms on {metric}");
        }
        inner.analytics.record(&metric, latency_ms, now);
        inner.analytics.record(
            &error_metric(&flow.target_agent),
            if failed { 1.0 } else { 0.0 },
            now,
        );

        let target_status = if failed {
            AgentStatus::Error
        } else {
            AgentStatus::Idle
        };
        let alpha = inner.config.ema_alpha;
        let target_agent = flow.target_agent.clone();
        let target_state = {
            let state = inner
                .agent_states
                .entry(target_agent.clone())
                .or_insert_with(|| AgentState::new(&target_agent));
            state.status = target_status;
            state.current_operation = None;
            state.last_activity = now;
            if failed {
                state.last_error = error.clone();
                state.performance_metrics.failed_flows += 1;
            } else {
                state.performance_metrics.completed_flows += 1;
            }
            let metrics = &mut state.performance_metrics;
            if metrics.completed_flows + metrics.failed_flows <= 1 {
                metrics.avg_latency_ms = latency_ms;
            } else {
                metrics.avg_latency_ms =
                    alpha * latency_ms + (1.0 - alpha) * metrics.avg_latency_ms;
            }
            state.clone()
        };

        // The source goes back to idle once none of its flows remain active.
        let source_agent = flow.source_agent.clone();
        let source_still_active = inner
            .active_flows
            .values()
            .any(|f| f.source_agent == source_agent);
        let source_state = if !source_still_active {
            let state = inner
                .agent_states
                .entry(source_agent.clone())
                .or_insert_with(|| AgentState::new(&source_agent));
            if state.status == AgentStatus::Busy {
                state.status = AgentStatus::Idle;
                state.current_operation = None;
                state.last_activity = now;
            }
            Some(state.clone())
        } else {
            None
        };

        inner.update_history(&flow);
        inner.refresh_metrics();

        inner.dispatch_agent_callbacks(&target_state);
        if let Some(state) = &source_state {
            inner.dispatch_agent_callbacks(state);
        }
        if failed {
            let message = error.as_deref().unwrap_or("unknown error");
            inner.dispatch_error_callbacks(&target_agent, message);
        }
        inner.dispatch_flow_callbacks(&flow);
        debug!("flow completed: {flow_id} status={:?} latency={latency_ms}ms", flow.status);
    }

    /// One atomic point-in-time view of agents, flows, and metrics. Always
    /// succeeds, even with zero history.
    pub async fn snapshot(&self) -> SystemSnapshot {
        let inner = self.inner.read().await;
        let recent_flows: Vec<Flow> = inner
            .flow_history
            .iter()
            .rev()
            .take(inner.config.recent_flows_limit)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        SystemSnapshot {
            agent_states: inner.agent_states.clone(),
            active_flows: inner.active_flows.values().cloned().collect(),
            recent_flows,
            metrics: inner.metrics.clone(),
        }
    }

    pub async fn active_flows(&self) -> Vec<Flow> {
        self.inner.read().await.active_flows.values().cloned().collect()
    }

    /// Most recent `limit` flows from the global history, oldest first.
    pub async fn flow_history(&self, limit: usize) -> Vec<Flow> {
        let inner = self.inner.read().await;
        let skip = inner.flow_history.len().saturating_sub(limit);
        inner.flow_history.iter().skip(skip).cloned().collect()
    }

    /// All retained flows for one workflow run, oldest first.
    pub async fn correlation_history(&self, correlation_id: &str) -> Vec<Flow> {
        let inner = self.inner.read().await;
        inner
            .correlation_history
            .get(correlation_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn agent_states(&self) -> HashMap<String, AgentState> {
        self.inner.read().await.agent_states.clone()
    }

    /// Windowed latency/outcome summary for one agent, from analytics.
    pub async fn agent_summary(&self, agent_id: &str, window_hours: f64) -> AgentPerformanceSummary {
        self.inner.read().await.analytics.agent_summary(agent_id, window_hours)
    }

    /// Trend of an agent's latency metric over a window.
    pub async fn latency_trend(&self, agent_id: &str, window_hours: f64) -> Option<Trend> {
        self.inner
            .read()
            .await
            .analytics
            .analyze_trend(&latency_metric(agent_id), window_hours)
    }

    /// Latency-bottleneck forecast for one agent, if its trend warrants one.
    pub async fn predict_bottleneck(&self, agent_id: &str) -> Option<BottleneckForecast> {
        self.inner.read().await.analytics.predict_bottleneck(agent_id)
    }

    /// Raw points of one analytics series.
    pub async fn metric_series(&self, metric_name: &str) -> Vec<MetricPoint> {
        self.inner.read().await.analytics.series(metric_name)
    }

    pub async fn metric_names(&self) -> Vec<String> {
        self.inner.read().await.analytics.metric_names()
    }

    /// Spawn the background monitor loop: refreshes aggregate metrics and
    /// logs bottleneck reports at the configured cadence until stopped.
    pub fn spawn_monitor(&self, detector: Arc<BottleneckDetector>) -> MonitorHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let inner = self.inner.clone();
        let interval = self.config.monitor_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                {
                    let mut guard = inner.write().await;
                    guard.refresh_metrics();
                }
                let reports = detector.detect().await;
                for report in &reports {
                    warn!(
                        "bottleneck: agent={} type={:?} severity={:?} occurrences={}",
                        report.agent_id,
                        report.bottleneck_type,
                        report.severity,
                        report.occurrence_count
                    );
                }
                if flag.load(Ordering::SeqCst) {
                    break;
                }
            }
            debug!("flow monitor loop stopped");
        });
        MonitorHandle {
            stop,
            handle,
            join_timeout: self.config.monitor_join_timeout,
        }
    }
}

/// Handle for the background monitor task. Stopping is cooperative: the task
/// finishes its current iteration, then exits; the join is bounded.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    join_timeout: std::time::Duration,
}

impl MonitorHandle {
    /// Signal the loop to stop and wait (bounded) for it to finish.
    pub async fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        if tokio::time::timeout(self.join_timeout, self.handle)
            .await
            .is_err()
        {
            warn!("monitor task did not stop within the join timeout");
        }
    }
}
