//! Construction-time configuration for every component.
//!
//! The defaults below are part of the observable contract: window sizes,
//! retention, detector thresholds, the EMA smoothing factor, and the monitor
//! cadence must match these literals for drop-in compatibility with existing
//! producers and consumers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`FlowRecorder`](crate::recorder::FlowRecorder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Capacity of the global and per-correlation flow history rings.
    pub max_flow_history: usize,
    /// Smoothing factor for the per-agent latency EMA.
    pub ema_alpha: f64,
    /// Number of recent flows returned by a snapshot.
    pub recent_flows_limit: usize,
    /// Cadence of the background monitor loop.
    pub monitor_interval: Duration,
    /// Upper bound on waiting for the monitor task to stop.
    pub monitor_join_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_flow_history: 1000,
            ema_alpha: 0.1,
            recent_flows_limit: 20,
            monitor_interval: Duration::from_secs(5),
            monitor_join_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration for [`PerformanceAnalytics`](crate::analytics::PerformanceAnalytics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Maximum points retained per metric series.
    pub max_points_per_series: usize,
    /// Retention horizon; older points are pruned on write.
    pub retention: Duration,
    /// Absolute slope (units per hour) below which a trend is stable.
    pub stable_slope_threshold: f64,
    /// Minimum |change rate| (percent per hour) to emit a bottleneck forecast.
    pub prediction_change_rate_threshold: f64,
    /// Trailing sample count for the anomaly check.
    pub anomaly_window: usize,
    /// Minimum samples required before anomaly detection activates.
    pub anomaly_min_samples: usize,
    /// Sigma multiplier for the anomaly rule.
    pub anomaly_sigma: f64,
    /// Sample count below which p95 falls back to the max.
    pub p95_min_samples: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            max_points_per_series: 1000,
            retention: Duration::from_secs(24 * 60 * 60),
            stable_slope_threshold: 0.01,
            prediction_change_rate_threshold: 20.0,
            anomaly_window: 50,
            anomaly_min_samples: 5,
            anomaly_sigma: 3.0,
            p95_min_samples: 20,
        }
    }
}

/// Thresholds for [`BottleneckDetector`](crate::bottleneck::BottleneckDetector).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Evaluation window for rate/latency rules, in hours.
    pub window_hours: f64,
    /// Error rate above which an error-rate report fires.
    pub error_rate_threshold: f64,
    /// Error rate above which the report escalates to high severity.
    pub error_rate_high: f64,
    pub latency_medium_ms: f64,
    pub latency_high_ms: f64,
    pub latency_critical_ms: f64,
    /// A busy agent inactive longer than this is considered stuck.
    pub stuck_threshold: Duration,
    /// Flows per hour below which throughput is considered low.
    pub min_throughput_per_hour: f64,
    /// Minimum in-window flow count before the throughput rule applies.
    pub min_flows_for_throughput: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_hours: 1.0,
            error_rate_threshold: 0.20,
            error_rate_high: 0.50,
            latency_medium_ms: 5000.0,
            latency_high_ms: 7000.0,
            latency_critical_ms: 10000.0,
            stuck_threshold: Duration::from_secs(300),
            min_throughput_per_hour: 10.0,
            min_flows_for_throughput: 5,
        }
    }
}

/// Configuration for [`AgentHealthMonitor`](crate::health::AgentHealthMonitor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Execution records retained per agent.
    pub window_size: usize,
    /// Failure records retained per agent alongside the main window.
    pub failure_window_size: usize,
    /// Error rate below which the agent is healthy.
    pub healthy_threshold: f64,
    /// Error rate below which the agent is degraded; at or above it, failing.
    pub degraded_threshold: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            failure_window_size: 10,
            healthy_threshold: 0.05,
            degraded_threshold: 0.20,
        }
    }
}

/// Configuration for [`WorkflowDebugger`](crate::debugger::WorkflowDebugger).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebuggerConfig {
    /// Analyzed errors retained for similar-error lookups.
    pub max_error_history: usize,
    /// Maximum similar errors returned per analysis.
    pub max_similar_errors: usize,
    /// Maximum suggestions returned per analysis.
    pub max_suggestions: usize,
    /// Shared message tokens required for two errors to be similar.
    pub min_shared_tokens: usize,
    /// Step latency above which an optimization suggestion is produced.
    pub slow_step_latency_ms: f64,
    /// Payload size above which an optimization suggestion is produced.
    pub large_payload_bytes: usize,
    /// Aggregate failure rate above which an optimization suggestion fires.
    pub failure_rate_threshold: f64,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            max_error_history: 200,
            max_similar_errors: 5,
            max_suggestions: 5,
            min_shared_tokens: 3,
            slow_step_latency_ms: 5000.0,
            large_payload_bytes: 1024 * 1024,
            failure_rate_threshold: 0.10,
        }
    }
}

/// Top-level configuration bundle consumed by
/// [`ObservabilityHub`](crate::hub::ObservabilityHub).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub recorder: RecorderConfig,
    pub analytics: AnalyticsConfig,
    pub detector: DetectorConfig,
    pub health: HealthConfig,
    pub debugger: DebuggerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.recorder.max_flow_history, 1000);
        assert_eq!(config.recorder.ema_alpha, 0.1);
        assert_eq!(config.recorder.recent_flows_limit, 20);
        assert_eq!(config.recorder.monitor_interval, Duration::from_secs(5));
        assert_eq!(config.analytics.retention, Duration::from_secs(86400));
        assert_eq!(config.analytics.anomaly_window, 50);
        assert_eq!(config.analytics.anomaly_min_samples, 5);
        assert_eq!(config.detector.error_rate_threshold, 0.20);
        assert_eq!(config.detector.latency_medium_ms, 5000.0);
        assert_eq!(config.detector.stuck_threshold, Duration::from_secs(300));
        assert_eq!(config.health.window_size, 100);
        assert_eq!(config.health.failure_window_size, 10);
    }
}
