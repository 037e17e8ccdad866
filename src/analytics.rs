//! Time-series storage and derived performance signals.
//!
//! [`PerformanceAnalytics`] keeps named, bounded metric series and derives
//! trends, anomaly flags, per-agent summaries, and bottleneck forecasts from
//! them. It deliberately has no lock of its own: the recorder owns one
//! instance inside its guarded state and is the only writer.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::config::AnalyticsConfig;

/// One timestamped sample in a metric series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Direction of a metric trend after accounting for metric polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Stable,
}

/// Derived trend for one metric over an analysis window. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub metric_name: String,
    pub direction: TrendDirection,
    /// Slope relative to the window mean, in percent per hour.
    pub change_rate_pct_per_hour: f64,
    /// Extrapolated value one hour past the last in-window sample, floored at 0.
    pub predicted_next_value: f64,
}

/// Forecast emitted when an agent's latency trend is degrading fast enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckForecast {
    pub agent_id: String,
    pub metric_name: String,
    /// Capped at 100.
    pub confidence: f64,
    pub time_to_bottleneck_hours: f64,
    pub change_rate_pct_per_hour: f64,
    pub predicted_latency_ms: f64,
}

/// Windowed per-agent latency and outcome summary. All-zero when no samples
/// fall in the window; sparse history is expected steady state, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPerformanceSummary {
    pub agent_id: String,
    pub window_hours: f64,
    pub sample_count: usize,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub median_latency_ms: f64,
    /// Nearest-rank p95; equals the max below the configured sample floor.
    pub p95_latency_ms: f64,
    pub success_rate: f64,
    pub failure_rate: f64,
}

/// Named time-series store with trend, anomaly, and forecast derivation.
#[derive(Debug)]
pub struct PerformanceAnalytics {
    config: AnalyticsConfig,
    series: HashMap<String, VecDeque<MetricPoint>>,
}

impl PerformanceAnalytics {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            config,
            series: HashMap::new(),
        }
    }

    /// Append a sample to the named series, pruning from the front anything
    /// past the retention horizon or over the per-series point cap.
    pub fn record(&mut self, metric_name: &str, value: f64, timestamp: DateTime<Utc>) {
        let points = self.series.entry(metric_name.to_string()).or_default();
        points.push_back(MetricPoint { timestamp, value });

        let horizon = timestamp
            - ChronoDuration::from_std(self.config.retention)
                .unwrap_or_else(|_| ChronoDuration::hours(24));
        while let Some(front) = points.front() {
            if front.timestamp < horizon || points.len() > self.config.max_points_per_series {
                points.pop_front();
            } else {
                break;
            }
        }
    }

    /// Raw points of one series, oldest first.
    pub fn series(&self, metric_name: &str) -> Vec<MetricPoint> {
        self.series
            .get(metric_name)
            .map(|points| points.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `value` is a 3-sigma outlier against the trailing samples of
    /// the named series. Inactive until the series has enough samples.
    pub fn is_anomalous(&self, metric_name: &str, value: f64) -> bool {
        let Some(points) = self.series.get(metric_name) else {
            return false;
        };
        let trailing: Vec<f64> = points
            .iter()
            .rev()
            .take(self.config.anomaly_window)
            .map(|p| p.value)
            .collect();
        if trailing.len() < self.config.anomaly_min_samples {
            return false;
        }
        let mean = trailing.iter().sum::<f64>() / trailing.len() as f64;
        let variance =
            trailing.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / trailing.len() as f64;
        let std_dev = variance.sqrt();
        if std_dev <= f64::EPSILON {
            return false;
        }
        (value - mean).abs() > self.config.anomaly_sigma * std_dev
    }

    /// Least-squares trend of the named metric over the trailing window.
    ///
    /// Returns `None` when fewer than 2 points fall inside the window.
    /// Metric polarity is inferred from the name: for `latency`/`error`
    /// metrics a falling slope is an improvement.
    pub fn analyze_trend(&self, metric_name: &str, window_hours: f64) -> Option<Trend> {
        let points = self.points_in_window(metric_name, window_hours);
        if points.len() < 2 {
            return None;
        }

        let origin = points[0].timestamp;
        let samples: Vec<(f64, f64)> = points
            .iter()
            .map(|p| {
                let elapsed_hours = (p.timestamp - origin).num_milliseconds() as f64 / 3_600_000.0;
                (elapsed_hours, p.value)
            })
            .collect();

        let n = samples.len() as f64;
        let sum_t: f64 = samples.iter().map(|(t, _)| t).sum();
        let sum_v: f64 = samples.iter().map(|(_, v)| v).sum();
        let sum_tv: f64 = samples.iter().map(|(t, v)| t * v).sum();
        let sum_tt: f64 = samples.iter().map(|(t, _)| t * t).sum();
        let denominator = n * sum_tt - sum_t * sum_t;
        let slope = if denominator.abs() <= f64::EPSILON {
            0.0
        } else {
            (n * sum_tv - sum_t * sum_v) / denominator
        };
        let mean = sum_v / n;

        let lower_is_better =
            metric_name.contains("latency") || metric_name.contains("error");
        let direction = if slope.abs() < self.config.stable_slope_threshold {
            TrendDirection::Stable
        } else if (slope > 0.0) == lower_is_better {
            TrendDirection::Degrading
        } else {
            TrendDirection::Improving
        };

        let change_rate_pct_per_hour = if mean.abs() <= f64::EPSILON {
            0.0
        } else {
            slope / mean * 100.0
        };
        let last_elapsed = samples.last().map(|(t, _)| *t).unwrap_or(0.0);
        let predicted_next_value = (mean + slope * (last_elapsed + 1.0)).max(0.0);

        Some(Trend {
            metric_name: metric_name.to_string(),
            direction,
            change_rate_pct_per_hour,
            predicted_next_value,
        })
    }

    /// Forecast a latency bottleneck for an agent from its 1-hour trend.
    ///
    /// Emits only when the trend is degrading faster than the configured
    /// change-rate threshold.
    pub fn predict_bottleneck(&self, agent_id: &str) -> Option<BottleneckForecast> {
        let metric_name = latency_metric(agent_id);
        let trend = self.analyze_trend(&metric_name, 1.0)?;
        if trend.direction != TrendDirection::Degrading {
            return None;
        }
        let rate = trend.change_rate_pct_per_hour.abs();
        if rate <= self.config.prediction_change_rate_threshold {
            return None;
        }
        Some(BottleneckForecast {
            agent_id: agent_id.to_string(),
            metric_name,
            confidence: rate.min(100.0),
            time_to_bottleneck_hours: 100.0 / rate,
            change_rate_pct_per_hour: trend.change_rate_pct_per_hour,
            predicted_latency_ms: trend.predicted_next_value,
        })
    }

    /// Windowed latency/outcome summary for one agent.
    pub fn agent_summary(&self, agent_id: &str, window_hours: f64) -> AgentPerformanceSummary {
        let mut summary = AgentPerformanceSummary {
            agent_id: agent_id.to_string(),
            window_hours,
            ..AgentPerformanceSummary::default()
        };

        let latencies: Vec<f64> = self
            .points_in_window(&latency_metric(agent_id), window_hours)
            .iter()
            .map(|p| p.value)
            .collect();
        if latencies.is_empty() {
            return summary;
        }

        let mut sorted = latencies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        summary.sample_count = sorted.len();
        summary.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        summary.min_latency_ms = sorted[0];
        summary.max_latency_ms = sorted[sorted.len() - 1];
        summary.median_latency_ms = nearest_rank(&sorted, 50.0);
        summary.p95_latency_ms = if sorted.len() < self.config.p95_min_samples {
            summary.max_latency_ms
        } else {
            nearest_rank(&sorted, 95.0)
        };

        let outcomes = self.points_in_window(&error_metric(agent_id), window_hours);
        if !outcomes.is_empty() {
            let failures: f64 = outcomes.iter().map(|p| p.value).sum();
            summary.failure_rate = failures / outcomes.len() as f64;
            summary.success_rate = 1.0 - summary.failure_rate;
        }

        summary
    }

    fn points_in_window(&self, metric_name: &str, window_hours: f64) -> Vec<MetricPoint> {
        let Some(points) = self.series.get(metric_name) else {
            return Vec::new();
        };
        let cutoff = Utc::now()
            - ChronoDuration::milliseconds((window_hours * 3_600_000.0) as i64);
        points
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .copied()
            .collect()
    }
}

/// Metric name carrying an agent's completion latency samples.
pub fn latency_metric(agent_id: &str) -> String {
    format!("agent_{agent_id}_latency")
}

/// Metric name carrying an agent's completion outcomes (0 success, 1 failure).
pub fn error_metric(agent_id: &str) -> String {
    format!("agent_{agent_id}_errors")
}

/// Nearest-rank percentile over a sorted slice.
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn analytics() -> PerformanceAnalytics {
        PerformanceAnalytics::new(AnalyticsConfig::default())
    }

    #[test]
    fn trend_requires_two_points_in_window() {
        let mut analytics = analytics();
        assert!(analytics.analyze_trend("m", 1.0).is_none());

        let now = Utc::now();
        analytics.record("m", 10.0, now - ChronoDuration::minutes(10));
        assert!(analytics.analyze_trend("m", 1.0).is_none());

        analytics.record("m", 20.0, now);
        assert!(analytics.analyze_trend("m", 1.0).is_some());
    }

    #[test]
    fn rising_latency_is_degrading() {
        let mut analytics = analytics();
        let now = Utc::now();
        for i in 0..6 {
            let ts = now - ChronoDuration::minutes(50 - i * 10);
            analytics.record("agent_b_latency", 100.0 + i as f64 * 200.0, ts);
        }
        let trend = analytics.analyze_trend("agent_b_latency", 1.0).unwrap();
        assert_eq!(trend.direction, TrendDirection::Degrading);
        assert!(trend.change_rate_pct_per_hour > 0.0);
        assert!(trend.predicted_next_value >= 0.0);
    }

    #[test]
    fn falling_latency_is_improving() {
        let mut analytics = analytics();
        let now = Utc::now();
        for i in 0..6 {
            let ts = now - ChronoDuration::minutes(50 - i * 10);
            analytics.record("agent_b_latency", 1200.0 - i as f64 * 150.0, ts);
        }
        let trend = analytics.analyze_trend("agent_b_latency", 1.0).unwrap();
        assert_eq!(trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn flat_series_is_stable() {
        let mut analytics = analytics();
        let now = Utc::now();
        for i in 0..5 {
            analytics.record("m", 42.0, now - ChronoDuration::minutes(40 - i * 10));
        }
        let trend = analytics.analyze_trend("m", 1.0).unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn anomaly_needs_minimum_samples() {
        let mut analytics = analytics();
        let now = Utc::now();
        for i in 0..4 {
            analytics.record("m", 100.0 + i as f64, now);
        }
        assert!(!analytics.is_anomalous("m", 100_000.0));

        analytics.record("m", 104.0, now);
        assert!(analytics.is_anomalous("m", 100_000.0));
        assert!(!analytics.is_anomalous("m", 102.0));
    }

    #[test]
    fn summary_empty_without_samples() {
        let analytics = analytics();
        let summary = analytics.agent_summary("ghost", 1.0);
        assert_eq!(summary.sample_count, 0);
        assert_eq!(summary.avg_latency_ms, 0.0);
        assert_eq!(summary.failure_rate, 0.0);
    }

    #[test]
    fn summary_p95_falls_back_to_max_for_small_windows() {
        let mut analytics = analytics();
        let now = Utc::now();
        for v in [100.0, 200.0, 900.0] {
            analytics.record("agent_a_latency", v, now);
        }
        let summary = analytics.agent_summary("a", 1.0);
        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.p95_latency_ms, 900.0);
        assert_eq!(summary.median_latency_ms, 200.0);
    }

    #[test]
    fn summary_success_rate_from_outcomes() {
        let mut analytics = analytics();
        let now = Utc::now();
        for i in 0..10 {
            analytics.record("agent_a_latency", 50.0, now);
            let failed = if i == 0 { 1.0 } else { 0.0 };
            analytics.record("agent_a_errors", failed, now);
        }
        let summary = analytics.agent_summary("a", 1.0);
        assert!((summary.failure_rate - 0.1).abs() < 1e-9);
        assert!((summary.success_rate - 0.9).abs() < 1e-9);
    }

    #[test]
    fn forecast_only_when_degrading_fast() {
        let mut analytics = analytics();
        let now = Utc::now();
        // Latency doubling within the hour: change rate well above 20%/h.
        for i in 0..6 {
            let ts = now - ChronoDuration::minutes(50 - i * 10);
            analytics.record("agent_b_latency", 1000.0 + i as f64 * 400.0, ts);
        }
        let forecast = analytics.predict_bottleneck("b").unwrap();
        assert!(forecast.confidence <= 100.0);
        assert!(forecast.time_to_bottleneck_hours > 0.0);

        assert!(analytics.predict_bottleneck("steady").is_none());
    }

    #[test]
    fn series_is_bounded_by_retention() {
        let mut analytics = analytics();
        let now = Utc::now();
        analytics.record("m", 1.0, now - ChronoDuration::hours(30));
        analytics.record("m", 2.0, now);
        let points = analytics.series("m");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 2.0);
    }
}
