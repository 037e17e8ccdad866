//! Observability and debugging core for multi-agent workflow orchestration.
//!
//! This crate tracks data flow between agents during a workflow run, derives
//! real-time and historical performance metrics, detects and predicts
//! bottlenecks, tracks agent reliability, and provides breakpoint-based
//! step-through debugging of live runs. All state is in-memory and
//! best-effort; agent execution itself and durable persistence live in
//! external collaborators.
//!
//! Construct one [`ObservabilityHub`] at startup and share it: the execution
//! engine calls [`FlowRecorder::start`]/[`FlowRecorder::complete`] around
//! every agent invocation and [`WorkflowDebugger::check_breakpoints`] around
//! every agent event, threading one correlation id per workflow run; the API
//! layer polls [`FlowRecorder::snapshot`], [`BottleneckDetector::detect`],
//! and the debugger's session accessors.

pub mod analytics;
pub mod bottleneck;
pub mod config;
pub mod debugger;
pub mod health;
pub mod hub;
pub mod recorder;
pub mod types;

pub use analytics::{
    AgentPerformanceSummary, BottleneckForecast, MetricPoint, PerformanceAnalytics, Trend,
    TrendDirection,
};
pub use bottleneck::{BottleneckDetector, BottleneckReport, BottleneckType, Severity};
pub use config::{
    AnalyticsConfig, DebuggerConfig, DetectorConfig, HealthConfig, ObservabilityConfig,
    RecorderConfig,
};
pub use debugger::condition::{ConditionError, ConditionExpr};
pub use debugger::error_analysis::{ErrorAnalysis, ErrorSeverity, SimilarError};
pub use debugger::{Breakpoint, DebugSession, SessionStatus, StepRecord, WorkflowDebugger};
pub use health::{AgentHealth, AgentHealthMonitor, ExecutionRecord, HealthStatus};
pub use hub::ObservabilityHub;
pub use recorder::{AgentStateCallback, ErrorCallback, FlowCallback, FlowRecorder, MonitorHandle};
pub use types::{
    AgentPerformanceMetrics, AgentState, AgentStatus, Flow, FlowMetrics, FlowStatus,
    SystemSnapshot,
};
