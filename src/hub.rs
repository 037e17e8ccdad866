//! Explicit wiring of the observability components.
//!
//! [`ObservabilityHub`] replaces module-level singletons: it is constructed
//! once at startup and passed by reference to producers (execution engine)
//! and consumers (API layer). Per-test isolation falls out for free, since
//! every hub owns independent state.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bottleneck::BottleneckDetector;
use crate::config::ObservabilityConfig;
use crate::debugger::WorkflowDebugger;
use crate::health::AgentHealthMonitor;
use crate::recorder::{FlowRecorder, MonitorHandle};

/// One registry holding every observability component for a process.
pub struct ObservabilityHub {
    recorder: Arc<FlowRecorder>,
    detector: Arc<BottleneckDetector>,
    health: Arc<AgentHealthMonitor>,
    debugger: Arc<WorkflowDebugger>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl ObservabilityHub {
    pub fn new(config: ObservabilityConfig) -> Self {
        let recorder = Arc::new(FlowRecorder::new(config.recorder, config.analytics));
        let detector = Arc::new(BottleneckDetector::new(config.detector, recorder.clone()));
        let health = Arc::new(AgentHealthMonitor::new(config.health));
        let debugger = Arc::new(WorkflowDebugger::new(config.debugger, recorder.clone()));
        Self {
            recorder,
            detector,
            health,
            debugger,
            monitor: Mutex::new(None),
        }
    }

    pub fn recorder(&self) -> &Arc<FlowRecorder> {
        &self.recorder
    }

    pub fn detector(&self) -> &Arc<BottleneckDetector> {
        &self.detector
    }

    pub fn health(&self) -> &Arc<AgentHealthMonitor> {
        &self.health
    }

    pub fn debugger(&self) -> &Arc<WorkflowDebugger> {
        &self.debugger
    }

    /// Start the recorder's background monitor loop. Idempotent: a second
    /// call while the loop runs is a no-op.
    pub async fn start_monitoring(&self) {
        let mut monitor = self.monitor.lock().await;
        if monitor.is_none() {
            *monitor = Some(self.recorder.spawn_monitor(self.detector.clone()));
        }
    }

    /// Cooperatively stop the monitor loop, if running.
    pub async fn stop_monitoring(&self) {
        let handle = self.monitor.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}

impl Default for ObservabilityHub {
    fn default() -> Self {
        Self::new(ObservabilityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hubs_are_isolated() {
        let first = ObservabilityHub::default();
        let second = ObservabilityHub::default();
        first
            .recorder()
            .start("a", "b", "invoke", &serde_json::json!({}), "run1")
            .await;
        assert_eq!(first.recorder().snapshot().await.active_flows.len(), 1);
        assert!(second.recorder().snapshot().await.active_flows.is_empty());
    }

    #[tokio::test]
    async fn monitor_starts_and_stops() {
        let hub = ObservabilityHub::default();
        hub.start_monitoring().await;
        hub.start_monitoring().await;
        hub.stop_monitoring().await;
        hub.stop_monitoring().await;
    }
}
