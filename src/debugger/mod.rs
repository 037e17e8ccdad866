//! Breakpoint-based step-through debugging of live workflow runs.
//!
//! A [`WorkflowDebugger`] manages debug sessions keyed by correlation id.
//! The execution engine calls [`WorkflowDebugger::check_breakpoints`] around
//! each agent event; a hit pauses the session until the caller steps or
//! continues. Completion is always an explicit caller action, never inferred
//! from the event stream.

pub mod condition;
pub mod error_analysis;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::DebuggerConfig;
use crate::recorder::FlowRecorder;
use crate::types::FlowStatus;
use self::condition::ConditionExpr;
use self::error_analysis::{ErrorAnalysis, ErrorClassifier, RecordedError, SimilarError};

/// Lifecycle status of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

/// A conditional pause point bound to an agent and event type.
///
/// Serialize-only: the compiled condition is not representable in serde, so
/// a deserialized breakpoint could never enforce its condition source.
#[derive(Debug, Clone, Serialize)]
pub struct Breakpoint {
    pub id: String,
    pub agent_id: String,
    pub event_type: String,
    /// Original condition source, if any.
    pub condition: Option<String>,
    #[serde(skip)]
    compiled: Option<ConditionExpr>,
    pub enabled: bool,
    /// Never exceeds `max_hits` when one is set; an exhausted breakpoint
    /// stays in place but becomes permanently inert.
    pub hit_count: u32,
    pub max_hits: Option<u32>,
}

/// One entry in a session's append-only step history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub event_type: String,
    pub data: Value,
    /// Breakpoint that caused the pause; `None` for step-mode pauses.
    pub breakpoint_id: Option<String>,
}

/// A step-through debugging session bound to one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSession {
    pub session_id: String,
    pub correlation_id: String,
    pub status: SessionStatus,
    /// When set, every matching event pauses regardless of breakpoints.
    pub step_mode: bool,
    pub breakpoints: Vec<Breakpoint>,
    pub step_history: Vec<StepRecord>,
    pub current_step: Option<StepRecord>,
    pub variables: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

struct DebuggerInner {
    sessions: HashMap<String, DebugSession>,
    error_history: VecDeque<RecordedError>,
}

/// Breakpoint and session manager consuming the recorder's flow history.
pub struct WorkflowDebugger {
    config: DebuggerConfig,
    recorder: Arc<FlowRecorder>,
    classifier: ErrorClassifier,
    inner: Arc<RwLock<DebuggerInner>>,
}

impl WorkflowDebugger {
    pub fn new(config: DebuggerConfig, recorder: Arc<FlowRecorder>) -> Self {
        Self {
            config,
            recorder,
            classifier: ErrorClassifier::new(),
            inner: Arc::new(RwLock::new(DebuggerInner {
                sessions: HashMap::new(),
                error_history: VecDeque::new(),
            })),
        }
    }

    /// Create a session for one workflow run and return its id.
    pub async fn create_session(&self, correlation_id: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = DebugSession {
            session_id: session_id.clone(),
            correlation_id: correlation_id.to_string(),
            status: SessionStatus::Active,
            step_mode: false,
            breakpoints: Vec::new(),
            step_history: Vec::new(),
            current_step: None,
            variables: HashMap::new(),
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .sessions
            .insert(session_id.clone(), session);
        debug!("debug session {session_id} created for correlation {correlation_id}");
        session_id
    }

    /// Add a breakpoint to a session. A condition, when present, is compiled
    /// immediately; invalid syntax is rejected here, not at hit time.
    pub async fn add_breakpoint(
        &self,
        session_id: &str,
        agent_id: &str,
        event_type: &str,
        condition: Option<&str>,
        max_hits: Option<u32>,
    ) -> Result<String> {
        let compiled = match condition {
            Some(source) => Some(
                ConditionExpr::parse(source)
                    .map_err(|e| anyhow!("invalid breakpoint condition `{source}`: {e}"))?,
            ),
            None => None,
        };
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("unknown debug session: {session_id}"))?;
        let breakpoint_id = Uuid::new_v4().to_string();
        session.breakpoints.push(Breakpoint {
            id: breakpoint_id.clone(),
            agent_id: agent_id.to_string(),
            event_type: event_type.to_string(),
            condition: condition.map(str::to_string),
            compiled,
            enabled: true,
            hit_count: 0,
            max_hits,
        });
        Ok(breakpoint_id)
    }

    pub async fn remove_breakpoint(&self, session_id: &str, breakpoint_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("unknown debug session: {session_id}"))?;
        let before = session.breakpoints.len();
        session.breakpoints.retain(|bp| bp.id != breakpoint_id);
        if session.breakpoints.len() == before {
            return Err(anyhow!("unknown breakpoint: {breakpoint_id}"));
        }
        Ok(())
    }

    pub async fn set_breakpoint_enabled(
        &self,
        session_id: &str,
        breakpoint_id: &str,
        enabled: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("unknown debug session: {session_id}"))?;
        let breakpoint = session
            .breakpoints
            .iter_mut()
            .find(|bp| bp.id == breakpoint_id)
            .ok_or_else(|| anyhow!("unknown breakpoint: {breakpoint_id}"))?;
        breakpoint.enabled = enabled;
        Ok(())
    }

    /// Check an agent event against the active session for its correlation
    /// id. Returns the paused session's id on a hit, `None` otherwise.
    ///
    /// In step mode the session pauses unconditionally. Otherwise breakpoints
    /// are scanned in insertion order and the first enabled match with
    /// remaining hits whose condition holds wins. A no-match leaves the
    /// session untouched.
    ///
    /// With several active sessions on one correlation id, the oldest wins
    /// on every call.
    pub async fn check_breakpoints(
        &self,
        agent_id: &str,
        event_type: &str,
        data: &Value,
        correlation_id: &str,
    ) -> Option<String> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .values_mut()
            .filter(|s| s.correlation_id == correlation_id && s.status == SessionStatus::Active)
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.session_id.cmp(&b.session_id))
            })?;

        if session.step_mode {
            let record = StepRecord {
                timestamp: Utc::now(),
                agent_id: agent_id.to_string(),
                event_type: event_type.to_string(),
                data: data.clone(),
                breakpoint_id: None,
            };
            session.status = SessionStatus::Paused;
            session.current_step = Some(record.clone());
            session.step_history.push(record);
            return Some(session.session_id.clone());
        }

        let hit_id = session.breakpoints.iter_mut().find_map(|bp| {
            if !bp.enabled || bp.agent_id != agent_id || bp.event_type != event_type {
                return None;
            }
            if let Some(max) = bp.max_hits {
                if bp.hit_count >= max {
                    return None;
                }
            }
            if let Some(expr) = &bp.compiled {
                if !expr.evaluate(data) {
                    debug!("breakpoint {} condition not met", bp.id);
                    return None;
                }
            }
            bp.hit_count += 1;
            Some(bp.id.clone())
        })?;

        let record = StepRecord {
            timestamp: Utc::now(),
            agent_id: agent_id.to_string(),
            event_type: event_type.to_string(),
            data: data.clone(),
            breakpoint_id: Some(hit_id),
        };
        session.status = SessionStatus::Paused;
        session.current_step = Some(record.clone());
        session.step_history.push(record);
        Some(session.session_id.clone())
    }

    /// Resume in step mode: the next matching event pauses again.
    pub async fn step_next(&self, session_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("unknown debug session: {session_id}"))?;
        session.step_mode = true;
        session.status = SessionStatus::Active;
        Ok(())
    }

    /// Resume normal execution, optionally removing all breakpoints so the
    /// session does not immediately re-trigger.
    pub async fn continue_execution(&self, session_id: &str, remove_breakpoints: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("unknown debug session: {session_id}"))?;
        session.step_mode = false;
        session.status = SessionStatus::Active;
        if remove_breakpoints {
            session.breakpoints.clear();
        }
        Ok(())
    }

    /// Mark a session completed. This is the only way a session completes.
    pub async fn complete_session(&self, session_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("unknown debug session: {session_id}"))?;
        session.status = SessionStatus::Completed;
        session.step_mode = false;
        Ok(())
    }

    /// Stash an inspection variable on the session.
    pub async fn set_variable(&self, session_id: &str, key: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("unknown debug session: {session_id}"))?;
        session.variables.insert(key.to_string(), value);
        Ok(())
    }

    pub async fn session(&self, session_id: &str) -> Option<DebugSession> {
        self.inner.read().await.sessions.get(session_id).cloned()
    }

    pub async fn sessions(&self) -> Vec<DebugSession> {
        self.inner.read().await.sessions.values().cloned().collect()
    }

    /// Append-only step history of one session, oldest first.
    pub async fn step_trace(&self, session_id: &str) -> Result<Vec<StepRecord>> {
        let inner = self.inner.read().await;
        let session = inner
            .sessions
            .get(session_id)
            .ok_or_else(|| anyhow!("unknown debug session: {session_id}"))?;
        Ok(session.step_history.clone())
    }

    /// Classify an error, find similar past errors, and suggest remediations.
    pub async fn analyze_error(
        &self,
        agent_id: &str,
        error: &str,
        context: &HashMap<String, Value>,
        correlation_id: &str,
    ) -> ErrorAnalysis {
        let error_type = self.classifier.error_type(error);
        let severity = self.classifier.severity(error, &error_type);
        let tokens = self.classifier.tokens(error);

        let mut inner = self.inner.write().await;
        let similar_errors: Vec<SimilarError> = inner
            .error_history
            .iter()
            .rev()
            .filter(|past| {
                past.error_type == error_type
                    && past.tokens.intersection(&tokens).count() >= self.config.min_shared_tokens
            })
            .take(self.config.max_similar_errors)
            .map(|past| SimilarError {
                error_id: past.error_id.clone(),
                agent_id: past.agent_id.clone(),
                message: past.message.clone(),
                timestamp: past.timestamp,
            })
            .collect();

        let mut suggestions = self.classifier.suggestions(
            error,
            context,
            similar_errors.len(),
            &error_type,
            self.config.large_payload_bytes,
        );
        suggestions.truncate(self.config.max_suggestions);

        let analysis = ErrorAnalysis {
            error_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            correlation_id: correlation_id.to_string(),
            error_type: error_type.clone(),
            severity,
            message: error.to_string(),
            similar_errors,
            suggestions,
            timestamp: Utc::now(),
        };

        inner.error_history.push_back(RecordedError {
            error_id: analysis.error_id.clone(),
            agent_id: agent_id.to_string(),
            correlation_id: correlation_id.to_string(),
            error_type,
            message: error.to_string(),
            severity,
            timestamp: analysis.timestamp,
            tokens,
        });
        while inner.error_history.len() > self.config.max_error_history {
            inner.error_history.pop_front();
        }

        analysis
    }

    /// Derive optimization recommendations purely from a run's flow history.
    pub async fn suggest_optimizations(&self, correlation_id: &str) -> Vec<String> {
        let flows = self.recorder.correlation_history(correlation_id).await;
        let mut recommendations = Vec::new();
        if flows.is_empty() {
            return recommendations;
        }

        let slow_threshold = self.config.slow_step_latency_ms;
        let slow: Vec<String> = flows
            .iter()
            .filter(|f| f.latency_ms.map(|l| l > slow_threshold).unwrap_or(false))
            .map(|f| format!("{} -> {} ({})", f.source_agent, f.target_agent, f.event_type))
            .collect();
        if !slow.is_empty() {
            recommendations.push(format!(
                "Steps exceeding {slow_threshold:.0} ms latency: {}; consider caching or splitting their workload",
                slow.join(", ")
            ));
        }

        let heavy: Vec<String> = flows
            .iter()
            .filter(|f| {
                f.payload_size_bytes
                    .map(|s| s > self.config.large_payload_bytes)
                    .unwrap_or(false)
            })
            .map(|f| format!("{} -> {}", f.source_agent, f.target_agent))
            .collect();
        if !heavy.is_empty() {
            recommendations.push(format!(
                "Payloads over {} bytes on: {}; pass references or compress instead of inlining data",
                self.config.large_payload_bytes,
                heavy.join(", ")
            ));
        }

        let finished: Vec<_> = flows
            .iter()
            .filter(|f| f.status != FlowStatus::Active)
            .collect();
        if !finished.is_empty() {
            let failed: Vec<&str> = finished
                .iter()
                .filter(|f| f.status == FlowStatus::Failed)
                .map(|f| f.target_agent.as_str())
                .collect();
            let failure_rate = failed.len() as f64 / finished.len() as f64;
            if failure_rate > self.config.failure_rate_threshold {
                let mut agents: Vec<&str> = failed;
                agents.sort_unstable();
                agents.dedup();
                recommendations.push(format!(
                    "Failure rate {:.0}% across this run; failing agents: {}",
                    failure_rate * 100.0,
                    agents.join(", ")
                ));
            }
        }

        recommendations
    }
}
