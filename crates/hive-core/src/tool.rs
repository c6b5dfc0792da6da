use crate::{AgentRunId, ErrorKind, ToolCallId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Abstract action produced by an agent's reasoning step.
///
/// The router resolves `(verb, target)` to a concrete capability endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub verb: String,
    pub target: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl AgentAction {
    pub fn new(verb: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            target: target.into(),
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Terminal result of a tool call. Callers must branch on it; the invoker
/// never reports failure any other way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: serde_json::Value },
    Timeout,
    Error { kind: ErrorKind, detail: String },
}

impl ToolOutcome {
    pub fn success(payload: serde_json::Value) -> Self {
        ToolOutcome::Success { payload }
    }

    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        ToolOutcome::Error {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// The failure kind, `None` on success.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Timeout => Some(ErrorKind::Timeout),
            ToolOutcome::Error { kind, .. } => Some(*kind),
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            ToolOutcome::Success { payload } => Some(payload),
            _ => None,
        }
    }
}

/// One routed remote invocation, immutable once returned by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub agent_run_id: AgentRunId,
    /// Resolved capability name, or the raw action target if resolution failed.
    pub capability: String,
    pub request: serde_json::Value,
    pub attempts: u32,
    pub outcome: ToolOutcome,
    pub latency_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl ToolCall {
    /// Short human-readable description of a failed outcome.
    pub fn failure_detail(&self) -> Option<String> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Timeout => Some(format!(
                "'{}' timed out after {} attempt(s)",
                self.capability, self.attempts
            )),
            ToolOutcome::Error { kind, detail } => {
                Some(format!("'{}' failed ({kind}): {detail}", self.capability))
            }
        }
    }
}

/// What gets written to `patterns/failure/*` for a failed agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts,
            recorded_at: Utc::now(),
        }
    }
}
