use crate::tool::FailureRecord;
use crate::{AgentRunId, HiveError, ObjectiveId, ToolCallId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-assigned priority of an objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(HiveError::Config(format!("Unknown priority '{other}'"))),
        }
    }
}

/// Lifecycle of an objective: `pending → running → {completed | failed | cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ObjectiveStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ObjectiveStatus::Completed | ObjectiveStatus::Failed | ObjectiveStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ObjectiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectiveStatus::Pending => write!(f, "pending"),
            ObjectiveStatus::Running => write!(f, "running"),
            ObjectiveStatus::Completed => write!(f, "completed"),
            ObjectiveStatus::Failed => write!(f, "failed"),
            ObjectiveStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A top-level unit of work submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub id: ObjectiveId,
    pub description: String,
    pub priority: Priority,
    pub status: ObjectiveStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Objective {
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectiveId::new(),
            description: description.into(),
            priority: Priority::Normal,
            status: ObjectiveStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Move to `status` unless the objective already reached a terminal state.
    /// Returns whether the transition happened.
    pub fn transition(&mut self, status: ObjectiveStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.updated_at = Utc::now();
        true
    }
}

/// Status of one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRunStatus {
    Waiting,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl AgentRunStatus {
    /// Terminal once the run has left `waiting`/`running`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentRunStatus::Succeeded | AgentRunStatus::Failed | AgentRunStatus::Skipped
        )
    }
}

impl std::fmt::Display for AgentRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRunStatus::Waiting => write!(f, "waiting"),
            AgentRunStatus::Running => write!(f, "running"),
            AgentRunStatus::Succeeded => write!(f, "succeeded"),
            AgentRunStatus::Failed => write!(f, "failed"),
            AgentRunStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One instantiation of an agent role for one objective.
///
/// Transitions go through the methods below; once terminal, a run ignores
/// further transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: AgentRunId,
    pub objective_id: ObjectiveId,
    pub role: String,
    pub batch_index: usize,
    pub status: AgentRunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tool_calls: Vec<ToolCallId>,
    #[serde(default)]
    pub failure: Option<FailureRecord>,
    /// Why the run was skipped, when it was.
    #[serde(default)]
    pub skip_reason: Option<String>,
}

impl AgentRun {
    pub fn new(objective_id: ObjectiveId, role: impl Into<String>, batch_index: usize) -> Self {
        Self {
            id: AgentRunId::new(),
            objective_id,
            role: role.into(),
            batch_index,
            status: AgentRunStatus::Waiting,
            started_at: None,
            ended_at: None,
            tool_calls: Vec::new(),
            failure: None,
            skip_reason: None,
        }
    }

    pub fn start(&mut self) -> bool {
        if self.status != AgentRunStatus::Waiting {
            return false;
        }
        self.status = AgentRunStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    pub fn succeed(&mut self) -> bool {
        self.finish(AgentRunStatus::Succeeded)
    }

    pub fn fail(&mut self, failure: FailureRecord) -> bool {
        if self.finish(AgentRunStatus::Failed) {
            self.failure = Some(failure);
            true
        } else {
            false
        }
    }

    /// Skip a waiting run, or a running run whose remaining work was abandoned.
    pub fn skip(&mut self, reason: impl Into<String>) -> bool {
        if self.finish(AgentRunStatus::Skipped) {
            self.skip_reason = Some(reason.into());
            true
        } else {
            false
        }
    }

    pub fn record_call(&mut self, id: ToolCallId) {
        self.tool_calls.push(id);
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(s), Some(e)) => Some((e - s).num_milliseconds()),
            _ => None,
        }
    }

    fn finish(&mut self, status: AgentRunStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
        true
    }
}
