use hive_core::{AgentRun, AgentRunId, AgentRunStatus, ToolCall};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    Error,
}

/// Counters accumulated per role across objectives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMetrics {
    pub runs: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
    pub tool_calls: u32,
    /// Transport attempts, including retries.
    pub attempts: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleState {
    pub role: String,
    pub current_runs: Vec<AgentRunId>,
    pub status: WorkerStatus,
    pub metrics: RoleMetrics,
}

impl RoleState {
    fn new(role: &str) -> Self {
        Self {
            role: role.to_string(),
            current_runs: Vec::new(),
            status: WorkerStatus::Idle,
            metrics: RoleMetrics::default(),
        }
    }
}

/// Tracks live state and metrics for every role that has run.
#[derive(Default)]
pub struct RunMonitor {
    states: RwLock<HashMap<String, RoleState>>,
}

impl RunMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a run of `role` as in progress.
    pub async fn start_run(&self, role: &str, run_id: AgentRunId) {
        let mut states = self.states.write().await;
        let state = states
            .entry(role.to_string())
            .or_insert_with(|| RoleState::new(role));
        state.current_runs.push(run_id);
        state.status = WorkerStatus::Working;
    }

    pub async fn record_call(&self, role: &str, call: &ToolCall) {
        let mut states = self.states.write().await;
        let state = states
            .entry(role.to_string())
            .or_insert_with(|| RoleState::new(role));
        state.metrics.tool_calls += 1;
        state.metrics.attempts += call.attempts;
    }

    /// Fold a terminal run into the role's counters.
    pub async fn finish_run(&self, run: &AgentRun) {
        let mut states = self.states.write().await;
        let state = states
            .entry(run.role.clone())
            .or_insert_with(|| RoleState::new(&run.role));
        state.current_runs.retain(|id| *id != run.id);
        state.metrics.runs += 1;
        match run.status {
            AgentRunStatus::Succeeded => state.metrics.succeeded += 1,
            AgentRunStatus::Failed => state.metrics.failed += 1,
            AgentRunStatus::Skipped => state.metrics.skipped += 1,
            AgentRunStatus::Waiting | AgentRunStatus::Running => {}
        }
        if let Some(ms) = run.duration_ms() {
            state.metrics.duration_ms += ms.max(0) as u64;
        }
        state.status = if run.status == AgentRunStatus::Failed {
            WorkerStatus::Error
        } else if state.current_runs.is_empty() {
            WorkerStatus::Idle
        } else {
            WorkerStatus::Working
        };
    }

    /// All role states, sorted by role name.
    pub async fn snapshot(&self) -> Vec<RoleState> {
        let states = self.states.read().await;
        let mut out: Vec<RoleState> = states.values().cloned().collect();
        out.sort_by(|a, b| a.role.cmp(&b.role));
        out
    }

    pub async fn get_state(&self, role: &str) -> Option<RoleState> {
        self.states.read().await.get(role).cloned()
    }

    pub async fn aggregate_metrics(&self) -> RoleMetrics {
        let states = self.states.read().await;
        let mut total = RoleMetrics::default();
        for state in states.values() {
            total.runs += state.metrics.runs;
            total.succeeded += state.metrics.succeeded;
            total.failed += state.metrics.failed;
            total.skipped += state.metrics.skipped;
            total.tool_calls += state.metrics.tool_calls;
            total.attempts += state.metrics.attempts;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    /// Current state as JSON, for dashboards.
    pub async fn to_json(&self) -> serde_json::Value {
        let roles = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "roles": roles,
            "aggregate": aggregate,
        })
    }
}
