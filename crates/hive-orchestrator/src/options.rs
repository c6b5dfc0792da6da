use hive_core::Priority;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Per-objective knobs, read from the `[objective]` table or set per submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Upper bound on roles run for the objective, primary included.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Run a batch's agents concurrently; `false` runs them one by one.
    #[serde(default = "default_true")]
    pub allow_parallel: bool,
    /// When non-empty, replaces the catalog's per-role `critical` flags.
    #[serde(default)]
    pub critical_roles: BTreeSet<String>,
    /// Deadline applied to every tool call instead of the class default.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
    /// Recorded on the objective.
    #[serde(default)]
    pub priority: Priority,
}

fn default_max_agents() -> usize {
    8
}

fn default_true() -> bool {
    true
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            allow_parallel: true,
            critical_roles: BTreeSet::new(),
            default_timeout_ms: None,
            priority: Priority::Normal,
        }
    }
}

impl SubmitOptions {
    pub fn sequential(mut self) -> Self {
        self.allow_parallel = false;
        self
    }

    pub fn with_max_agents(mut self, max_agents: usize) -> Self {
        self.max_agents = max_agents;
        self
    }

    pub fn with_critical_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub(crate) fn deadline_override(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}
