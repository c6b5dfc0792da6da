use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Static role → prerequisite-roles table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyTable {
    prerequisites: BTreeMap<String, Vec<String>>,
}

impl DependencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: impl Into<String>, prerequisites: Vec<String>) {
        self.prerequisites.insert(role.into(), prerequisites);
    }

    /// Declared prerequisites of `role`; empty for roles the table does not know.
    pub fn prerequisites(&self, role: &str) -> &[String] {
        self.prerequisites
            .get(role)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl FromIterator<(String, Vec<String>)> for DependencyTable {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self {
            prerequisites: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[(&str, &[&str]); N]> for DependencyTable {
    fn from(entries: [(&str, &[&str]); N]) -> Self {
        entries
            .into_iter()
            .map(|(role, deps)| (role.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect()
    }
}

/// Roles eligible to start together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    /// Input order, for deterministic logging only.
    pub roles: Vec<String>,
    /// Emitted because nothing else could be scheduled; members may have
    /// unmet in-set prerequisites.
    #[serde(default)]
    pub fail_open: bool,
}

/// Ordered batches covering every input role exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub batches: Vec<Batch>,
    /// Whether the fail-open fallback was used.
    pub fail_open: bool,
}

impl BatchPlan {
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Role names per batch.
    pub fn role_layers(&self) -> Vec<Vec<String>> {
        self.batches.iter().map(|b| b.roles.clone()).collect()
    }

    pub fn batch_of(&self, role: &str) -> Option<usize> {
        self.batches
            .iter()
            .find(|b| b.roles.iter().any(|r| r == role))
            .map(|b| b.index)
    }
}

/// Deterministic topological layering of agent roles.
pub struct DependencyBatcher;

impl DependencyBatcher {
    /// Layer `roles` so that each batch only contains roles whose in-set
    /// prerequisites were scheduled in earlier batches.
    ///
    /// Prerequisites outside `roles` count as satisfied. When no remaining
    /// role is ready (a cycle, or a chain through a role that can never be
    /// scheduled), everything left is emitted as one final fail-open batch.
    pub fn batches(roles: &[String], table: &DependencyTable) -> BatchPlan {
        let mut seen = HashSet::new();
        let active: Vec<&String> = roles.iter().filter(|r| seen.insert(r.as_str())).collect();
        let active_set: HashSet<&str> = active.iter().map(|r| r.as_str()).collect();

        let mut scheduled: HashSet<&str> = HashSet::new();
        let mut remaining: Vec<&String> = active;
        let mut plan = BatchPlan::default();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&String>, Vec<&String>) =
                remaining.iter().partition(|role| {
                    table
                        .prerequisites(role)
                        .iter()
                        .filter(|p| active_set.contains(p.as_str()))
                        .all(|p| scheduled.contains(p.as_str()))
                });

            if ready.is_empty() {
                let roles: Vec<String> = blocked.iter().map(|r| r.to_string()).collect();
                warn!(
                    batch = plan.batches.len(),
                    roles = ?roles,
                    "Unsatisfiable dependencies, scheduling remaining roles fail-open"
                );
                plan.batches.push(Batch {
                    index: plan.batches.len(),
                    roles,
                    fail_open: true,
                });
                plan.fail_open = true;
                break;
            }

            for role in &ready {
                scheduled.insert(role.as_str());
            }
            let roles: Vec<String> = ready.iter().map(|r| r.to_string()).collect();
            debug!(batch = plan.batches.len(), roles = ?roles, "Batch scheduled");
            plan.batches.push(Batch {
                index: plan.batches.len(),
                roles,
                fail_open: false,
            });
            remaining = blocked;
        }

        plan
    }
}
