use hive_core::{AgentRunId, HiveError, HiveResult, ObjectiveId, SessionId};
use serde::{Deserialize, Serialize};

/// A hierarchical namespace such as `patterns/success/widget_development`.
///
/// Segments are non-empty and separated by `/`; there is no leading or
/// trailing separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

/// Outcome bucket of a learned pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternOutcome {
    Success,
    Failure,
}

impl std::fmt::Display for PatternOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternOutcome::Success => write!(f, "success"),
            PatternOutcome::Failure => write!(f, "failure"),
        }
    }
}

impl Namespace {
    /// Parse and validate a namespace path.
    pub fn parse(path: &str) -> HiveResult<Self> {
        if path.is_empty() {
            return Err(HiveError::Store("Empty namespace".to_string()));
        }
        for segment in path.split('/') {
            if segment.is_empty() {
                return Err(HiveError::Store(format!(
                    "Invalid namespace '{path}': empty segment"
                )));
            }
            if segment.trim() != segment {
                return Err(HiveError::Store(format!(
                    "Invalid namespace '{path}': segment '{segment}' has surrounding whitespace"
                )));
            }
        }
        Ok(Self(path.to_string()))
    }

    /// `objectives/{id}`
    pub fn objective(id: ObjectiveId) -> Self {
        Self(format!("objectives/{id}"))
    }

    /// `objectives/{id}/results` — per-role results consumed by later batches.
    pub fn objective_results(id: ObjectiveId) -> Self {
        Self(format!("objectives/{id}/results"))
    }

    /// `agents/{id}`
    pub fn agent(id: AgentRunId) -> Self {
        Self(format!("agents/{id}"))
    }

    /// `patterns/{outcome}/{task_type}`
    pub fn pattern(outcome: PatternOutcome, task_type: &str) -> Self {
        Self(format!("patterns/{outcome}/{}", sanitize_segment(task_type)))
    }

    /// `patterns/{outcome}` — parent of every task-type bucket.
    pub fn patterns(outcome: PatternOutcome) -> Self {
        Self(format!("patterns/{outcome}"))
    }

    /// `sessions/{id}`
    pub fn session(id: SessionId) -> Self {
        Self(format!("sessions/{id}"))
    }

    /// Append one segment.
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}/{}", self.0, sanitize_segment(segment)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Whether `other` is this namespace or one of its descendants.
    pub fn contains(&self, other: &Namespace) -> bool {
        other.0 == self.0
            || (other.0.len() > self.0.len()
                && other.0.starts_with(&self.0)
                && other.0.as_bytes()[self.0.len()] == b'/')
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = HiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl std::str::FromStr for Namespace {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Key for agent-local scratch state: `{agentId}::{logicalKey}`.
///
/// Bare logical keys are reserved for single-writer shared data such as
/// objective status.
pub fn scoped_key(agent_id: impl std::fmt::Display, logical_key: &str) -> String {
    format!("{agent_id}::{logical_key}")
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|c| if c == '/' || c.is_whitespace() { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let ns = Namespace::parse("patterns/success/widget_development").unwrap();
        assert_eq!(ns.segments().count(), 3);
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(Namespace::parse("").is_err());
        assert!(Namespace::parse("/objectives").is_err());
        assert!(Namespace::parse("objectives/").is_err());
        assert!(Namespace::parse("a//b").is_err());
    }

    #[test]
    fn test_contains() {
        let parent = Namespace::parse("patterns/success").unwrap();
        let child = Namespace::parse("patterns/success/widget").unwrap();
        let sibling = Namespace::parse("patterns/successful").unwrap();
        assert!(parent.contains(&parent));
        assert!(parent.contains(&child));
        assert!(!parent.contains(&sibling));
        assert!(!child.contains(&parent));
    }

    #[test]
    fn test_pattern_sanitizes_task_type() {
        let ns = Namespace::pattern(PatternOutcome::Failure, "portal page/v2");
        assert_eq!(ns.as_str(), "patterns/failure/portal_page_v2");
    }

    #[test]
    fn test_scoped_key() {
        assert_eq!(scoped_key("run-1", "draft"), "run-1::draft");
    }

    #[test]
    fn test_serde_validates() {
        let ns: Namespace = serde_json::from_str("\"sessions/abc\"").unwrap();
        assert_eq!(ns.as_str(), "sessions/abc");
        assert!(serde_json::from_str::<Namespace>("\"bad//ns\"").is_err());
    }
}
