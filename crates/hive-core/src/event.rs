use crate::ObjectiveId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Started,
    AgentCompleted,
    AgentFailed,
    BatchCompleted,
    /// A role was started although a prerequisite never succeeded
    /// (fail-open batch).
    DependencyOverride,
    ObjectiveCompleted,
    ObjectiveFailed,
    ObjectiveCancelled,
}

/// Progress notification for external observers (CLI, dashboards).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveEvent {
    pub objective_id: ObjectiveId,
    /// `None` for objective-level events emitted outside any batch.
    pub batch_index: Option<usize>,
    pub event: EventKind,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl ObjectiveEvent {
    pub fn new(
        objective_id: ObjectiveId,
        batch_index: Option<usize>,
        event: EventKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            objective_id,
            batch_index,
            event,
            payload,
            at: Utc::now(),
        }
    }

    /// Whether this event ends the objective's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event,
            EventKind::ObjectiveCompleted | EventKind::ObjectiveFailed | EventKind::ObjectiveCancelled
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let ev = ObjectiveEvent::new(
            ObjectiveId::new(),
            Some(1),
            EventKind::BatchCompleted,
            serde_json::json!({"roles": ["widget"]}),
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "batchCompleted");
        assert_eq!(json["batchIndex"], 1);
        assert!(json["objectiveId"].is_string());
        assert!(!ev.is_terminal());
    }
}
