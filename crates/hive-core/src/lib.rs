//! Core types and error definitions for the Hive coordinator.
//!
//! This crate provides the foundational types shared across all Hive crates:
//! error handling, identifiers, the objective/agent-run/tool-call data model,
//! and the progress events emitted while an objective runs.
//!
//! # Main types
//!
//! - [`HiveError`] — Unified error enum for all Hive subsystems.
//! - [`HiveResult`] — Convenience alias for `Result<T, HiveError>`.
//! - [`ErrorKind`] — Failure taxonomy attached to tool calls and agent runs.
//! - [`Objective`] — A submitted top-level unit of work.
//! - [`AgentRun`] — One execution of an agent role for one objective.
//! - [`ToolCall`] — One routed, timeout/retry-protected remote invocation.
//! - [`ObjectiveEvent`] — Progress notification for external observers.

/// Progress events emitted by the orchestrator.
pub mod event;
/// Objective and agent-run lifecycle types.
pub mod objective;
/// Agent actions, tool calls, and their outcomes.
pub mod tool;

pub use event::{EventKind, ObjectiveEvent};
pub use objective::{AgentRun, AgentRunStatus, Objective, ObjectiveStatus, Priority};
pub use tool::{AgentAction, FailureRecord, ToolCall, ToolOutcome};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Hive workspace.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum HiveError {
    /// The coordination store could not be read or written.
    #[error("Store error: {0}")]
    Store(String),

    /// A capability could not be registered or resolved.
    #[error("Capability error: {0}")]
    Capability(String),

    /// A transport-level failure outside the invoker's typed outcomes.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the orchestrator control loop.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`HiveError`].
pub type HiveResult<T> = Result<T, HiveError>;

/// Failure taxonomy recorded on tool calls and agent runs.
///
/// Unlike [`HiveError`], these are data: they are serialized into the
/// coordination store so later runs can learn from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The router could not resolve an action to an endpoint.
    CapabilityNotFound,
    /// The per-attempt deadline elapsed.
    Timeout,
    /// Network failure or 5xx-class response.
    TransientRemoteError,
    /// Auth, validation, or not-found response.
    PermanentRemoteError,
    /// The batcher fell back to fail-open scheduling.
    DependencyUnschedulable,
    /// The coordination store failed during an agent run.
    StoreUnavailable,
}

impl ErrorKind {
    /// Whether a call failing with this kind may be attempted again.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::TransientRemoteError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::CapabilityNotFound => "capability_not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TransientRemoteError => "transient_remote_error",
            ErrorKind::PermanentRemoteError => "permanent_remote_error",
            ErrorKind::DependencyUnschedulable => "dependency_unschedulable",
            ErrorKind::StoreUnavailable => "store_unavailable",
        };
        f.write_str(s)
    }
}

// --- Identifiers ---

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identifier of an [`Objective`].
    ObjectiveId
);
uuid_id!(
    /// Identifier of an [`AgentRun`].
    AgentRunId
);
uuid_id!(
    /// Identifier of a [`ToolCall`].
    ToolCallId
);
uuid_id!(
    /// Identifier of a coordinator session.
    SessionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::TransientRemoteError.is_retryable());
        assert!(!ErrorKind::PermanentRemoteError.is_retryable());
        assert!(!ErrorKind::CapabilityNotFound.is_retryable());
        assert!(!ErrorKind::StoreUnavailable.is_retryable());
    }

    #[test]
    fn test_id_display_roundtrip() {
        let id = ObjectiveId::new();
        let parsed: ObjectiveId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_error_kind_display_matches_serde() {
        let json = serde_json::to_string(&ErrorKind::PermanentRemoteError).unwrap();
        assert_eq!(json, format!("\"{}\"", ErrorKind::PermanentRemoteError));
    }
}
