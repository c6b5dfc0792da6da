//! Objective orchestration for Hive.
//!
//! A submitted objective is classified by the [`TaskAnalyzer`], its agent
//! roles are layered into batches by the [`DependencyBatcher`], and the
//! [`Queen`] runs each batch, routing every agent action through the
//! capability router and recording progress in the coordination store.
//!
//! # Main types
//!
//! - [`Queen`] — Objective control loop: submit, wait, cancel, subscribe.
//! - [`TaskAnalyzer`] — Keyword classification with a learned-pattern cache.
//! - [`DependencyBatcher`] — Deterministic topological batching of roles.
//! - [`RoleCatalog`] — Role definitions, prerequisites, and action templates.
//! - [`RunMonitor`] — Per-role run metrics.

/// Objective classification.
pub mod analyzer;
/// Dependency-ordered batching of roles.
pub mod batcher;
/// Per-role run metrics.
pub mod monitor;
/// Per-objective submission options.
pub mod options;
/// The seam between an agent's reasoning step and its tool calls.
pub mod planner;
/// The objective control loop.
pub mod queen;
/// Role definitions and the built-in catalog.
pub mod roles;

pub use analyzer::{
    fingerprint, normalize, AnalysisRule, Complexity, RuleTable, TaskAnalysis, TaskAnalyzer,
    TaskType,
};
pub use batcher::{Batch, BatchPlan, DependencyBatcher, DependencyTable};
pub use monitor::{RoleMetrics, RoleState, RunMonitor, WorkerStatus};
pub use options::SubmitOptions;
pub use planner::{ActionPlanner, AgentContext, TemplatePlanner};
pub use queen::{ObjectiveReport, Queen};
pub use roles::{ActionTemplate, RoleCatalog, RoleDefinition};
