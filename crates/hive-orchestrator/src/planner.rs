use crate::analyzer::TaskType;
use crate::roles::RoleDefinition;
use async_trait::async_trait;
use hive_core::{AgentAction, HiveResult, ObjectiveId};
use std::collections::BTreeMap;

/// Everything an agent's reasoning step sees when planning its actions.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub objective_id: ObjectiveId,
    pub objective: String,
    pub role: RoleDefinition,
    pub task_type: TaskType,
    /// Results already published by earlier roles, keyed by role name.
    pub prior_results: BTreeMap<String, serde_json::Value>,
}

/// Turns an agent context into the sequence of actions the role will invoke.
///
/// This is the seam for an external reasoning step; the queen only needs
/// the resulting actions.
#[async_trait]
pub trait ActionPlanner: Send + Sync {
    async fn plan(&self, ctx: &AgentContext) -> HiveResult<Vec<AgentAction>>;
}

/// Expands a role's configured action templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatePlanner;

#[async_trait]
impl ActionPlanner for TemplatePlanner {
    async fn plan(&self, ctx: &AgentContext) -> HiveResult<Vec<AgentAction>> {
        let vars = [
            ("{objective}", ctx.objective.as_str()),
            ("{role}", ctx.role.name.as_str()),
            ("{task_type}", ctx.task_type.as_str()),
        ];
        Ok(ctx
            .role
            .actions
            .iter()
            .map(|t| {
                AgentAction::new(substitute(&t.verb, &vars), substitute(&t.target, &vars))
                    .with_parameters(substitute_value(&t.parameters, &vars))
            })
            .collect())
    }
}

fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter()
        .fold(template.to_string(), |acc, (k, v)| acc.replace(k, v))
}

fn substitute_value(value: &serde_json::Value, vars: &[(&str, &str)]) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::String(s) => Value::String(substitute(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}
