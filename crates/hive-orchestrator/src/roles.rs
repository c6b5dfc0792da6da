use crate::batcher::DependencyTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// One step of a role's default work, expanded into an
/// [`AgentAction`](hive_core::AgentAction) by the template planner.
///
/// `verb`, `target`, and every string inside `parameters` may reference
/// `{objective}`, `{role}`, and `{task_type}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub verb: String,
    pub target: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ActionTemplate {
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

/// Static configuration for an agent role.
///
/// `critical` has no default: every role must say whether its failure
/// fails the objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    /// Capability tags this role is expected to exercise.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub critical: bool,
    #[serde(default)]
    pub actions: Vec<ActionTemplate>,
}

impl RoleDefinition {
    pub fn new(name: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            depends_on: Vec::new(),
            critical,
            actions: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_capabilities<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_action(mut self, action: ActionTemplate) -> Self {
        self.actions.push(action);
        self
    }
}

/// Read-only table of role definitions keyed by name.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: BTreeMap<String, RoleDefinition>,
}

impl RoleCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_roles(roles: impl IntoIterator<Item = RoleDefinition>) -> Self {
        let mut catalog = Self::empty();
        for role in roles {
            catalog.insert(role);
        }
        catalog
    }

    /// Add or replace a role.
    pub fn insert(&mut self, role: RoleDefinition) {
        if self.roles.contains_key(&role.name) {
            info!(role = %role.name, "Overriding role definition");
        }
        self.roles.insert(role.name.clone(), role);
    }

    /// Apply configured overrides on top of this catalog.
    pub fn merge(mut self, overrides: impl IntoIterator<Item = RoleDefinition>) -> Self {
        for role in overrides {
            self.insert(role);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&RoleDefinition> {
        self.roles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Role → prerequisites, for the batcher.
    pub fn dependency_table(&self) -> DependencyTable {
        self.roles
            .values()
            .map(|r| (r.name.clone(), r.depends_on.clone()))
            .collect()
    }

    /// The built-in catalog: one primary role per task type plus the
    /// supporting specialists they draw on.
    pub fn builtin() -> Self {
        Self::from_roles(default_roles())
    }
}

fn default_roles() -> Vec<RoleDefinition> {
    vec![
        RoleDefinition::new("architect", true)
            .with_capabilities(["design", "query"])
            .with_action(
                ActionTemplate::new("query", "table_schema")
                    .with_parameters(serde_json::json!({"objective": "{objective}"})),
            )
            .with_action(
                ActionTemplate::new("design", "solution_architecture").with_parameters(
                    serde_json::json!({"objective": "{objective}", "task_type": "{task_type}"}),
                ),
            ),
        RoleDefinition::new("widget-creator", true)
            .depends_on(["architect"])
            .with_capabilities(["widget", "write"])
            .with_action(
                ActionTemplate::new("create", "widget")
                    .with_parameters(serde_json::json!({"name": "{objective}"})),
            ),
        RoleDefinition::new("css-specialist", false)
            .depends_on(["widget-creator"])
            .with_capabilities(["style"])
            .with_action(ActionTemplate::new("update", "widget_css")),
        RoleDefinition::new("frontend-specialist", false)
            .depends_on(["widget-creator"])
            .with_capabilities(["client_script"])
            .with_action(ActionTemplate::new("update", "widget_client_script")),
        RoleDefinition::new("script-writer", true)
            .depends_on(["architect"])
            .with_capabilities(["script", "write"])
            .with_action(
                ActionTemplate::new("create", "script_include")
                    .with_parameters(serde_json::json!({"purpose": "{objective}"})),
            ),
        RoleDefinition::new("flow-builder", true)
            .depends_on(["architect"])
            .with_capabilities(["flow", "write"])
            .with_action(
                ActionTemplate::new("create", "flow")
                    .with_parameters(serde_json::json!({"description": "{objective}"})),
            ),
        RoleDefinition::new("integration-specialist", true)
            .depends_on(["architect"])
            .with_capabilities(["integration", "write"])
            .with_action(ActionTemplate::new("create", "rest_message"))
            .with_action(ActionTemplate::new("test", "rest_message")),
        RoleDefinition::new("report-builder", true)
            .depends_on(["architect"])
            .with_capabilities(["report"])
            .with_action(
                ActionTemplate::new("generate", "report")
                    .with_parameters(serde_json::json!({"title": "{objective}"})),
            ),
        RoleDefinition::new("tester", false)
            .depends_on(["widget-creator", "script-writer", "flow-builder", "integration-specialist"])
            .with_capabilities(["debug"])
            .with_action(
                ActionTemplate::new("run", "test_suite")
                    .with_parameters(serde_json::json!({"scope": "{task_type}"})),
            ),
        RoleDefinition::new("documenter", false)
            .depends_on(["architect"])
            .with_capabilities(["docs"])
            .with_action(ActionTemplate::new("create", "knowledge_article")),
    ]
}
