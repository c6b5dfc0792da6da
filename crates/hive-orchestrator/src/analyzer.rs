use hive_core::HiveResult;
use hive_memory::{CoordinationStore, CoordinationStoreExt, Namespace, PatternOutcome, QueryFilter};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Classification bucket for an objective, e.g. `widget_development`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The fallback type when no rule matches.
    pub fn generic() -> Self {
        Self::new("generic")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    fn raised(self) -> Self {
        match self {
            Complexity::Simple => Complexity::Medium,
            Complexity::Medium | Complexity::Complex => Complexity::Complex,
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Medium => write!(f, "medium"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

/// Result of classifying an objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub task_type: TaskType,
    pub primary_agent: String,
    pub supporting_agents: Vec<String>,
    pub complexity: Complexity,
    pub estimated_agent_count: usize,
}

impl TaskAnalysis {
    /// Primary agent first, then supporting agents, without duplicates.
    pub fn roles(&self) -> Vec<String> {
        let mut roles = vec![self.primary_agent.clone()];
        for r in &self.supporting_agents {
            if !roles.contains(r) {
                roles.push(r.clone());
            }
        }
        roles
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRule {
    pub task_type: TaskType,
    /// Lower-case words or phrases; any hit selects this rule.
    pub keywords: Vec<String>,
    pub primary_agent: String,
    #[serde(default)]
    pub supporting_agents: Vec<String>,
    pub base_complexity: Complexity,
}

impl AnalysisRule {
    pub fn new(
        task_type: &str,
        keywords: &[&str],
        primary_agent: &str,
        supporting_agents: &[&str],
        base_complexity: Complexity,
    ) -> Self {
        Self {
            task_type: TaskType::new(task_type),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            primary_agent: primary_agent.to_string(),
            supporting_agents: supporting_agents.iter().map(|s| s.to_string()).collect(),
            base_complexity,
        }
    }

    fn matches(&self, normalized: &str) -> bool {
        let words: Vec<&str> = normalized.split(|c: char| !c.is_alphanumeric()).collect();
        self.keywords.iter().any(|k| {
            if k.contains(' ') {
                normalized.contains(k.as_str())
            } else {
                words.contains(&k.as_str())
            }
        })
    }
}

/// Prioritized rules: the first matching rule wins, `fallback` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    pub rules: Vec<AnalysisRule>,
    pub fallback: AnalysisRule,
}

impl RuleTable {
    pub fn new(rules: Vec<AnalysisRule>, fallback: AnalysisRule) -> Self {
        Self { rules, fallback }
    }

    pub fn matching_rule(&self, normalized: &str) -> &AnalysisRule {
        self.rules
            .iter()
            .find(|r| r.matches(normalized))
            .unwrap_or(&self.fallback)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        use Complexity::{Complex, Medium, Simple};
        Self {
            rules: vec![
                AnalysisRule::new(
                    "widget_development",
                    &["widget", "portal", "service portal", "dashboard widget"],
                    "widget-creator",
                    &["architect", "css-specialist", "frontend-specialist", "tester"],
                    Medium,
                ),
                AnalysisRule::new(
                    "flow_development",
                    &["flow", "workflow", "approval", "automation"],
                    "flow-builder",
                    &["architect", "tester"],
                    Medium,
                ),
                AnalysisRule::new(
                    "integration_development",
                    &["integration", "rest", "api", "webhook", "import set"],
                    "integration-specialist",
                    &["architect", "script-writer", "tester"],
                    Complex,
                ),
                AnalysisRule::new(
                    "script_development",
                    &["script", "business rule", "script include", "client script"],
                    "script-writer",
                    &["architect", "tester"],
                    Medium,
                ),
                AnalysisRule::new(
                    "report_development",
                    &["report", "chart", "metrics", "kpi"],
                    "report-builder",
                    &["architect"],
                    Simple,
                ),
                AnalysisRule::new(
                    "documentation",
                    &["document", "documentation", "knowledge", "guide"],
                    "documenter",
                    &[],
                    Simple,
                ),
            ],
            fallback: AnalysisRule::new("generic", &[], "architect", &["script-writer", "tester"], Medium),
        }
    }
}

const COMPLEXITY_MARKERS: &[&str] = &[
    "integration",
    "multiple",
    "end-to-end",
    "end to end",
    "migrate",
    "migration",
    "enterprise",
    "real-time",
    "cross-system",
];

/// Lower-cased, whitespace-collapsed objective text.
pub fn normalize(objective: &str) -> String {
    objective
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 hex digest of the normalized objective.
pub fn fingerprint(objective: &str) -> String {
    hex::encode(Sha256::digest(normalize(objective).as_bytes()))
}

/// Classifies objectives by rule table, with a store-backed cache of
/// analyses that previously led to a completed objective.
///
/// Never fails: store errors are logged and rule evaluation proceeds.
pub struct TaskAnalyzer {
    rules: RuleTable,
    store: Arc<dyn CoordinationStore>,
}

impl TaskAnalyzer {
    pub fn new(rules: RuleTable, store: Arc<dyn CoordinationStore>) -> Self {
        Self { rules, store }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub async fn analyze(&self, objective: &str) -> TaskAnalysis {
        let fp = fingerprint(objective);
        match self.cached(&fp).await {
            Ok(Some(analysis)) => {
                info!(fingerprint = %fp, task_type = %analysis.task_type, "Task analysis cache hit");
                return analysis;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Task analysis cache unavailable, using rules"),
        }
        let analysis = self.classify(objective);
        debug!(
            task_type = %analysis.task_type,
            primary = %analysis.primary_agent,
            complexity = %analysis.complexity,
            "Objective classified"
        );
        analysis
    }

    /// Rule evaluation only, no cache.
    pub fn classify(&self, objective: &str) -> TaskAnalysis {
        let normalized = normalize(objective);
        let rule = self.rules.matching_rule(&normalized);

        let mut complexity = rule.base_complexity;
        let words = normalized.split(' ').filter(|w| !w.is_empty()).count();
        if words > 80 {
            complexity = Complexity::Complex;
        } else if words > 40 {
            complexity = complexity.max(Complexity::Medium);
        }
        if COMPLEXITY_MARKERS.iter().any(|m| normalized.contains(m)) {
            complexity = complexity.raised();
        }

        let mut analysis = TaskAnalysis {
            task_type: rule.task_type.clone(),
            primary_agent: rule.primary_agent.clone(),
            supporting_agents: rule
                .supporting_agents
                .iter()
                .filter(|s| **s != rule.primary_agent)
                .cloned()
                .collect(),
            complexity,
            estimated_agent_count: 0,
        };
        analysis.estimated_agent_count = analysis.roles().len();
        analysis
    }

    /// Remember `analysis` for `objective` under `patterns/success/{task_type}`.
    pub async fn remember_success(&self, objective: &str, analysis: &TaskAnalysis) -> HiveResult<()> {
        let fp = fingerprint(objective);
        self.store
            .put_json(
                &Namespace::pattern(PatternOutcome::Success, analysis.task_type.as_str()),
                &fp,
                analysis,
                None,
            )
            .await?;
        debug!(fingerprint = %fp, task_type = %analysis.task_type, "Remembered successful analysis");
        Ok(())
    }

    async fn cached(&self, fp: &str) -> HiveResult<Option<TaskAnalysis>> {
        let hits = self
            .store
            .query(
                &Namespace::patterns(PatternOutcome::Success),
                &QueryFilter::new().recursive().key_prefix(fp),
            )
            .await?;
        for entry in hits.iter().filter(|e| e.key == fp) {
            match entry.decode::<TaskAnalysis>() {
                Ok(analysis) => return Ok(Some(analysis)),
                Err(e) => warn!(namespace = %entry.namespace, error = %e, "Ignoring unreadable cached analysis"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hive_core::HiveError;
    use hive_memory::{InMemoryStore, MemoryEntry};
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn analyzer() -> (TaskAnalyzer, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (TaskAnalyzer::new(RuleTable::default(), store.clone()), store)
    }

    #[test]
    fn test_normalize_and_fingerprint() {
        assert_eq!(normalize("  Build   a\tWidget\n"), "build a widget");
        assert_eq!(fingerprint("Build a widget"), fingerprint("build   A WIDGET "));
        assert_ne!(fingerprint("build a widget"), fingerprint("build a flow"));
        assert_eq!(fingerprint("x").len(), 64);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let (a, _) = analyzer();
        // "widget" rule precedes "flow".
        let analysis = a.classify("Create a portal widget that starts an approval flow");
        assert_eq!(analysis.task_type.as_str(), "widget_development");
        assert_eq!(analysis.primary_agent, "widget-creator");
        assert_eq!(analysis.estimated_agent_count, 5);
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let (a, _) = analyzer();
        // "overflow" must not match "flow", "rapid" must not match "api".
        let analysis = a.classify("fix the overflow on a rapid page");
        assert_eq!(analysis.task_type, TaskType::generic());
        assert_eq!(analysis.primary_agent, "architect");
    }

    #[test]
    fn test_complexity_heuristic() {
        let (a, _) = analyzer();
        assert_eq!(a.classify("build a kpi report").complexity, Complexity::Simple);
        assert_eq!(
            a.classify("build a kpi report across multiple tables").complexity,
            Complexity::Medium
        );

        let long = format!("build a kpi report {}", "with details ".repeat(30));
        assert_eq!(a.classify(&long).complexity, Complexity::Medium);
        let longer = format!("build a kpi report {}", "with details ".repeat(45));
        assert_eq!(a.classify(&longer).complexity, Complexity::Complex);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_rules() {
        let (a, store) = analyzer();
        let custom = TaskAnalysis {
            task_type: TaskType::new("learned"),
            primary_agent: "documenter".into(),
            supporting_agents: vec![],
            complexity: Complexity::Simple,
            estimated_agent_count: 1,
        };
        a.remember_success("Build a Widget", &custom).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);

        assert_eq!(a.analyze("build   a widget").await, custom);
        assert_eq!(a.analyze("build a widget").await, a.analyze("BUILD A WIDGET").await);
        assert_eq!(
            a.analyze("build a different widget").await.task_type.as_str(),
            "widget_development"
        );
    }

    struct BrokenStore;

    #[async_trait]
    impl CoordinationStore for BrokenStore {
        async fn store_tagged(
            &self,
            _: &Namespace,
            _: &str,
            _: serde_json::Value,
            _: Option<Duration>,
            _: BTreeSet<String>,
        ) -> HiveResult<()> {
            Err(HiveError::Store("disk gone".into()))
        }
        async fn get(&self, _: &Namespace, _: &str) -> HiveResult<Option<MemoryEntry>> {
            Err(HiveError::Store("disk gone".into()))
        }
        async fn query(&self, _: &Namespace, _: &QueryFilter) -> HiveResult<Vec<MemoryEntry>> {
            Err(HiveError::Store("disk gone".into()))
        }
        async fn delete(&self, _: &Namespace, _: &str) -> HiveResult<bool> {
            Err(HiveError::Store("disk gone".into()))
        }
        async fn purge_expired(&self) -> HiveResult<usize> {
            Err(HiveError::Store("disk gone".into()))
        }
        async fn len(&self) -> HiveResult<usize> {
            Err(HiveError::Store("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_never_blocks_analysis() {
        let a = TaskAnalyzer::new(RuleTable::default(), Arc::new(BrokenStore));
        let analysis = a.analyze("integrate with the hr rest api").await;
        assert_eq!(analysis.task_type.as_str(), "integration_development");
        assert!(a.remember_success("x", &analysis).await.is_err());
    }
}
