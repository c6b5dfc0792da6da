use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// Operation class of a capability. Each class carries its own default
/// deadline in the invoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Query,
    Write,
    Debug,
    LongRunning,
}

impl OperationClass {
    /// Guess the class from an action verb when a capability does not declare one.
    pub fn infer(verb: &str) -> Self {
        match normalize_name(verb).as_str() {
            "query" | "get" | "list" | "search" | "read" | "find" | "fetch" | "lookup"
            | "discover" => OperationClass::Query,
            "debug" | "trace" | "inspect" | "diagnose" | "log" => OperationClass::Debug,
            "run" | "execute" | "deploy" | "import" | "export" | "migrate" | "generate"
            | "script" | "build" => OperationClass::LongRunning,
            _ => OperationClass::Write,
        }
    }
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationClass::Query => write!(f, "query"),
            OperationClass::Write => write!(f, "write"),
            OperationClass::Debug => write!(f, "debug"),
            OperationClass::LongRunning => write!(f, "long_running"),
        }
    }
}

/// Static description of one remote capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    /// Transport endpoint name; defaults to `name`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Operation class; inferred from the action verb when absent.
    #[serde(default)]
    pub class: Option<OperationClass>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub output_schema: serde_json::Value,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            endpoint: None,
            class: None,
            synonyms: Vec::new(),
            input_schema: serde_json::Value::Null,
            output_schema: serde_json::Value::Null,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_class(mut self, class: OperationClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(&self.name)
    }
}

/// Registry of every capability the router may resolve to.
///
/// Keeps three lookups: normalized name, normalized synonym, and a token
/// index over name, synonyms, and description for fuzzy matching.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, CapabilityDescriptor>,
    synonyms: HashMap<String, String>,
    index: HashMap<String, BTreeSet<String>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = CapabilityDescriptor>) -> Self {
        let mut registry = Self::new();
        for d in descriptors {
            registry.register(d);
        }
        registry
    }

    pub fn register(&mut self, descriptor: CapabilityDescriptor) {
        let key = normalize_name(&descriptor.name);
        if self.capabilities.contains_key(&key) {
            warn!(capability = %descriptor.name, "Replacing registered capability");
            self.unregister(&key);
        }

        for synonym in &descriptor.synonyms {
            let syn = normalize_name(synonym);
            if let Some(previous) = self.synonyms.insert(syn.clone(), key.clone()) {
                if previous != key {
                    warn!(synonym = %syn, previous = %previous, capability = %key, "Synonym reassigned");
                }
            }
        }

        let mut tokens = tokenize(&descriptor.name);
        tokens.extend(tokenize(&descriptor.description));
        for synonym in &descriptor.synonyms {
            tokens.extend(tokenize(synonym));
        }
        self.index.insert(key.clone(), tokens);

        info!(capability = %descriptor.name, endpoint = %descriptor.endpoint(), "Registered capability");
        self.capabilities.insert(key, descriptor);
    }

    fn unregister(&mut self, key: &str) {
        self.capabilities.remove(key);
        self.index.remove(key);
        self.synonyms.retain(|_, target| target != key);
    }

    /// Exact lookup by (normalized) name.
    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.capabilities.get(&normalize_name(name))
    }

    /// Lookup by (normalized) synonym.
    pub fn get_by_synonym(&self, synonym: &str) -> Option<&CapabilityDescriptor> {
        self.synonyms
            .get(&normalize_name(synonym))
            .and_then(|key| self.capabilities.get(key))
    }

    /// Best fuzzy match for `query_tokens`: the share of query tokens found in
    /// a capability's index, ties broken by name. Returns `None` below `min_score`.
    pub fn best_fuzzy_match(
        &self,
        query_tokens: &BTreeSet<String>,
        min_score: f64,
    ) -> Option<(&CapabilityDescriptor, f64)> {
        if query_tokens.is_empty() {
            return None;
        }
        let mut best: Option<(&String, f64)> = None;
        for (key, tokens) in &self.index {
            let hits = query_tokens.iter().filter(|t| tokens.contains(*t)).count();
            let score = hits as f64 / query_tokens.len() as f64;
            let better = match best {
                None => true,
                Some((best_key, best_score)) => {
                    score > best_score || (score == best_score && key < best_key)
                }
            };
            if better {
                best = Some((key, score));
            }
        }
        best.filter(|(_, score)| *score >= min_score)
            .and_then(|(key, score)| self.capabilities.get(key).map(|d| (d, score)))
    }

    /// All descriptors, sorted by name.
    pub fn list(&self) -> Vec<&CapabilityDescriptor> {
        let mut all: Vec<&CapabilityDescriptor> = self.capabilities.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Lower-case and fold `-`, `.`, and spaces into `_`.
pub(crate) fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == '.' || c.is_whitespace() { '_' } else { c })
        .collect()
}

const STOPWORDS: &[&str] = &["the", "and", "for", "with", "from", "into", "that", "this", "all"];

/// Lower-cased alphanumeric tokens of length ≥ 3, minus stopwords.
pub(crate) fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}
