//! `hive.toml` loading.
//!
//! Every table is optional; a missing file yields the defaults, so `hive plan`
//! works without any configuration.

use hive_core::{HiveError, HiveResult};
use hive_orchestrator::{RoleCatalog, RoleDefinition, SubmitOptions};
use hive_tools::{CapabilityDescriptor, CapabilityRegistry, HttpTransportConfig, InvokerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `transport.bearer_token`.
pub const TOKEN_ENV: &str = "HIVE_BEARER_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct HiveConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub invoker: InvokerConfig,
    #[serde(default)]
    pub transport: HttpTransportConfig,
    #[serde(default)]
    pub objective: SubmitOptions,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDescriptor>,
    /// Added to, or replacing entries of, the built-in role catalog.
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            invoker: InvokerConfig::default(),
            transport: HttpTransportConfig::default(),
            objective: SubmitOptions::default(),
            capabilities: Vec::new(),
            roles: Vec::new(),
        }
    }
}

impl HiveConfig {
    /// Path of the JSONL coordination store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("memory.jsonl")
    }

    pub fn registry(&self) -> CapabilityRegistry {
        CapabilityRegistry::from_descriptors(self.capabilities.iter().cloned())
    }

    pub fn catalog(&self) -> RoleCatalog {
        RoleCatalog::builtin().merge(self.roles.iter().cloned())
    }

    /// Apply environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                self.transport.bearer_token = Some(token);
            }
        }
        self
    }
}

/// Read and parse `path`. A missing file is not an error.
pub fn load_config(path: &Path) -> HiveResult<HiveConfig> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No config file, using defaults");
        return Ok(HiveConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        HiveError::Config(format!("Failed to read config '{}': {e}", path.display()))
    })?;
    parse_config(&content)
        .map_err(|e| HiveError::Config(format!("Failed to parse config '{}': {e}", path.display())))
}

pub fn parse_config(content: &str) -> Result<HiveConfig, toml::de::Error> {
    toml::from_str(content)
}
