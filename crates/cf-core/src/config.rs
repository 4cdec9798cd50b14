use crate::model::BUILTIN_CHAINS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime settings, loadable from a YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Chains that get their own flow graph, in output order
    pub entry_chains: Vec<String>,
    /// Treat a chain's default policy as an unconditional final rule
    pub policy_as_trailing_rule: bool,
    pub dot_binary: String,
    pub render_format: String,
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse settings YAML")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        Self::from_yaml(&content)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            entry_chains: BUILTIN_CHAINS.iter().map(|c| c.to_string()).collect(),
            policy_as_trailing_rule: true,
            dot_binary: "dot".to_string(),
            render_format: "svg".to_string(),
        }
    }
}
