//! Plugin metadata.
//!
//! Each plugin declares a name, version, dependency list and whether it is
//! enabled by default. Metadata is either built in code with the builder
//! methods or read from a `{name}.info.toml` manifest (see
//! [`super::manifest`]).

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Plugin metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin machine name, unique across the registry.
    pub name: String,

    /// Semantic version (e.g., "1.0.0").
    pub version: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Other plugins this one depends on (loaded and enabled first).
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Whether `enable_all` turns this plugin on.
    #[serde(default = "default_true", alias = "default_enabled")]
    pub enabled_by_default: bool,
}

impl PluginInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            dependencies: Vec::new(),
            enabled_by_default: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add one dependency.
    pub fn depends_on(mut self, plugin: impl Into<String>) -> Self {
        self.dependencies.push(plugin.into());
        self
    }

    /// Replace the dependency list.
    pub fn dependencies<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = plugins.into_iter().map(Into::into).collect();
        self
    }

    pub fn enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_by_default = enabled;
        self
    }

    /// Check the metadata is usable.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("plugin info has empty 'name' field");
        }

        if self.version.trim().is_empty() {
            bail!("plugin '{}' has empty 'version' field", self.name);
        }

        if self.dependencies.iter().any(|dep| dep == &self.name) {
            bail!("plugin '{}' lists itself as a dependency", self.name);
        }

        Ok(())
    }
}
