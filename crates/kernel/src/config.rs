//! Configuration loaded from environment variables.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::db::DEFAULT_PAGE_SIZE;
use crate::plugin::parse_plugin_list;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the plugin manifest directory (default: ./plugins).
    pub plugins_dir: PathBuf,

    /// Optional TOML file with per-plugin settings.
    pub plugin_settings_path: Option<PathBuf>,

    /// Plugin names `enable_all` skips (from DISABLED_PLUGINS env var).
    pub disabled_plugins: Vec<String>,

    /// Page size for `find_and_count` when none is given (default: 20).
    pub default_page_size: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let plugins_dir = env::var("TESSERA_PLUGINS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./plugins"));

        let plugin_settings_path = env::var("TESSERA_PLUGIN_SETTINGS").ok().map(PathBuf::from);

        let disabled_plugins = env::var("DISABLED_PLUGINS")
            .map(|v| parse_plugin_list(&v))
            .unwrap_or_default();

        let default_page_size = env::var("TESSERA_DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .context("TESSERA_DEFAULT_PAGE_SIZE must be a valid u64")?;

        Ok(Self {
            plugins_dir,
            plugin_settings_path,
            disabled_plugins,
            default_page_size,
        })
    }

    /// Read the plugin settings file, or empty settings when none is set.
    pub fn load_plugin_settings(&self) -> Result<PluginSettings> {
        match &self.plugin_settings_path {
            Some(path) => PluginSettings::load(path),
            None => Ok(PluginSettings::default()),
        }
    }
}

/// Per-plugin settings, keyed by plugin name.
///
/// File layout:
///
/// ```toml
/// [plugins.mindmap]
/// max_nodes = 500
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginSettings {
    #[serde(default)]
    plugins: HashMap<String, toml::Table>,
}

impl PluginSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plugin settings: {}", path.display()))?;
        Self::parse_str(&content)
            .with_context(|| format!("failed to parse plugin settings at {}", path.display()))
    }

    pub fn parse_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Settings for one plugin as JSON; an empty object when absent.
    pub fn config(&self, plugin: &str) -> Value {
        self.plugins
            .get(plugin)
            .and_then(|table| serde_json::to_value(table).ok())
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }

    /// Names of plugins that have settings, sorted.
    pub fn plugin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_become_plugin_config() {
        let settings = PluginSettings::parse_str(
            r#"
[plugins.mindmap]
max_nodes = 500
layout = { direction = "horizontal" }

[plugins.audit]
"#,
        )
        .unwrap();

        assert_eq!(
            settings.config("mindmap"),
            json!({ "max_nodes": 500, "layout": { "direction": "horizontal" } })
        );
        assert_eq!(settings.config("audit"), json!({}));
        assert_eq!(settings.config("unknown"), json!({}));
        assert_eq!(settings.plugin_names(), vec!["audit", "mindmap"]);
    }

    #[test]
    fn malformed_settings_are_rejected() {
        assert!(PluginSettings::parse_str("[plugins.mindmap\n").is_err());
        assert!(PluginSettings::parse_str("plugins = 3").is_err());
    }

    #[test]
    fn settings_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.toml");
        std::fs::write(&path, "[plugins.comments]\nmoderate = true\n").unwrap();

        let settings = PluginSettings::load(&path).unwrap();
        assert_eq!(settings.config("comments"), json!({ "moderate": true }));

        let err = PluginSettings::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read plugin settings"));
    }
}
