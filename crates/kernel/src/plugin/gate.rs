//! Which plugins `enable_all` turns on.
//!
//! A plugin's `enabled_by_default` flag is the baseline; the operator's
//! `DISABLED_PLUGINS` list vetoes it. Explicit `enable(name)` calls bypass
//! both.

use super::info::PluginInfo;

/// True when `enable_all` should enable the plugin described by `info`.
pub fn auto_enables(info: &PluginInfo, disabled_plugins: &[String]) -> bool {
    info.enabled_by_default && !disabled_plugins.contains(&info.name)
}

/// Parse a comma-separated plugin list, dropping blanks.
pub fn parse_plugin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
