//! Plugin lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a plugin is in its lifecycle.
///
/// `Registered → Loading → Loaded → Installed → Enabled | Disabled`, with
/// `Error` reachable from any transition whose hook fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Registered,
    Loading,
    Loaded,
    Installed,
    Enabled,
    Disabled,
    Error,
}

impl PluginState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Installed => "installed",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Error => "error",
        }
    }

    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
