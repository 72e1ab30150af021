//! Plugin system error types with clear, actionable messages.
//!
//! Every error names the plugin involved so a failed bootstrap can be traced
//! back to the module that caused it.

use thiserror::Error;

use super::LifecycleHook;

/// Dependency graph violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    /// A plugin lists a dependency that was never registered.
    #[error("plugin '{plugin}' depends on '{dependency}' which is not registered")]
    Missing { plugin: String, dependency: String },

    /// The dependency graph has a cycle through this plugin.
    #[error("circular dependency detected at plugin '{plugin}'")]
    Circular { plugin: String },

    /// An enabled plugin directly depends on the one being disabled.
    #[error("cannot disable '{plugin}': enabled plugin '{dependent}' depends on it")]
    DisableBlocked { plugin: String, dependent: String },
}

impl DependencyError {
    pub fn missing(plugin: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::Missing {
            plugin: plugin.into(),
            dependency: dependency.into(),
        }
    }

    pub fn circular(plugin: impl Into<String>) -> Self {
        Self::Circular {
            plugin: plugin.into(),
        }
    }

    pub fn disable_blocked(plugin: impl Into<String>, dependent: impl Into<String>) -> Self {
        Self::DisableBlocked {
            plugin: plugin.into(),
            dependent: dependent.into(),
        }
    }
}

/// A lifecycle hook failed. The plugin is left in the `Error` state.
#[derive(Debug, Error)]
#[error("plugin '{plugin}': {hook} hook failed: {source}")]
pub struct LifecycleError {
    pub plugin: String,
    pub hook: LifecycleHook,
    #[source]
    pub source: anyhow::Error,
}

/// Errors surfaced by the plugin manager.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin with this name is registered.
    #[error("plugin '{0}' is not registered")]
    NotRegistered(String),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// A plugin manifest could not be parsed or failed validation.
    #[error("invalid plugin manifest {path}: {details}")]
    InvalidManifest { path: String, details: String },
}

impl PluginError {
    pub fn not_registered(plugin: impl Into<String>) -> Self {
        Self::NotRegistered(plugin.into())
    }

    pub fn invalid_manifest(path: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidManifest {
            path: path.into(),
            details: details.into(),
        }
    }

    /// The dependency error, if this is one.
    pub fn as_dependency(&self) -> Option<&DependencyError> {
        match self {
            Self::Dependency(err) => Some(err),
            _ => None,
        }
    }

    /// The lifecycle error, if this is one.
    pub fn as_lifecycle(&self) -> Option<&LifecycleError> {
        match self {
            Self::Lifecycle(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_dependency_names_both_plugins() {
        let msg = DependencyError::missing("comments", "users").to_string();
        assert!(msg.contains("comments"));
        assert!(msg.contains("users"));
    }

    #[test]
    fn disable_blocked_names_the_dependent() {
        let err = PluginError::from(DependencyError::disable_blocked("users", "comments"));
        let msg = err.to_string();
        assert!(msg.contains("cannot disable 'users'"));
        assert!(msg.contains("comments"));
        assert!(err.as_dependency().is_some());
    }

    #[test]
    fn lifecycle_error_keeps_the_cause() {
        let err = LifecycleError {
            plugin: "mindmap".to_string(),
            hook: LifecycleHook::Install,
            source: anyhow::anyhow!("seed failed"),
        };
        let msg = err.to_string();
        assert!(msg.contains("mindmap"));
        assert!(msg.contains("install"));
        assert!(msg.contains("seed failed"));
    }
}
