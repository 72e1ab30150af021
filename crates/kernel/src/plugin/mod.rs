//! Plugin system for Tessera.
//!
//! This module handles:
//! - The [`Plugin`] trait and its seven lifecycle hooks
//! - Plugin metadata, in code or from `.info.toml` manifests
//! - Dependency resolution and the enable gate
//! - The [`PluginManager`] that drives phased lifecycle execution

pub mod cli;
mod context;
mod dependency;
mod error;
mod gate;
mod info;
mod manager;
mod manifest;
mod state;

use std::fmt;

use async_trait::async_trait;

pub use context::{PluginContext, RuntimeContext};
pub use dependency::{enable_sequence, enabled_dependent, resolve_load_order};
pub use error::{DependencyError, LifecycleError, PluginError};
pub use gate::{auto_enables, parse_plugin_list};
pub use info::PluginInfo;
pub use manager::{
    PluginEvent, PluginEventCallback, PluginEventKind, PluginManager, PluginManagerEvents,
    PluginSnapshot,
};
pub use manifest::{ManifestPlugin, PluginManifest, discover_manifests};
pub use state::PluginState;

/// The seven lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    BeforeLoad,
    Load,
    AfterLoad,
    Install,
    AfterEnable,
    AfterDisable,
    Remove,
}

impl LifecycleHook {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeLoad => "before_load",
            Self::Load => "load",
            Self::AfterLoad => "after_load",
            Self::Install => "install",
            Self::AfterEnable => "after_enable",
            Self::AfterDisable => "after_disable",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of functionality with metadata and lifecycle hooks.
///
/// Every hook defaults to a no-op. The manager sets the plugin's state; a
/// hook that returns an error leaves the plugin in [`PluginState::Error`].
///
/// ```ignore
/// struct MindmapPlugin { info: PluginInfo }
///
/// #[async_trait]
/// impl Plugin for MindmapPlugin {
///     fn info(&self) -> &PluginInfo { &self.info }
///
///     async fn before_load(&self, ctx: &PluginContext) -> anyhow::Result<()> {
///         ctx.db().collection(CollectionDefinition::new("mindmaps"))?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Name, version and dependencies.
    fn info(&self) -> &PluginInfo;

    /// Register collections. Runs for every plugin before any `load`.
    async fn before_load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Register handlers and event subscriptions.
    async fn load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Cross-plugin wiring once every plugin has loaded.
    async fn after_load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// One-time data seeding. The manager runs it at most once.
    async fn install(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_enable(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release runtime resources.
    async fn after_disable(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Irreversible cleanup before the plugin leaves the registry.
    async fn remove(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }
}
