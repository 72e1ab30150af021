//! Runtime context handed to plugins.
//!
//! One [`RuntimeContext`] is built at process start and given to the
//! [`PluginManager`](super::PluginManager). The manager derives a
//! [`PluginContext`] for each registered plugin before any of its hooks run;
//! hooks reach the database, the embedding application and their settings
//! only through it.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use crate::config::PluginSettings;
use crate::db::Database;

/// Shared services available to every plugin.
#[derive(Clone)]
pub struct RuntimeContext {
    db: Arc<Database>,
    app: Option<Arc<dyn Any + Send + Sync>>,
    settings: PluginSettings,
}

impl RuntimeContext {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            app: None,
            settings: PluginSettings::default(),
        }
    }

    /// Attach the embedding application, retrievable with [`PluginContext::app`].
    pub fn with_app<A: Any + Send + Sync>(mut self, app: Arc<A>) -> Self {
        self.app = Some(app);
        self
    }

    pub fn with_settings(mut self, settings: PluginSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// Context for one plugin.
    pub(crate) fn for_plugin(&self, plugin: &str) -> PluginContext {
        PluginContext {
            plugin: plugin.to_string(),
            db: Arc::clone(&self.db),
            app: self.app.clone(),
            config: self.settings.config(plugin),
        }
    }
}

/// What a plugin's hooks can see.
///
/// Hook bodies log with the `tracing` macros; every hook runs inside a
/// `plugin_hook` span carrying the plugin and hook names.
#[derive(Clone)]
pub struct PluginContext {
    plugin: String,
    db: Arc<Database>,
    app: Option<Arc<dyn Any + Send + Sync>>,
    config: Value,
}

impl PluginContext {
    /// Name of the plugin this context belongs to.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// The embedding application, if one was attached and has type `A`.
    pub fn app<A: Any + Send + Sync>(&self) -> Option<&A> {
        self.app.as_deref()?.downcast_ref::<A>()
    }

    /// This plugin's settings; an empty object when none were configured.
    pub fn config(&self) -> &Value {
        &self.config
    }
}
