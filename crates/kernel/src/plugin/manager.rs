//! Plugin manager.
//!
//! Registers plugins, orders them by dependency and drives the lifecycle:
//!
//! - `load()` runs three phases (`before_load`, `load`, `after_load`), each
//!   over every plugin in dependency order. A phase finishes for all plugins
//!   before the next one starts.
//! - `install`/`install_all` run the one-time `install` hook.
//! - `enable`/`enable_all`/`disable`/`remove` toggle plugins while keeping
//!   every enabled plugin's dependencies enabled.
//!
//! Hooks run one at a time. The first failure stops the operation and is
//! returned; work already done by earlier plugins is not undone.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::context::{PluginContext, RuntimeContext};
use super::dependency::{enable_sequence, enabled_dependent, resolve_load_order};
use super::error::{DependencyError, LifecycleError, PluginError};
use super::gate::auto_enables;
use super::info::PluginInfo;
use super::state::PluginState;
use super::{LifecycleHook, Plugin};

/// Callback observing manager-driven transitions.
pub type PluginEventCallback = Arc<dyn Fn(&PluginEvent) + Send + Sync>;

/// Kind of manager event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginEventKind {
    Registered,
    Loaded,
    Enabled,
    Disabled,
    Error,
}

/// A state transition reported to [`PluginManagerEvents`] callbacks.
#[derive(Debug, Clone)]
pub struct PluginEvent {
    pub kind: PluginEventKind,
    pub plugin: String,
    pub timestamp: DateTime<Utc>,
    /// Hook that failed, for `Error` events.
    pub hook: Option<LifecycleHook>,
    /// Failure message, for `Error` events.
    pub error: Option<String>,
}

/// Optional observers of manager transitions.
#[derive(Clone, Default)]
pub struct PluginManagerEvents {
    pub on_plugin_registered: Option<PluginEventCallback>,
    pub on_plugin_loaded: Option<PluginEventCallback>,
    pub on_plugin_enabled: Option<PluginEventCallback>,
    pub on_plugin_disabled: Option<PluginEventCallback>,
    pub on_plugin_error: Option<PluginEventCallback>,
}

impl PluginManagerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_registered(mut self, f: impl Fn(&PluginEvent) + Send + Sync + 'static) -> Self {
        self.on_plugin_registered = Some(Arc::new(f));
        self
    }

    pub fn on_loaded(mut self, f: impl Fn(&PluginEvent) + Send + Sync + 'static) -> Self {
        self.on_plugin_loaded = Some(Arc::new(f));
        self
    }

    pub fn on_enabled(mut self, f: impl Fn(&PluginEvent) + Send + Sync + 'static) -> Self {
        self.on_plugin_enabled = Some(Arc::new(f));
        self
    }

    pub fn on_disabled(mut self, f: impl Fn(&PluginEvent) + Send + Sync + 'static) -> Self {
        self.on_plugin_disabled = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&PluginEvent) + Send + Sync + 'static) -> Self {
        self.on_plugin_error = Some(Arc::new(f));
        self
    }

    fn callback(&self, kind: PluginEventKind) -> Option<&PluginEventCallback> {
        match kind {
            PluginEventKind::Registered => self.on_plugin_registered.as_ref(),
            PluginEventKind::Loaded => self.on_plugin_loaded.as_ref(),
            PluginEventKind::Enabled => self.on_plugin_enabled.as_ref(),
            PluginEventKind::Disabled => self.on_plugin_disabled.as_ref(),
            PluginEventKind::Error => self.on_plugin_error.as_ref(),
        }
    }
}

/// Serialisable view of one registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSnapshot {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    pub enabled_by_default: bool,
    pub state: PluginState,
}

struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    state: PluginState,
    context: PluginContext,
}

/// Registry and lifecycle driver for plugins.
pub struct PluginManager {
    context: RuntimeContext,
    events: PluginManagerEvents,
    disabled_plugins: Vec<String>,
    plugins: HashMap<String, PluginEntry>,
    /// Registration order.
    order: Vec<String>,
    installed: HashSet<String>,
}

impl PluginManager {
    pub fn new(context: RuntimeContext) -> Self {
        Self {
            context,
            events: PluginManagerEvents::default(),
            disabled_plugins: Vec::new(),
            plugins: HashMap::new(),
            order: Vec::new(),
            installed: HashSet::new(),
        }
    }

    pub fn with_events(mut self, events: PluginManagerEvents) -> Self {
        self.events = events;
        self
    }

    /// Plugins `enable_all` must skip even when enabled by default.
    pub fn with_disabled_plugins(mut self, disabled: Vec<String>) -> Self {
        self.disabled_plugins = disabled;
        self
    }

    /// Replace the runtime context and hand it to every registered plugin.
    pub fn set_context(&mut self, context: RuntimeContext) {
        for (name, entry) in &mut self.plugins {
            entry.context = context.for_plugin(name);
        }
        self.context = context;
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    /// Register a plugin. A duplicate name is skipped with a warning.
    pub fn register<P: Plugin>(&mut self, plugin: P) -> &mut Self {
        self.register_arc(Arc::new(plugin))
    }

    pub fn register_arc(&mut self, plugin: Arc<dyn Plugin>) -> &mut Self {
        let name = plugin.info().name.clone();
        if self.plugins.contains_key(&name) {
            warn!(plugin = %name, "plugin already registered, skipping");
            return self;
        }

        debug!(plugin = %name, version = %plugin.info().version, "plugin registered");
        let context = self.context.for_plugin(&name);
        self.plugins.insert(
            name.clone(),
            PluginEntry {
                plugin,
                state: PluginState::Registered,
                context,
            },
        );
        self.order.push(name.clone());
        self.notify(PluginEventKind::Registered, &name, None, None);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.get(name).map(|entry| &entry.plugin)
    }

    /// All plugins in registration order.
    pub fn all(&self) -> Vec<&Arc<dyn Plugin>> {
        self.order
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.plugins.get(name).map(|entry| entry.state)
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.contains(name)
    }

    /// Dependency-respecting order of every registered plugin.
    pub fn load_order(&self) -> Result<Vec<String>, DependencyError> {
        let infos: Vec<&PluginInfo> = self.infos().collect();
        resolve_load_order(&infos)
    }

    /// Run `before_load`, `load` and `after_load` for every plugin.
    pub async fn load(&mut self) -> Result<(), PluginError> {
        let order = self.load_order()?;
        info!(plugins = order.len(), "loading plugins");

        self.run_phase(&order, LifecycleHook::BeforeLoad).await?;
        self.run_phase(&order, LifecycleHook::Load).await?;
        self.run_phase(&order, LifecycleHook::AfterLoad).await?;

        info!(plugins = order.len(), "plugins loaded");
        Ok(())
    }

    async fn run_phase(&mut self, order: &[String], hook: LifecycleHook) -> Result<(), PluginError> {
        for name in order {
            if hook == LifecycleHook::BeforeLoad {
                self.set_state(name, PluginState::Loading);
            }

            self.run_hook(name, hook).await?;

            if hook == LifecycleHook::Load {
                self.set_state(name, PluginState::Loaded);
                self.notify(PluginEventKind::Loaded, name, None, None);
            }
        }

        debug!(phase = %hook, plugins = order.len(), "lifecycle phase complete");
        Ok(())
    }

    /// Run a plugin's `install` hook once.
    pub async fn install(&mut self, name: &str) -> Result<(), PluginError> {
        self.require(name)?;

        if self.installed.contains(name) {
            warn!(plugin = %name, "plugin already installed, skipping");
            return Ok(());
        }

        self.run_hook(name, LifecycleHook::Install).await?;
        self.installed.insert(name.to_string());
        if !matches!(
            self.state(name),
            Some(PluginState::Enabled | PluginState::Disabled)
        ) {
            self.set_state(name, PluginState::Installed);
        }

        info!(plugin = %name, "plugin installed");
        Ok(())
    }

    /// Install every not-yet-installed plugin in dependency order.
    pub async fn install_all(&mut self) -> Result<(), PluginError> {
        for name in self.load_order()? {
            if !self.installed.contains(&name) {
                self.install(&name).await?;
            }
        }
        Ok(())
    }

    /// Enable a plugin, enabling its dependencies first.
    pub async fn enable(&mut self, name: &str) -> Result<(), PluginError> {
        self.require(name)?;

        let sequence = enable_sequence(
            name,
            |n| self.plugins.get(n).map(|entry| entry.plugin.info()),
            |n| self.state(n) == Some(PluginState::Enabled),
        )?;

        for plugin in sequence {
            self.run_hook(&plugin, LifecycleHook::AfterEnable).await?;
            self.set_state(&plugin, PluginState::Enabled);
            info!(plugin = %plugin, "plugin enabled");
            self.notify(PluginEventKind::Enabled, &plugin, None, None);
        }
        Ok(())
    }

    /// Enable, in dependency order, every plugin that is enabled by default
    /// and not listed in the disabled set.
    pub async fn enable_all(&mut self) -> Result<(), PluginError> {
        for name in self.load_order()? {
            let Some((auto, enabled_by_default)) = self.plugins.get(&name).map(|entry| {
                let info = entry.plugin.info();
                (auto_enables(info, &self.disabled_plugins), info.enabled_by_default)
            }) else {
                continue;
            };

            if auto {
                self.enable(&name).await?;
            } else if enabled_by_default {
                info!(plugin = %name, "plugin listed in DISABLED_PLUGINS, not enabling");
            }
        }
        Ok(())
    }

    /// Disable a plugin. Refused while an enabled plugin depends on it
    /// directly; states are left unchanged in that case.
    pub async fn disable(&mut self, name: &str) -> Result<(), PluginError> {
        self.require(name)?;

        if self.state(name) == Some(PluginState::Disabled) {
            return Ok(());
        }

        let blocker = enabled_dependent(name, self.infos(), |n| {
            self.state(n) == Some(PluginState::Enabled)
        })
        .map(str::to_string);
        if let Some(dependent) = blocker {
            warn!(plugin = %name, dependent = %dependent, "disable refused");
            return Err(DependencyError::disable_blocked(name, dependent).into());
        }

        self.run_hook(name, LifecycleHook::AfterDisable).await?;
        self.set_state(name, PluginState::Disabled);
        info!(plugin = %name, "plugin disabled");
        self.notify(PluginEventKind::Disabled, name, None, None);
        Ok(())
    }

    /// Disable if enabled, run `remove`, then forget the plugin.
    pub async fn remove(&mut self, name: &str) -> Result<(), PluginError> {
        self.require(name)?;

        if self.state(name) == Some(PluginState::Enabled) {
            self.disable(name).await?;
        }

        self.run_hook(name, LifecycleHook::Remove).await?;
        self.plugins.remove(name);
        self.order.retain(|n| n != name);
        self.installed.remove(name);

        info!(plugin = %name, "plugin removed");
        Ok(())
    }

    /// Name to state, for diagnostics.
    pub fn get_status(&self) -> BTreeMap<String, PluginState> {
        self.plugins
            .iter()
            .map(|(name, entry)| (name.clone(), entry.state))
            .collect()
    }

    pub fn snapshot(&self, name: &str) -> Option<PluginSnapshot> {
        let entry = self.plugins.get(name)?;
        let info = entry.plugin.info();
        Some(PluginSnapshot {
            name: info.name.clone(),
            version: info.version.clone(),
            description: info.description.clone(),
            dependencies: info.dependencies.clone(),
            enabled_by_default: info.enabled_by_default,
            state: entry.state,
        })
    }

    /// Snapshots of all plugins in registration order.
    pub fn snapshots(&self) -> Vec<PluginSnapshot> {
        self.order
            .iter()
            .filter_map(|name| self.snapshot(name))
            .collect()
    }

    fn infos(&self) -> impl Iterator<Item = &PluginInfo> {
        self.order
            .iter()
            .filter_map(|name| self.plugins.get(name))
            .map(|entry| entry.plugin.info())
    }

    fn require(&self, name: &str) -> Result<(), PluginError> {
        if self.plugins.contains_key(name) {
            Ok(())
        } else {
            Err(PluginError::not_registered(name))
        }
    }

    fn set_state(&mut self, name: &str, state: PluginState) {
        if let Some(entry) = self.plugins.get_mut(name) {
            entry.state = state;
        }
    }

    async fn run_hook(&mut self, name: &str, hook: LifecycleHook) -> Result<(), PluginError> {
        let (plugin, ctx) = match self.plugins.get(name) {
            Some(entry) => (Arc::clone(&entry.plugin), entry.context.clone()),
            None => return Err(PluginError::not_registered(name)),
        };

        let span = info_span!("plugin_hook", plugin = %name, hook = %hook);
        let call = match hook {
            LifecycleHook::BeforeLoad => plugin.before_load(&ctx),
            LifecycleHook::Load => plugin.load(&ctx),
            LifecycleHook::AfterLoad => plugin.after_load(&ctx),
            LifecycleHook::Install => plugin.install(&ctx),
            LifecycleHook::AfterEnable => plugin.after_enable(&ctx),
            LifecycleHook::AfterDisable => plugin.after_disable(&ctx),
            LifecycleHook::Remove => plugin.remove(&ctx),
        };

        match call.instrument(span).await {
            Ok(()) => Ok(()),
            Err(source) => {
                error!(plugin = %name, hook = %hook, error = %source, "lifecycle hook failed");
                self.set_state(name, PluginState::Error);
                self.notify(
                    PluginEventKind::Error,
                    name,
                    Some(hook),
                    Some(source.to_string()),
                );
                Err(LifecycleError {
                    plugin: name.to_string(),
                    hook,
                    source,
                }
                .into())
            }
        }
    }

    fn notify(
        &self,
        kind: PluginEventKind,
        plugin: &str,
        hook: Option<LifecycleHook>,
        error: Option<String>,
    ) {
        if let Some(callback) = self.events.callback(kind) {
            callback(&PluginEvent {
                kind,
                plugin: plugin.to_string(),
                timestamp: Utc::now(),
                hook,
                error,
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::{Database, MemoryStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Stub {
        info: PluginInfo,
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<LifecycleHook>,
    }

    impl Stub {
        fn new(name: &str, deps: &[&str], log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                info: PluginInfo::new(name, "1.0.0").dependencies(deps.iter().copied()),
                log: Arc::clone(log),
                fail_on: None,
            }
        }

        fn record(&self, hook: LifecycleHook) -> anyhow::Result<()> {
            self.log.lock().push(format!("{hook}:{}", self.info.name));
            if self.fail_on == Some(hook) {
                anyhow::bail!("{hook} refused");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Plugin for Stub {
        fn info(&self) -> &PluginInfo {
            &self.info
        }

        async fn before_load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.record(LifecycleHook::BeforeLoad)
        }

        async fn load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.record(LifecycleHook::Load)
        }

        async fn install(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.record(LifecycleHook::Install)
        }

        async fn after_enable(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.record(LifecycleHook::AfterEnable)
        }
    }

    fn manager() -> PluginManager {
        let db = Arc::new(Database::new(Arc::new(MemoryStore::new())));
        PluginManager::new(RuntimeContext::new(db))
    }

    #[test]
    fn duplicate_registration_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = manager();
        mgr.register(Stub::new("a", &[], &log))
            .register(Stub::new("a", &["b"], &log));

        assert_eq!(mgr.len(), 1);
        assert!(mgr.get("a").unwrap().info().dependencies.is_empty());
        assert_eq!(mgr.state("a"), Some(PluginState::Registered));
    }

    #[tokio::test]
    async fn install_runs_once_and_keeps_enabled_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = manager();
        mgr.register(Stub::new("a", &[], &log));

        mgr.enable("a").await.unwrap();
        mgr.install("a").await.unwrap();
        mgr.install("a").await.unwrap();

        assert!(mgr.is_installed("a"));
        assert_eq!(mgr.state("a"), Some(PluginState::Enabled));
        assert_eq!(*log.lock(), vec!["after_enable:a", "install:a"]);
    }

    #[tokio::test]
    async fn failing_hook_sets_error_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stub = Stub::new("a", &[], &log);
        stub.fail_on = Some(LifecycleHook::Install);
        let mut mgr = manager();
        mgr.register(stub);

        let err = mgr.install("a").await.unwrap_err();

        let lifecycle = err.as_lifecycle().unwrap();
        assert_eq!(lifecycle.hook, LifecycleHook::Install);
        assert_eq!(mgr.state("a"), Some(PluginState::Error));
        assert!(!mgr.is_installed("a"));
    }

    #[tokio::test]
    async fn unknown_plugin_is_not_registered() {
        let mut mgr = manager();
        assert!(matches!(
            mgr.enable("ghost").await,
            Err(PluginError::NotRegistered(ref name)) if name == "ghost"
        ));
        assert!(matches!(
            mgr.remove("ghost").await,
            Err(PluginError::NotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn snapshots_follow_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = manager();
        mgr.register(Stub::new("b", &["a"], &log))
            .register(Stub::new("a", &[], &log));

        let names: Vec<String> = mgr.snapshots().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(mgr.load_order().unwrap(), vec!["a", "b"]);

        let json = serde_json::to_value(mgr.snapshot("b").unwrap()).unwrap();
        assert_eq!(json["enabledByDefault"], serde_json::json!(true));
        assert_eq!(json["state"], serde_json::json!("registered"));
    }
}
