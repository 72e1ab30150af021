//! Tessera test utilities.
//!
//! Helpers for integration testing: an in-memory database, plugins that
//! record the hooks they run, collection fixtures and JSON assertions.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tessera_kernel::db::{CollectionDefinition, Database, MemoryStore};
use tessera_kernel::plugin::{LifecycleHook, Plugin, PluginContext, PluginInfo};

/// Database over a fresh in-memory store that creates tables on first use.
pub fn memory_database() -> Arc<Database> {
    memory_database_with_store().0
}

/// Like [`memory_database`], also returning the store for inspection.
pub fn memory_database_with_store() -> (Arc<Database>, MemoryStore) {
    let store = MemoryStore::new().with_auto_tables();
    let db = Arc::new(Database::new(Arc::new(store.clone())));
    (db, store)
}

/// Shared, ordered log of `hook:plugin` entries.
#[derive(Debug, Clone, Default)]
pub struct HookLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl HookLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, hook: LifecycleHook, plugin: &str) {
        self.entries.lock().push(format!("{hook}:{plugin}"));
    }

    /// All entries in the order they were recorded.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Plugin names that ran `hook`, in order.
    pub fn plugins_for(&self, hook: LifecycleHook) -> Vec<String> {
        let prefix = format!("{hook}:");
        self.entries
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Index of the first matching entry.
    pub fn position(&self, hook: LifecycleHook, plugin: &str) -> Option<usize> {
        let entry = format!("{hook}:{plugin}");
        self.entries.lock().iter().position(|e| *e == entry)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Create a plugin that records every hook into `log`.
pub fn recording_plugin(name: &str, log: &HookLog) -> RecordingPlugin {
    RecordingPlugin {
        info: PluginInfo::new(name, "1.0.0"),
        log: log.clone(),
        fail_on: None,
        collections: Vec::new(),
    }
}

/// A plugin builder for lifecycle tests.
pub struct RecordingPlugin {
    pub info: PluginInfo,
    log: HookLog,
    fail_on: Option<LifecycleHook>,
    collections: Vec<CollectionDefinition>,
}

impl RecordingPlugin {
    /// Add a dependency.
    pub fn depends_on(mut self, plugin: &str) -> Self {
        self.info = self.info.depends_on(plugin);
        self
    }

    /// Keep out of `enable_all`.
    pub fn disabled_by_default(mut self) -> Self {
        self.info = self.info.enabled_by_default(false);
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.info.version = version.to_string();
        self
    }

    /// Return an error from `hook` (after recording it).
    pub fn failing_on(mut self, hook: LifecycleHook) -> Self {
        self.fail_on = Some(hook);
        self
    }

    /// Register `collection` during `before_load`.
    pub fn with_collection(mut self, collection: CollectionDefinition) -> Self {
        self.collections.push(collection);
        self
    }

    fn run(&self, hook: LifecycleHook) -> anyhow::Result<()> {
        self.log.record(hook, &self.info.name);
        if self.fail_on == Some(hook) {
            anyhow::bail!("{} failed on purpose", self.info.name);
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn before_load(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        for collection in &self.collections {
            ctx.db().collection(collection.clone())?;
        }
        self.run(LifecycleHook::BeforeLoad)
    }

    async fn load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.run(LifecycleHook::Load)
    }

    async fn after_load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.run(LifecycleHook::AfterLoad)
    }

    async fn install(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.run(LifecycleHook::Install)
    }

    async fn after_enable(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.run(LifecycleHook::AfterEnable)
    }

    async fn after_disable(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.run(LifecycleHook::AfterDisable)
    }

    async fn remove(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.run(LifecycleHook::Remove)
    }
}

/// Collection fixtures.
pub mod collections {
    use tessera_kernel::db::{CollectionDefinition, FieldDefinition, FieldType};

    /// `posts`: title, status, views and an author relation.
    pub fn posts() -> CollectionDefinition {
        CollectionDefinition::new("posts")
            .field(FieldDefinition::new("title", FieldType::String).required())
            .field(FieldDefinition::new("status", FieldType::String).with_default("draft"))
            .field(FieldDefinition::new("views", FieldType::Integer))
            .field(FieldDefinition::relation(
                "author",
                FieldType::BelongsTo,
                "users",
            ))
            .timestamps()
    }

    /// `users`: name and email.
    pub fn users() -> CollectionDefinition {
        CollectionDefinition::new("users")
            .field(FieldDefinition::new("name", FieldType::String).required())
            .field(FieldDefinition::new("email", FieldType::String).unique())
    }
}

/// Assertion helpers for JSON records.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value lacks a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to NOT have key '{key}', got: {value}"
        );
    }

    /// Collect `field` from each record, in order.
    pub fn field_values(records: &[Value], field: &str) -> Vec<Value> {
        records
            .iter()
            .map(|r| r.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hook_log_records_in_order() {
        let log = HookLog::new();
        log.record(LifecycleHook::Load, "a");
        log.record(LifecycleHook::Install, "b");
        log.record(LifecycleHook::Load, "b");

        assert_eq!(log.entries(), vec!["load:a", "install:b", "load:b"]);
        assert_eq!(log.plugins_for(LifecycleHook::Load), vec!["a", "b"]);
        assert_eq!(log.position(LifecycleHook::Load, "b"), Some(2));

        log.clear();
        assert!(log.entries().is_empty());
    }

    #[test]
    fn recording_plugin_builder() {
        let log = HookLog::new();
        let plugin = recording_plugin("comments", &log)
            .depends_on("posts")
            .disabled_by_default()
            .with_version("2.0.0");

        assert_eq!(plugin.info().dependencies, vec!["posts"]);
        assert!(!plugin.info().enabled_by_default);
        assert_eq!(plugin.info().version, "2.0.0");
    }

    #[test]
    fn fixtures_are_valid() {
        let db = memory_database();
        db.collection(collections::users()).unwrap();
        db.collection(collections::posts()).unwrap();
        assert_eq!(db.get_status().collections, vec!["users", "posts"]);
    }

    #[test]
    fn assertions() {
        let record = json!({ "title": "a" });
        assert::has_key(&record, "title");
        assert::lacks_key(&record, "views");
        assert_eq!(
            assert::field_values(&[record, json!({})], "title"),
            vec![json!("a"), json!(null)]
        );
    }
}
