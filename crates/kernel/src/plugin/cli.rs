//! CLI command implementations for plugin management.
//!
//! These commands run against an in-memory store; nothing is persisted
//! between invocations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::context::RuntimeContext;
use super::manager::PluginManager;
use super::manifest::{ManifestPlugin, discover_manifests};
use crate::config::Config;
use crate::db::{Database, MemoryStore};

/// Print the dependency-resolved load order of the discovered plugins.
pub fn cmd_plugin_order(plugins_dir: &Path) -> Result<()> {
    let manifests = discover_manifests(plugins_dir);
    if manifests.is_empty() {
        println!("No plugins found in {}.", plugins_dir.display());
        return Ok(());
    }

    let db = Arc::new(Database::new(Arc::new(MemoryStore::new())));
    let mut manager = PluginManager::new(RuntimeContext::new(db));
    for manifest in manifests {
        manager.register(ManifestPlugin::new(manifest));
    }

    let order = manager
        .load_order()
        .context("failed to resolve plugin load order")?;

    println!("{:<5} {:<20} {}", "#", "PLUGIN", "DEPENDS ON");
    println!("{}", "-".repeat(50));
    for (position, name) in order.iter().enumerate() {
        let deps = manager
            .get(name)
            .map(|p| p.info().dependencies.join(", "))
            .unwrap_or_default();
        println!("{:<5} {:<20} {}", position + 1, name, deps);
    }

    Ok(())
}

/// Boot every discovered plugin against an in-memory store and report the
/// resulting states and collections.
pub async fn cmd_boot(config: &Config) -> Result<()> {
    let store = Arc::new(MemoryStore::new().with_auto_tables());
    let db = Arc::new(Database::new(store).with_default_page_size(config.default_page_size));
    db.connect().await?;

    let settings = config.load_plugin_settings()?;
    let context = RuntimeContext::new(Arc::clone(&db)).with_settings(settings);
    let mut manager =
        PluginManager::new(context).with_disabled_plugins(config.disabled_plugins.clone());

    for manifest in discover_manifests(&config.plugins_dir) {
        manager.register(ManifestPlugin::new(manifest));
    }

    manager.load().await.context("plugin load failed")?;
    manager.install_all().await.context("plugin install failed")?;
    manager.enable_all().await.context("plugin enable failed")?;

    if manager.is_empty() {
        println!("No plugins found in {}.", config.plugins_dir.display());
    } else {
        println!(
            "{:<20} {:<12} {:<12} {:<13}",
            "PLUGIN", "VERSION", "STATE", "AUTO-ENABLE"
        );
        println!("{}", "-".repeat(57));
        for snapshot in manager.snapshots() {
            let auto_enable = if snapshot.enabled_by_default { "yes" } else { "no" };
            println!(
                "{:<20} {:<12} {:<12} {:<13}",
                snapshot.name,
                snapshot.version,
                snapshot.state.as_str(),
                auto_enable
            );
        }
    }

    let collections = db.get_collections();
    if !collections.is_empty() {
        println!();
        println!("{:<24} {:<8} {}", "COLLECTION", "FIELDS", "DESCRIPTION");
        println!("{}", "-".repeat(57));
        for collection in collections {
            println!(
                "{:<24} {:<8} {}",
                collection.name,
                collection.fields.len(),
                collection.description.as_deref().unwrap_or("")
            );
        }
    }

    db.disconnect().await?;
    Ok(())
}
