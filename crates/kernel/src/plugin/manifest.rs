//! Plugin manifests on disk.
//!
//! Each plugin directory holds exactly one `{name}.info.toml` file with the
//! plugin metadata and, optionally, the collections it contributes:
//!
//! ```toml
//! name = "mindmap"
//! version = "1.0.0"
//! dependencies = ["users"]
//!
//! [[collections]]
//! name = "mindmaps"
//! timestamps = true
//!
//! [[collections.fields]]
//! name = "title"
//! type = "string"
//! required = true
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::context::PluginContext;
use super::error::PluginError;
use super::info::PluginInfo;
use super::Plugin;
use crate::db::CollectionDefinition;

#[derive(Deserialize)]
struct RawManifest {
    #[serde(flatten)]
    info: PluginInfo,

    #[serde(default)]
    collections: Vec<CollectionDefinition>,
}

/// A parsed `.info.toml` manifest.
#[derive(Debug, Clone)]
pub struct PluginManifest {
    pub info: PluginInfo,
    pub collections: Vec<CollectionDefinition>,
    /// Directory the manifest was found in.
    pub dir: PathBuf,
}

impl PluginManifest {
    /// Parse a manifest file.
    pub fn parse(path: &Path) -> Result<Self, PluginError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PluginError::invalid_manifest(path.display().to_string(), e.to_string())
        })?;
        Self::parse_str(&content, path)
    }

    /// Parse manifest TOML; `path` is used for the directory and error messages.
    pub fn parse_str(content: &str, path: &Path) -> Result<Self, PluginError> {
        let invalid = |details: String| {
            PluginError::invalid_manifest(path.display().to_string(), details)
        };

        let raw: RawManifest = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;
        raw.info.validate().map_err(|e| invalid(e.to_string()))?;

        for collection in &raw.collections {
            if collection.name.trim().is_empty() {
                return Err(invalid(format!(
                    "plugin '{}' declares a collection with an empty name",
                    raw.info.name
                )));
            }
        }

        Ok(Self {
            info: raw.info,
            collections: raw.collections,
            dir: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        })
    }
}

/// Scan `plugins_dir` for plugin manifests.
///
/// Subdirectories are visited in name order. A directory with no manifest,
/// more than one, or one that fails to parse is skipped with a warning.
pub fn discover_manifests(plugins_dir: &Path) -> Vec<PluginManifest> {
    let mut discovered = Vec::new();

    if !plugins_dir.exists() {
        info!(
            ?plugins_dir,
            "plugins directory does not exist, nothing to discover"
        );
        return discovered;
    }

    let entries = match std::fs::read_dir(plugins_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "failed to read plugins directory");
            return discovered;
        }
    };

    let mut dirs: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    dirs.sort_by_key(|e| e.file_name());

    for entry in dirs {
        let plugin_dir = entry.path();

        let info_files: Vec<PathBuf> = match std::fs::read_dir(&plugin_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(".info.toml"))
                })
                .collect(),
            Err(e) => {
                warn!(dir = %plugin_dir.display(), error = %e, "failed to read plugin dir");
                continue;
            }
        };

        let info_path = match info_files.as_slice() {
            [] => {
                warn!(dir = %plugin_dir.display(), "no .info.toml file found, skipping");
                continue;
            }
            [path] => path,
            _ => {
                warn!(dir = %plugin_dir.display(), "multiple .info.toml files found, skipping");
                continue;
            }
        };

        match PluginManifest::parse(info_path) {
            Ok(manifest) => {
                debug!(plugin = %manifest.info.name, path = %info_path.display(), "discovered plugin");
                discovered.push(manifest);
            }
            Err(e) => {
                warn!(path = %info_path.display(), error = %e, "failed to parse plugin manifest");
            }
        }
    }

    discovered
}

/// A plugin defined entirely by its manifest.
///
/// Its only behavior is registering the declared collections during
/// `before_load`.
pub struct ManifestPlugin {
    manifest: PluginManifest,
}

impl ManifestPlugin {
    pub fn new(manifest: PluginManifest) -> Self {
        Self { manifest }
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }
}

#[async_trait]
impl Plugin for ManifestPlugin {
    fn info(&self) -> &PluginInfo {
        &self.manifest.info
    }

    async fn before_load(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        for collection in &self.manifest.collections {
            ctx.db().collection(collection.clone())?;
        }
        debug!(
            plugin = %ctx.plugin(),
            collections = self.manifest.collections.len(),
            "manifest collections registered"
        );
        Ok(())
    }
}
