//! Plugin dependency resolution.
//!
//! Load order is a depth-first topological sort: each plugin is emitted
//! after all of its dependencies. A `visiting` set catches back-edges, so a
//! cycle is reported instead of recursing forever.

use std::collections::{HashMap, HashSet};

use super::error::DependencyError;
use super::info::PluginInfo;

/// Resolve plugin load order based on dependencies.
///
/// `plugins` is the registry in registration order; ties between
/// independent plugins keep that order.
///
/// # Errors
/// Returns error if:
/// - A plugin declares a dependency that isn't registered
/// - There is a circular dependency
pub fn resolve_load_order(plugins: &[&PluginInfo]) -> Result<Vec<String>, DependencyError> {
    let index: HashMap<&str, &PluginInfo> =
        plugins.iter().map(|p| (p.name.as_str(), *p)).collect();

    let mut walk = Walk::default();
    for plugin in plugins {
        walk.visit(&plugin.name, &|name| index.get(name).copied())?;
    }

    Ok(walk.sorted)
}

/// Plugins to enable, in order, so that `target` ends up enabled.
///
/// Dependencies that are not yet enabled come first, depth-first, followed
/// by `target` itself. Already-enabled plugins are skipped along with
/// everything beneath them.
pub fn enable_sequence<'a>(
    target: &str,
    lookup: impl Fn(&str) -> Option<&'a PluginInfo>,
    is_enabled: impl Fn(&str) -> bool,
) -> Result<Vec<String>, DependencyError> {
    let mut sequence = Vec::new();
    let mut visiting = HashSet::new();
    collect_disabled(target, &lookup, &is_enabled, &mut visiting, &mut sequence)?;
    Ok(sequence)
}

fn collect_disabled<'a>(
    name: &str,
    lookup: &impl Fn(&str) -> Option<&'a PluginInfo>,
    is_enabled: &impl Fn(&str) -> bool,
    visiting: &mut HashSet<String>,
    sequence: &mut Vec<String>,
) -> Result<(), DependencyError> {
    if is_enabled(name) || sequence.iter().any(|s| s == name) {
        return Ok(());
    }
    if !visiting.insert(name.to_string()) {
        return Err(DependencyError::circular(name));
    }

    if let Some(info) = lookup(name) {
        for dep in &info.dependencies {
            if lookup(dep.as_str()).is_none() {
                return Err(DependencyError::missing(name, dep.as_str()));
            }
            collect_disabled(dep, lookup, is_enabled, visiting, sequence)?;
        }
    }

    visiting.remove(name);
    sequence.push(name.to_string());
    Ok(())
}

/// First enabled plugin (in `plugins` order) that lists `name` as a direct
/// dependency.
pub fn enabled_dependent<'a>(
    name: &str,
    plugins: impl IntoIterator<Item = &'a PluginInfo>,
    is_enabled: impl Fn(&str) -> bool,
) -> Option<&'a str> {
    plugins
        .into_iter()
        .find(|p| is_enabled(p.name.as_str()) && p.dependencies.iter().any(|d| d == name))
        .map(|p| p.name.as_str())
}

#[derive(Default)]
struct Walk {
    visited: HashSet<String>,
    visiting: HashSet<String>,
    sorted: Vec<String>,
}

impl Walk {
    fn visit<'a>(
        &mut self,
        name: &str,
        lookup: &dyn Fn(&str) -> Option<&'a PluginInfo>,
    ) -> Result<(), DependencyError> {
        if self.visited.contains(name) {
            return Ok(());
        }
        if self.visiting.contains(name) {
            return Err(DependencyError::circular(name));
        }
        let Some(info) = lookup(name) else {
            return Ok(());
        };

        self.visiting.insert(name.to_string());
        for dep in &info.dependencies {
            if lookup(dep.as_str()).is_none() {
                return Err(DependencyError::missing(name, dep.as_str()));
            }
            self.visit(dep, lookup)?;
        }
        self.visiting.remove(name);

        self.visited.insert(name.to_string());
        self.sorted.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn make_plugin(name: &str, deps: Vec<&str>) -> PluginInfo {
        PluginInfo::new(name, "1.0.0").dependencies(deps)
    }

    fn order(plugins: &[PluginInfo]) -> Result<Vec<String>, DependencyError> {
        let refs: Vec<&PluginInfo> = plugins.iter().collect();
        resolve_load_order(&refs)
    }

    #[test]
    fn no_dependencies_keeps_registration_order() {
        let plugins = vec![
            make_plugin("c", vec![]),
            make_plugin("a", vec![]),
            make_plugin("b", vec![]),
        ];

        assert_eq!(order(&plugins).unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn simple_chain() {
        let plugins = vec![
            make_plugin("c", vec!["b"]),
            make_plugin("b", vec!["a"]),
            make_plugin("a", vec![]),
        ];

        assert_eq!(order(&plugins).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_dependency() {
        // a depends on b and c, both depend on d
        let plugins = vec![
            make_plugin("a", vec!["b", "c"]),
            make_plugin("b", vec!["d"]),
            make_plugin("c", vec!["d"]),
            make_plugin("d", vec![]),
        ];

        assert_eq!(order(&plugins).unwrap(), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn missing_dependency() {
        let plugins = vec![make_plugin("a", vec!["missing"])];

        let err = order(&plugins).unwrap_err();
        assert_eq!(err, DependencyError::missing("a", "missing"));
    }

    #[test]
    fn circular_dependency_direct() {
        let plugins = vec![make_plugin("a", vec!["b"]), make_plugin("b", vec!["a"])];

        let err = order(&plugins).unwrap_err();
        assert_eq!(err, DependencyError::circular("a"));
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn circular_dependency_indirect() {
        let plugins = vec![
            make_plugin("a", vec!["b"]),
            make_plugin("b", vec!["c"]),
            make_plugin("c", vec!["a"]),
        ];

        assert!(matches!(
            order(&plugins),
            Err(DependencyError::Circular { .. })
        ));
    }

    #[test]
    fn enable_sequence_puts_dependencies_first() {
        let plugins = vec![
            make_plugin("a", vec![]),
            make_plugin("b", vec!["a"]),
            make_plugin("c", vec!["b"]),
        ];
        let lookup = |name: &str| plugins.iter().find(|p| p.name == name);

        let seq = enable_sequence("c", lookup, |_| false).unwrap();
        assert_eq!(seq, vec!["a", "b", "c"]);

        let seq = enable_sequence("c", lookup, |name| name == "a").unwrap();
        assert_eq!(seq, vec!["b", "c"]);

        assert!(enable_sequence("c", lookup, |_| true).unwrap().is_empty());
    }

    #[test]
    fn enable_sequence_reports_missing_dependency() {
        let plugins = vec![make_plugin("x", vec!["y"])];
        let lookup = |name: &str| plugins.iter().find(|p| p.name == name);

        let err = enable_sequence("x", lookup, |_| false).unwrap_err();
        assert_eq!(err, DependencyError::missing("x", "y"));
    }

    #[test]
    fn only_enabled_direct_dependents_block() {
        let plugins = vec![
            make_plugin("a", vec![]),
            make_plugin("b", vec!["a"]),
            make_plugin("c", vec!["b"]),
        ];

        assert_eq!(enabled_dependent("a", &plugins, |_| true), Some("b"));
        assert_eq!(enabled_dependent("a", &plugins, |name| name == "c"), None);
        assert_eq!(enabled_dependent("c", &plugins, |_| true), None);
    }
}
