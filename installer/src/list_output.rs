//! Output formatting for plugin listing.
//!
//! This module provides utilities to format installed plugin information for
//! human-readable or JSON output.

use serde::Serialize;

use crate::scanner::InstalledPlugins;

/// Format installed plugins for human-readable output.
///
/// # Examples
///
/// ```
/// use plugin_installer::list_output::format_human;
/// use plugin_installer::scanner::InstalledPlugins;
///
/// let plugins = InstalledPlugins::default();
/// let output = format_human(&plugins);
/// assert!(output.contains("No plugins installed"));
/// ```
#[must_use]
pub fn format_human(plugins: &InstalledPlugins) -> String {
    if plugins.is_empty() {
        return String::from(
            "No plugins installed.\n\nRun `plugin-installer install` to install a plugin.",
        );
    }

    let mut output = String::from("Installed plugins:\n");

    for ((kind, plugin_type), entries) in &plugins.by_category {
        output.push('\n');
        output.push_str(&format!("{plugin_type} ({kind}):\n"));
        for plugin in entries {
            output.push_str(&format!("  - {}  {}\n", plugin.name, plugin.path));
        }
    }

    output
}

/// Format installed plugins as JSON.
///
/// # Examples
///
/// ```
/// use plugin_installer::list_output::format_json;
/// use plugin_installer::scanner::InstalledPlugins;
///
/// let plugins = InstalledPlugins::default();
/// let json = format_json(&plugins);
/// assert!(json.contains("\"plugins\""));
/// ```
#[must_use]
pub fn format_json(plugins: &InstalledPlugins) -> String {
    let json_data = InstalledPluginsJson::from(plugins);
    serde_json::to_string_pretty(&json_data).unwrap_or_else(|_| "{}".to_owned())
}

/// JSON-serializable representation of installed plugins.
#[derive(Debug, Serialize)]
pub struct InstalledPluginsJson {
    /// Every installed plugin, ordered by kind, category and name.
    pub plugins: Vec<PluginEntry>,
}

impl From<&InstalledPlugins> for InstalledPluginsJson {
    fn from(plugins: &InstalledPlugins) -> Self {
        let plugins = plugins
            .by_category
            .iter()
            .flat_map(|((kind, plugin_type), entries)| {
                entries.iter().map(move |plugin| PluginEntry {
                    name: plugin.name.clone(),
                    kind: kind.as_str(),
                    category: plugin_type.as_str(),
                    path: plugin.path.to_string(),
                })
            })
            .collect();
        Self { plugins }
    }
}

/// JSON entry for one plugin.
#[derive(Debug, Serialize)]
pub struct PluginEntry {
    /// Plugin directory name.
    pub name: String,
    /// `"script"` or `"compiled"`.
    pub kind: &'static str,
    /// Category the plugin is installed under.
    #[serde(rename = "type")]
    pub category: &'static str,
    /// Installed location.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PluginKind;
    use crate::request::PluginType;
    use crate::scanner::InstalledPlugin;
    use camino::Utf8PathBuf;
    use std::collections::BTreeMap;

    fn sample_plugins() -> InstalledPlugins {
        let mut by_category = BTreeMap::new();
        by_category.insert(
            (PluginKind::Script, PluginType::NotificationRule),
            vec![InstalledPlugin {
                name: "threshold".to_owned(),
                path: Utf8PathBuf::from(
                    "/usr/local/foglamp/python/foglamp/plugins/notificationRule/threshold",
                ),
            }],
        );
        InstalledPlugins { by_category }
    }

    #[test]
    fn format_human_empty_shows_no_plugins() {
        let output = format_human(&InstalledPlugins::default());
        assert!(output.contains("No plugins installed"));
        assert!(output.contains("plugin-installer install"));
    }

    #[test]
    fn format_human_shows_category_and_plugin() {
        let output = format_human(&sample_plugins());

        assert!(output.contains("Installed plugins:"));
        assert!(output.contains("notificationRule (script):"));
        assert!(output.contains("threshold"));
    }

    #[test]
    fn format_json_empty_has_empty_plugins() {
        let json = format_json(&InstalledPlugins::default());

        assert!(json.contains("\"plugins\""));
        assert!(json.contains("[]"));
    }

    #[test]
    fn format_json_includes_all_fields() {
        let json = format_json(&sample_plugins());
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");

        let entry = &value["plugins"][0];
        assert_eq!(entry["name"], "threshold");
        assert_eq!(entry["kind"], "script");
        assert_eq!(entry["type"], "notificationRule");
        assert!(
            entry["path"]
                .as_str()
                .is_some_and(|path| path.ends_with("notificationRule/threshold"))
        );
    }
}
