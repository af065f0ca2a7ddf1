//! Discovery of installed plugins.
//!
//! Walks both plugin roots and reports every directory found under a known
//! category. The layout scanned is:
//!
//! ```text
//! {plugins root for kind}/{category}/{plugin}/
//! ```

use std::collections::BTreeMap;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::DirectoryLayout;
use crate::layout::PluginKind;
use crate::request::PluginType;

/// A plugin directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    /// Plugin name, taken from its directory.
    pub name: String,
    /// Full path to the plugin directory.
    pub path: Utf8PathBuf,
}

/// Installed plugins grouped by kind and category.
#[derive(Debug, Clone, Default)]
pub struct InstalledPlugins {
    /// Map from kind and category to the plugins found there.
    pub by_category: BTreeMap<(PluginKind, PluginType), Vec<InstalledPlugin>>,
}

impl InstalledPlugins {
    /// Returns true if no plugins are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }

    /// Total number of plugins found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }
}

/// Scan both plugin roots for installed plugins.
///
/// Missing roots and categories are treated as empty. Hidden entries and
/// `__pycache__` are skipped.
///
/// # Errors
///
/// Returns an error if an existing directory cannot be read.
pub fn scan_installed(dirs: &DirectoryLayout) -> io::Result<InstalledPlugins> {
    let mut result = InstalledPlugins::default();

    for kind in PluginKind::ALL {
        for plugin_type in PluginType::ALL {
            let plugins = scan_category(&dirs.category_dir(kind, plugin_type))?;
            if !plugins.is_empty() {
                result.by_category.insert((kind, plugin_type), plugins);
            }
        }
    }

    Ok(result)
}

fn scan_category(category_dir: &Utf8Path) -> io::Result<Vec<InstalledPlugin>> {
    if !category_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut plugins = Vec::new();
    for entry in category_dir.read_dir_utf8()? {
        let entry = entry?;
        let name = entry.file_name();
        if !entry.path().is_dir() || is_ignored(name) {
            continue;
        }
        plugins.push(InstalledPlugin {
            name: name.to_owned(),
            path: entry.path().to_owned(),
        });
    }

    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(plugins)
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || name == "__pycache__"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::utf8_temp_dir;
    use std::fs;

    #[test]
    fn scan_missing_roots_returns_empty() {
        let dirs = DirectoryLayout::new(Utf8Path::new("/nonexistent/foglamp"), None, None);
        let result = scan_installed(&dirs).expect("scan should succeed");
        assert!(result.is_empty());
    }

    #[test]
    fn scan_groups_plugins_by_kind_and_category() {
        let (_temp, root) = utf8_temp_dir().expect("temp dir");
        let dirs = DirectoryLayout::new(&root, None, None);
        for (kind, plugin_type, name) in [
            (PluginKind::Script, PluginType::South, "dht11"),
            (PluginKind::Script, PluginType::South, "coap"),
            (PluginKind::Compiled, PluginType::North, "omf"),
        ] {
            fs::create_dir_all(dirs.plugin_dir(kind, plugin_type, name)).expect("plugin dir");
        }

        let result = scan_installed(&dirs).expect("scan should succeed");

        assert_eq!(result.len(), 3);
        let south = &result.by_category[&(PluginKind::Script, PluginType::South)];
        let names: Vec<_> = south.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["coap", "dht11"]);
        assert!(
            result
                .by_category
                .contains_key(&(PluginKind::Compiled, PluginType::North))
        );
    }

    #[test]
    fn scan_skips_files_and_caches() {
        let (_temp, root) = utf8_temp_dir().expect("temp dir");
        let dirs = DirectoryLayout::new(&root, None, None);
        let category = dirs.category_dir(PluginKind::Script, PluginType::Filter);
        fs::create_dir_all(category.join("__pycache__")).expect("cache dir");
        fs::create_dir_all(category.join(".hidden")).expect("hidden dir");
        fs::write(category.join("__init__.py"), "").expect("init file");

        let result = scan_installed(&dirs).expect("scan should succeed");

        assert!(result.is_empty());
    }
}
