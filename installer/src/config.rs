//! Installer configuration and the directory layout derived from it.
//!
//! Settings are resolved in order: built-in defaults, then a TOML file
//! (explicit path, else `<config dir>/plugin-installer/config.toml` when it
//! exists), then the `FOGLAMP_ROOT` and `FOGLAMP_DATA` environment
//! variables, then command-line overrides.

use crate::dirs::BaseDirs;
use crate::error::InstallerError;
use crate::fetch::{DEFAULT_CHUNK_SIZE, DEFAULT_DOWNLOAD_TIMEOUT};
use crate::host::{DEFAULT_DEPENDENCY_INSTALLER, DEFAULT_PACKAGE_MANAGER, InstallerCommands};
use crate::layout::PluginKind;
use crate::request::PluginType;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable overriding the install root.
pub const ROOT_ENV: &str = "FOGLAMP_ROOT";

/// Environment variable overriding the data directory.
pub const DATA_ENV: &str = "FOGLAMP_DATA";

/// Install root used when nothing else is configured.
pub const DEFAULT_ROOT_DIR: &str = "/usr/local/foglamp";

/// File name looked up in the per-user configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// File that could not be read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this tool.
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        /// File that could not be parsed.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        #[source]
        source: toml::de::Error,
    },

    /// A setting holds an unusable value.
    #[error("invalid setting {setting}: {reason}")]
    Invalid {
        /// Name of the offending setting.
        setting: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<ConfigError> for InstallerError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            reason: err.to_string(),
        }
    }
}

/// Resolved installer settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Install root containing the plugin trees.
    pub root_dir: Utf8PathBuf,
    /// Data directory; the staging root defaults to its `plugins`
    /// subdirectory.
    pub data_dir: Option<Utf8PathBuf>,
    /// Explicit staging root.
    pub staging_dir: Option<Utf8PathBuf>,
    /// Overall download time budget in seconds.
    pub download_timeout_secs: u64,
    /// Bytes copied per chunk while downloading.
    pub chunk_size: usize,
    /// Filesystem utility used for plugin tree mutations. When unset the
    /// installer mutates the tree itself.
    pub filesystem_utility: Option<Utf8PathBuf>,
    /// Argv prefix for native package installs.
    pub package_manager: Vec<String>,
    /// Argv prefix for dependency manifest installs.
    pub dependency_installer: Vec<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            root_dir: Utf8PathBuf::from(DEFAULT_ROOT_DIR),
            data_dir: None,
            staging_dir: None,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT.as_secs(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            filesystem_utility: None,
            package_manager: DEFAULT_PACKAGE_MANAGER.map(str::to_owned).to_vec(),
            dependency_installer: DEFAULT_DEPENDENCY_INSTALLER.map(str::to_owned).to_vec(),
        }
    }
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Replacement install root.
    pub root_dir: Option<Utf8PathBuf>,
    /// Replacement data directory.
    pub data_dir: Option<Utf8PathBuf>,
    /// Replacement staging root.
    pub staging_dir: Option<Utf8PathBuf>,
    /// Replacement filesystem utility.
    pub filesystem_utility: Option<Utf8PathBuf>,
    /// Replacement download time budget in seconds.
    pub download_timeout_secs: Option<u64>,
}

impl InstallerConfig {
    /// Parse settings from TOML text; omitted keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or names
    /// an unknown setting.
    ///
    /// # Examples
    ///
    /// ```
    /// use plugin_installer::config::InstallerConfig;
    ///
    /// let config = InstallerConfig::from_toml_str("root_dir = \"/opt/foglamp\"\n")?;
    /// assert_eq!(config.root_dir.as_str(), "/opt/foglamp");
    /// assert_eq!(config.download_timeout_secs, 120);
    /// # Ok::<(), plugin_installer::config::ConfigError>(())
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Utf8Path::new("<inline>"))
    }

    fn parse(text: &str, path: &Utf8Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Load the explicit file when given, else the per-user file when it
    /// exists, else the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be read or parsed.
    pub fn discover(
        explicit: Option<&Utf8Path>,
        dirs: &dyn BaseDirs,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!("loading configuration from {path}");
            return Self::load_file(path);
        }
        let candidate = dirs
            .installer_config_dir()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .and_then(|path| Utf8PathBuf::try_from(path).ok());
        match candidate {
            Some(path) if path.is_file() => {
                debug!("loading configuration from {path}");
                Self::load_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Apply `FOGLAMP_ROOT` and `FOGLAMP_DATA` from the process environment.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_env_lookup(|name| std::env::var(name).ok())
    }

    /// Apply environment overrides read through `lookup`. Empty values are
    /// ignored.
    #[must_use]
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());
        if let Some(root) = non_empty(ROOT_ENV) {
            self.root_dir = Utf8PathBuf::from(root);
        }
        if let Some(data) = non_empty(DATA_ENV) {
            self.data_dir = Some(Utf8PathBuf::from(data));
        }
        self
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(root) = overrides.root_dir {
            self.root_dir = root;
        }
        if overrides.data_dir.is_some() {
            self.data_dir = overrides.data_dir;
        }
        if overrides.staging_dir.is_some() {
            self.staging_dir = overrides.staging_dir;
        }
        if overrides.filesystem_utility.is_some() {
            self.filesystem_utility = overrides.filesystem_utility;
        }
        if let Some(seconds) = overrides.download_timeout_secs {
            self.download_timeout_secs = seconds;
        }
        self
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero timeout or chunk size, or
    /// an empty command prefix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download_timeout_secs == 0 {
            return Err(invalid("download_timeout_secs", "must be greater than zero"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be greater than zero"));
        }
        if self.package_manager.is_empty() {
            return Err(invalid("package_manager", "must name a program"));
        }
        if self.dependency_installer.is_empty() {
            return Err(invalid("dependency_installer", "must name a program"));
        }
        Ok(())
    }

    /// Download time budget as a [`Duration`].
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// External installer argv prefixes.
    #[must_use]
    pub fn installer_commands(&self) -> InstallerCommands {
        InstallerCommands {
            package_manager: self.package_manager.clone(),
            dependency_installer: self.dependency_installer.clone(),
        }
    }

    /// Directory layout implied by these settings.
    #[must_use]
    pub fn directory_layout(&self) -> DirectoryLayout {
        DirectoryLayout::new(
            &self.root_dir,
            self.data_dir.as_deref(),
            self.staging_dir.as_deref(),
        )
    }
}

fn invalid(setting: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        setting,
        reason: reason.to_owned(),
    }
}

/// Where plugins are staged and installed.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use plugin_installer::config::DirectoryLayout;
/// use plugin_installer::layout::PluginKind;
/// use plugin_installer::request::PluginType;
///
/// let dirs = DirectoryLayout::new(Utf8Path::new("/usr/local/foglamp"), None, None);
/// assert_eq!(dirs.staging_root().as_str(), "/usr/local/foglamp/data/plugins");
/// assert_eq!(
///     dirs.plugin_dir(PluginKind::Script, PluginType::South, "dht11").as_str(),
///     "/usr/local/foglamp/python/foglamp/plugins/south/dht11"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    staging_root: Utf8PathBuf,
    script_root: Utf8PathBuf,
    compiled_root: Utf8PathBuf,
}

impl DirectoryLayout {
    /// Derive the layout from the install root and optional directories.
    ///
    /// The staging root is `staging_dir` if given, else `<data_dir>/plugins`,
    /// else `<root_dir>/data/plugins`.
    #[must_use]
    pub fn new(
        root_dir: &Utf8Path,
        data_dir: Option<&Utf8Path>,
        staging_dir: Option<&Utf8Path>,
    ) -> Self {
        let staging_root = match (staging_dir, data_dir) {
            (Some(staging), _) => staging.to_owned(),
            (None, Some(data)) => data.join("plugins"),
            (None, None) => root_dir.join("data").join("plugins"),
        };
        Self {
            staging_root,
            script_root: root_dir.join("python").join("foglamp").join("plugins"),
            compiled_root: root_dir.join("plugins"),
        }
    }

    /// Directory under which each request gets its own staging area.
    #[must_use]
    pub fn staging_root(&self) -> &Utf8Path {
        &self.staging_root
    }

    /// Root of the plugin tree for `kind`.
    #[must_use]
    pub fn plugins_root(&self, kind: PluginKind) -> &Utf8Path {
        match kind {
            PluginKind::Script => &self.script_root,
            PluginKind::Compiled => &self.compiled_root,
        }
    }

    /// Directory holding every plugin of one kind and category.
    #[must_use]
    pub fn category_dir(&self, kind: PluginKind, plugin_type: PluginType) -> Utf8PathBuf {
        self.plugins_root(kind).join(plugin_type.as_str())
    }

    /// Installed location of a single plugin.
    #[must_use]
    pub fn plugin_dir(
        &self,
        kind: PluginKind,
        plugin_type: PluginType,
        name: &str,
    ) -> Utf8PathBuf {
        self.category_dir(kind, plugin_type).join(name)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
