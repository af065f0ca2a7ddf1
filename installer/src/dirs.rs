//! Directory resolution abstraction for platform-specific paths.

use std::path::PathBuf;

/// Name of the per-user configuration subdirectory.
const APP_DIR_NAME: &str = "plugin-installer";

/// Platform base directories consulted by the installer.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// Per-user configuration directory of this tool, if one exists on
    /// the platform.
    fn installer_config_dir(&self) -> Option<PathBuf>;
}

/// Base directories resolved through `directories-next`.
#[derive(Debug, Clone)]
pub struct SystemBaseDirs {
    inner: directories_next::BaseDirs,
}

impl SystemBaseDirs {
    /// Resolve the current user's base directories.
    ///
    /// Returns `None` when no home directory can be determined.
    #[must_use]
    pub fn new() -> Option<Self> {
        directories_next::BaseDirs::new().map(|inner| Self { inner })
    }
}

impl BaseDirs for SystemBaseDirs {
    fn installer_config_dir(&self) -> Option<PathBuf> {
        Some(self.inner.config_dir().join(APP_DIR_NAME))
    }
}

/// Base directories for hosts without a resolvable home directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBaseDirs;

impl BaseDirs for NoBaseDirs {
    fn installer_config_dir(&self) -> Option<PathBuf> {
        None
    }
}
