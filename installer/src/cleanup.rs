//! Best-effort removal of per-request staging artefacts.
//!
//! Every request stages its download and extracted files in a private
//! `install-XXXXXX` directory under the staging root. [`StagingArea`]
//! removes that directory when the request finishes, or when it is
//! dropped on an early return. Removal failures are logged and never
//! propagated; by the time cleanup runs the outcome is already decided.

use crate::error::{InstallerError, Result};
use crate::host::remove_path;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::fs;
use tempfile::TempDir;

/// Prefix of per-request staging directories.
pub const STAGING_PREFIX: &str = "install-";

/// A private staging directory for one install request.
#[derive(Debug)]
pub struct StagingArea {
    dir: Option<TempDir>,
    path: Utf8PathBuf,
}

impl StagingArea {
    /// Create a fresh staging directory under `root`, creating `root` first
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] if either directory cannot be
    /// created or the new path is not valid UTF-8.
    pub fn create(root: &Utf8Path) -> Result<Self> {
        let filesystem_error = |source: std::io::Error| InstallerError::Filesystem {
            path: root.to_owned(),
            source,
        };
        fs::create_dir_all(root).map_err(filesystem_error)?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)
            .map_err(filesystem_error)?;
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).map_err(|err| {
            filesystem_error(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                err,
            ))
        })?;
        debug!("staging request in {path}");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Location of the staging directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Remove the staging directory and everything in it.
    ///
    /// Returns `true` when nothing remains on disk.
    #[must_use = "a failed cleanup leaves files behind in the staging root"]
    pub fn cleanup(mut self) -> bool {
        self.remove()
    }

    fn remove(&mut self) -> bool {
        let Some(dir) = self.dir.take() else {
            return true;
        };
        match dir.close() {
            Ok(()) => {
                debug!("removed staging directory {}", self.path);
                true
            }
            Err(err) => {
                warn!("could not remove staging directory {}: {err}", self.path);
                false
            }
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Remove each path, logging failures instead of returning them.
///
/// Missing paths are ignored. Returns the number of paths that could not
/// be removed.
pub fn remove_all<P: AsRef<Utf8Path>>(paths: &[P]) -> usize {
    paths
        .iter()
        .map(AsRef::as_ref)
        .filter(|path| match remove_path(path) {
            Ok(()) => false,
            Err(err) => {
                warn!("could not remove {path}: {err}");
                true
            }
        })
        .count()
}
