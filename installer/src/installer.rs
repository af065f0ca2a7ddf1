//! Placement of classified plugins and native package installation.
//!
//! Archive installs replace the plugin's destination directory wholesale
//! and then run the dependency installer when the archive ships a
//! requirements manifest. Package installs hand the staged file to the OS
//! package manager. Both return the external command's [`CommandReport`];
//! deciding what a non-zero exit means is left to the caller.

use crate::config::DirectoryLayout;
use crate::error::Result;
use crate::exec::CommandReport;
use crate::fetch::StagedArtifact;
use crate::host::{HostOperations, remove_path};
use crate::layout::PluginLayout;
use crate::request::PluginType;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};

/// Name of the file capturing package manager output.
pub const CAPTURE_FILE_NAME: &str = "output.txt";

/// Install an extracted plugin into its category directory.
///
/// The destination is
/// `<plugins root for kind>/<plugin type>/<top-level name>`. An existing
/// destination is removed first; otherwise its parent is created. The
/// top-level directory is then copied from `staging_dir`.
///
/// # Errors
///
/// Returns an error if a host operation fails or the dependency installer
/// cannot be started.
pub fn install_archive(
    layout: &PluginLayout,
    staging_dir: &Utf8Path,
    plugin_type: PluginType,
    dirs: &DirectoryLayout,
    host: &dyn HostOperations,
) -> Result<CommandReport> {
    let name = layout.top_level_name.as_str();
    let destination = dirs.plugin_dir(layout.kind, plugin_type, name);
    place_plugin(&staging_dir.join(name), &destination, host)?;
    info!("installed {} plugin {name} to {destination}", layout.kind);

    let Some(manifest) = layout.requirements_file.as_deref() else {
        return Ok(CommandReport::default());
    };
    let manifest_path = staging_dir.join(manifest);
    debug!("installing dependencies listed in {manifest_path}");
    host.run_dependency_install(&manifest_path)
}

fn place_plugin(
    source: &Utf8Path,
    destination: &Utf8Path,
    host: &dyn HostOperations,
) -> Result<()> {
    if destination.is_dir() {
        debug!("replacing existing plugin at {destination}");
        host.remove(destination)?;
    } else if let Some(parent) = destination.parent() {
        host.create_dir(parent)?;
    }
    host.copy(source, destination)
}

/// Install a staged native package with the OS package manager.
///
/// Combined output is captured in [`CAPTURE_FILE_NAME`] inside
/// `staging_dir` and returned as the report message. The capture file is
/// removed afterwards whatever the outcome.
///
/// # Errors
///
/// Returns an error if the package manager cannot be started or its
/// captured output cannot be read.
pub fn install_package(
    artifact: &StagedArtifact,
    staging_dir: &Utf8Path,
    host: &dyn HostOperations,
) -> Result<CommandReport> {
    let capture = capture_path(staging_dir);
    let result = host.run_package_install(artifact.path(), &capture);
    if let Err(err) = remove_path(&capture) {
        warn!("could not remove {capture}: {err}");
    }
    let report = result?;
    debug!(
        "package manager exited with {} for {}",
        report.exit_code,
        artifact.file_name()
    );
    Ok(report)
}

/// Location of the package manager capture file.
#[must_use]
pub fn capture_path(staging_dir: &Utf8Path) -> Utf8PathBuf {
    staging_dir.join(CAPTURE_FILE_NAME)
}

#[cfg(test)]
#[path = "installer_tests.rs"]
mod tests;
