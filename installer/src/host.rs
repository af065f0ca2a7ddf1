//! Privileged host operations used while installing a plugin.
//!
//! Every mutation of the plugin tree and every external installer
//! invocation goes through [`HostOperations`]. Two implementations exist:
//! [`InProcessHost`] mutates the filesystem directly, while
//! [`UtilityHost`] delegates mutations to a filesystem utility command
//! accepting the verbs `rm`, `mkdir` and `cp`. Both run the package manager
//! and the dependency installer through a [`CommandExecutor`].

use crate::error::{InstallerError, Result};
use crate::exec::{CommandExecutor, CommandReport, render_command};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fs;
use std::io;

/// Default argv prefix for installing a native package.
pub const DEFAULT_PACKAGE_MANAGER: [&str; 4] = ["sudo", "apt", "-y", "install"];

/// Default argv prefix for installing a dependency manifest.
pub const DEFAULT_DEPENDENCY_INSTALLER: [&str; 3] = ["pip3", "install", "-r"];

/// Capability interface over the host's filesystem and installers.
#[cfg_attr(test, mockall::automock)]
pub trait HostOperations {
    /// Remove a file or directory tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the path exists and cannot be removed.
    fn remove(&self, path: &Utf8Path) -> Result<()>;

    /// Create a directory and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    fn create_dir(&self, path: &Utf8Path) -> Result<()>;

    /// Copy `src` (file or directory tree) to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the copy fails.
    fn copy(&self, src: &Utf8Path, dst: &Utf8Path) -> Result<()>;

    /// Install a native package non-interactively, capturing combined
    /// output in `capture`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the package manager could not be run; a
    /// non-zero exit is reported through the returned [`CommandReport`].
    fn run_package_install(
        &self,
        package: &Utf8Path,
        capture: &Utf8Path,
    ) -> Result<CommandReport>;

    /// Install the dependencies listed in a manifest file.
    ///
    /// The report carries stderr on failure and stdout on success.
    ///
    /// # Errors
    ///
    /// Returns an error only if the dependency installer could not be run.
    fn run_dependency_install(&self, manifest: &Utf8Path) -> Result<CommandReport>;
}

/// Argv prefixes for the external installers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerCommands {
    /// Program and leading arguments for native package installs.
    pub package_manager: Vec<String>,
    /// Program and leading arguments for dependency manifest installs.
    pub dependency_installer: Vec<String>,
}

impl Default for InstallerCommands {
    fn default() -> Self {
        Self {
            package_manager: DEFAULT_PACKAGE_MANAGER.map(str::to_owned).to_vec(),
            dependency_installer: DEFAULT_DEPENDENCY_INSTALLER.map(str::to_owned).to_vec(),
        }
    }
}

impl InstallerCommands {
    fn package_install<E: CommandExecutor>(
        &self,
        executor: &E,
        package: &Utf8Path,
        capture: &Utf8Path,
    ) -> Result<CommandReport> {
        let (program, args) = split_argv(&self.package_manager, "package_manager", package)?;
        let status = executor.run_captured(program, &args, capture)?;
        let output = fs::read(capture).map_err(|source| InstallerError::Filesystem {
            path: capture.to_owned(),
            source,
        })?;
        Ok(CommandReport::new(status, &output))
    }

    fn dependency_install<E: CommandExecutor>(
        &self,
        executor: &E,
        manifest: &Utf8Path,
    ) -> Result<CommandReport> {
        let (program, args) =
            split_argv(&self.dependency_installer, "dependency_installer", manifest)?;
        let output = executor.run(program, &args)?;
        let stream = if output.status.success() {
            &output.stdout
        } else {
            &output.stderr
        };
        Ok(CommandReport::new(output.status, stream))
    }
}

/// Split a configured argv prefix into program and arguments, appending
/// `target` as the final argument.
fn split_argv<'a>(
    argv: &'a [String],
    setting: &str,
    target: &'a Utf8Path,
) -> Result<(&'a str, Vec<&'a str>)> {
    let Some((program, leading)) = argv.split_first() else {
        return Err(InstallerError::Config {
            reason: format!("{setting} must name a program"),
        });
    };
    let mut args: Vec<&str> = leading.iter().map(String::as_str).collect();
    args.push(target.as_str());
    Ok((program.as_str(), args))
}

/// Host that mutates the filesystem from within this process.
#[derive(Debug, Clone, Default)]
pub struct InProcessHost<E> {
    executor: E,
    commands: InstallerCommands,
}

impl<E: CommandExecutor> InProcessHost<E> {
    /// Create a host running installers through `executor`.
    #[must_use]
    pub fn new(executor: E, commands: InstallerCommands) -> Self {
        Self { executor, commands }
    }
}

impl<E: CommandExecutor> HostOperations for InProcessHost<E> {
    fn remove(&self, path: &Utf8Path) -> Result<()> {
        debug!("removing {path}");
        remove_path(path).map_err(|source| filesystem_error(path, source))
    }

    fn create_dir(&self, path: &Utf8Path) -> Result<()> {
        debug!("creating {path}");
        fs::create_dir_all(path).map_err(|source| filesystem_error(path, source))
    }

    fn copy(&self, src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
        debug!("copying {src} to {dst}");
        copy_tree(src, dst)
    }

    fn run_package_install(
        &self,
        package: &Utf8Path,
        capture: &Utf8Path,
    ) -> Result<CommandReport> {
        self.commands.package_install(&self.executor, package, capture)
    }

    fn run_dependency_install(&self, manifest: &Utf8Path) -> Result<CommandReport> {
        self.commands.dependency_install(&self.executor, manifest)
    }
}

/// Host that delegates filesystem mutations to an external utility.
///
/// The utility is invoked as `<utility> rm <path>`, `<utility> mkdir <path>`
/// and `<utility> cp <src> <dst>`. A non-zero exit is reported as
/// [`InstallerError::Filesystem`] on the targeted path.
#[derive(Debug, Clone)]
pub struct UtilityHost<E> {
    utility: Utf8PathBuf,
    executor: E,
    commands: InstallerCommands,
}

impl<E: CommandExecutor> UtilityHost<E> {
    /// Create a host that shells out to `utility` through `executor`.
    #[must_use]
    pub fn new(utility: Utf8PathBuf, executor: E, commands: InstallerCommands) -> Self {
        Self {
            utility,
            executor,
            commands,
        }
    }

    /// Run the utility against `target`; a non-zero exit is a filesystem
    /// failure on that path.
    fn invoke(&self, target: &Utf8Path, args: &[&str]) -> Result<()> {
        let output = self.executor.run(self.utility.as_str(), args)?;
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        let report = CommandReport::new(output.status, &combined);
        if report.success() {
            return Ok(());
        }
        Err(filesystem_error(
            target,
            io::Error::other(format!(
                "`{}` exited with status {}: {}",
                render_command(self.utility.as_str(), args),
                report.exit_code,
                report.message
            )),
        ))
    }
}

impl<E: CommandExecutor> HostOperations for UtilityHost<E> {
    fn remove(&self, path: &Utf8Path) -> Result<()> {
        self.invoke(path, &["rm", path.as_str()])
    }

    fn create_dir(&self, path: &Utf8Path) -> Result<()> {
        self.invoke(path, &["mkdir", path.as_str()])
    }

    fn copy(&self, src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
        self.invoke(dst, &["cp", src.as_str(), dst.as_str()])
    }

    fn run_package_install(
        &self,
        package: &Utf8Path,
        capture: &Utf8Path,
    ) -> Result<CommandReport> {
        self.commands.package_install(&self.executor, package, capture)
    }

    fn run_dependency_install(&self, manifest: &Utf8Path) -> Result<CommandReport> {
        self.commands.dependency_install(&self.executor, manifest)
    }
}

/// Remove a file, symlink or directory tree; a missing path is not an error.
pub(crate) fn remove_path(path: &Utf8Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn copy_tree(src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
    let metadata = fs::symlink_metadata(src).map_err(|source| filesystem_error(src, source))?;
    if metadata.file_type().is_symlink() {
        return copy_symlink(src, dst);
    }
    if metadata.is_file() {
        fs::copy(src, dst).map_err(|source| filesystem_error(dst, source))?;
        return Ok(());
    }

    fs::create_dir_all(dst).map_err(|source| filesystem_error(dst, source))?;
    for entry in src
        .read_dir_utf8()
        .map_err(|source| filesystem_error(src, source))?
    {
        let entry = entry.map_err(|source| filesystem_error(src, source))?;
        copy_tree(entry.path(), &dst.join(entry.file_name()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
    let target = fs::read_link(src).map_err(|source| filesystem_error(src, source))?;
    std::os::unix::fs::symlink(target, dst).map_err(|source| filesystem_error(dst, source))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
    fs::copy(src, dst).map_err(|source| filesystem_error(dst, source))?;
    Ok(())
}

fn filesystem_error(path: &Utf8Path, source: io::Error) -> InstallerError {
    InstallerError::Filesystem {
        path: path.to_owned(),
        source,
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
