//! External command execution.
//!
//! The package manager, the dependency installer and the optional
//! filesystem utility are all reached through [`CommandExecutor`], so tests
//! can substitute a stub and observe every invocation.

use crate::error::{InstallerError, Result};
use camino::Utf8Path;
use log::debug;
use std::fs::File;
use std::process::{Command, ExitStatus, Output, Stdio};

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use plugin_installer::exec::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("pip3", &["--version"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), plugin_installer::error::InstallerError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output>;

    /// Runs a command with both output streams redirected into `capture`.
    ///
    /// The capture file is created or truncated before the command starts.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while creating the capture file or
    /// spawning the command.
    fn run_captured(&self, cmd: &str, args: &[&str], capture: &Utf8Path) -> Result<ExitStatus>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        debug!("running {}", render_command(cmd, args));
        Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(InstallerError::from)
    }

    fn run_captured(&self, cmd: &str, args: &[&str], capture: &Utf8Path) -> Result<ExitStatus> {
        debug!("running {} > {capture} 2>&1", render_command(cmd, args));
        let stdout = File::create(capture).map_err(|source| InstallerError::Filesystem {
            path: capture.to_owned(),
            source,
        })?;
        let stderr = stdout.try_clone()?;
        Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(InstallerError::from)
    }
}

/// Exit code and flattened output of a finished command.
///
/// The default report is a silent success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    /// Exit code, or `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Output with line breaks removed.
    pub message: String,
}

impl CommandReport {
    /// Build a report from a process status and raw output bytes.
    #[must_use]
    pub fn new(status: ExitStatus, output: &[u8]) -> Self {
        Self {
            exit_code: status.code().unwrap_or(-1),
            message: flatten_output(output),
        }
    }

    /// Returns `true` when the command exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a non-zero exit into [`InstallerError::ExternalCommand`].
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ExternalCommand`] carrying this report when
    /// the exit code is not zero.
    pub fn into_result(self, command: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(InstallerError::ExternalCommand {
            command: command.to_owned(),
            exit_code: self.exit_code,
            message: self.message,
        })
    }
}

/// Join the lines of command output into a single line.
///
/// Each line is kept as-is apart from its terminator; the result is trimmed.
///
/// # Examples
///
/// ```
/// use plugin_installer::exec::flatten_output;
///
/// let flat = flatten_output(b"Reading package lists...\nE: Unable to locate package\n");
/// assert_eq!(flat, "Reading package lists...E: Unable to locate package");
/// ```
#[must_use]
pub fn flatten_output(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let joined: String = text.lines().collect();
    joined.trim().to_owned()
}

/// Render a command line for log messages.
pub(crate) fn render_command(cmd: &str, args: &[&str]) -> String {
    std::iter::once(cmd)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
