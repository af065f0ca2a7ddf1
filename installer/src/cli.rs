//! CLI argument definitions for the plugin installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::config::ConfigOverrides;
use crate::request::RawInstallRequest;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

/// Download, verify, and install FogLAMP plugins.
#[derive(Parser, Debug)]
#[command(name = "plugin-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Download, verify, and install FogLAMP plugins.\n\n",
    "A plugin is fetched from a URL, checked against an MD5 checksum, and then ",
    "either unpacked from a tar archive into the plugin tree or handed to the ",
    "OS package manager. Archives are classified as script or compiled plugins ",
    "and placed under the category given by --type.\n\n",
    "The result is printed as a JSON response on stdout.",
))]
#[command(after_help = concat!(
    "PLUGIN TYPES:\n",
    "  south, north, filter, notificationDelivery, notificationRule\n\n",
    "EXIT CODES:\n",
    "  0  installed\n",
    "  1  bad request, checksum mismatch, or installer failure\n",
    "  2  archive has no usable plugin structure\n",
    "  3  internal error\n\n",
    "EXAMPLES:\n",
    "  Install a south plugin archive:\n",
    "    $ plugin-installer install --format tar --type south \\\n",
    "        --checksum 9e1ad5d4d1a6b1e1c1ae1e36e8b9e0d5 \\\n",
    "        --url http://host/foglamp-south-dht11.tar\n\n",
    "  Install from a JSON request body on stdin:\n",
    "    $ echo '{\"format\": \"deb\", ...}' | plugin-installer install --request -\n\n",
    "  List installed plugins:\n",
    "    $ plugin-installer list\n",
))]
pub struct Cli {
    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Install a plugin archive or package.
    Install(InstallArgs),

    /// List installed plugins.
    List(ListArgs),
}

/// Options accepted before or after any subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file [default: per-user config.toml when present].
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// FogLAMP install root [env: FOGLAMP_ROOT].
    #[arg(long, global = true, value_name = "DIR")]
    pub root_dir: Option<Utf8PathBuf>,

    /// FogLAMP data directory [env: FOGLAMP_DATA].
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Arguments for the install command.
#[derive(Args, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Read the JSON request body from FILE, or stdin when FILE is `-`.
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["url", "format", "compressed", "plugin_type", "checksum"]
    )]
    pub request: Option<String>,

    /// Location of the archive or package.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// `tar` or `deb`.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// The tar archive is gzip-compressed.
    #[arg(long)]
    pub compressed: bool,

    /// Plugin category, required for tar archives.
    #[arg(long = "type", value_name = "TYPE")]
    pub plugin_type: Option<String>,

    /// Expected MD5 checksum of the download.
    #[arg(long, value_name = "MD5")]
    pub checksum: Option<String>,

    /// Directory holding per-request staging areas.
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<Utf8PathBuf>,

    /// Mutate the plugin tree through this command instead of in process.
    #[arg(long, value_name = "PATH")]
    pub filesystem_utility: Option<Utf8PathBuf>,

    /// Download time budget in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

/// Arguments for the list command.
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

impl InstallArgs {
    /// Build a request from the individual flags.
    ///
    /// Unset flags stay unset so that validation reports them exactly as it
    /// would for a JSON body.
    ///
    /// # Examples
    ///
    /// ```
    /// use plugin_installer::cli::InstallArgs;
    ///
    /// let args = InstallArgs {
    ///     url: Some("http://host/dht11.tar".to_owned()),
    ///     format: Some("tar".to_owned()),
    ///     ..InstallArgs::default()
    /// };
    /// let raw = args.raw_request();
    /// assert_eq!(raw.format.as_deref(), Some("tar"));
    /// assert!(raw.checksum.is_none());
    /// ```
    #[must_use]
    pub fn raw_request(&self) -> RawInstallRequest {
        RawInstallRequest {
            url: self.url.clone(),
            format: self.format.clone(),
            compressed: self.compressed.then_some(Value::Bool(true)),
            plugin_type: self.plugin_type.clone(),
            checksum: self.checksum.clone(),
        }
    }
}

impl Cli {
    /// Configuration overrides given on the command line.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        let install = match &self.command {
            Command::Install(args) => Some(args),
            Command::List(_) => None,
        };
        ConfigOverrides {
            root_dir: self.global.root_dir.clone(),
            data_dir: self.global.data_dir.clone(),
            staging_dir: install.and_then(|args| args.staging_dir.clone()),
            filesystem_utility: install.and_then(|args| args.filesystem_utility.clone()),
            download_timeout_secs: install.and_then(|args| args.timeout),
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
