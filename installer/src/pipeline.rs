//! Install request orchestration.
//!
//! Sequences validation, download, checksum verification, extraction,
//! classification, installation and cleanup for a single request, and folds
//! every failure into one caller-visible [`Verdict`]. Cleanup runs on every
//! path once the request has passed validation.

use crate::archive::{ArchiveExtractor, TarExtractor};
use crate::cleanup::{StagingArea, remove_all};
use crate::config::{DirectoryLayout, InstallerConfig};
use crate::error::{FailureClass, InstallerError, Result};
use crate::exec::SystemCommandExecutor;
use crate::fetch::{Fetcher, HttpFetcher, StagedArtifact};
use crate::host::{HostOperations, InProcessHost, UtilityHost};
use crate::installer::{install_archive, install_package};
use crate::layout::classify;
use crate::request::{InstallRequest, InstallTarget, RawInstallRequest};
use crate::verify::verify_checksum;
use camino::Utf8PathBuf;
use log::{debug, error, info, warn};
use std::fmt;

/// Steps of a single install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Checking the request fields.
    Validating,
    /// Retrieving the remote resource.
    Downloading,
    /// Comparing the staged file against the expected checksum.
    Verifying,
    /// Unpacking the archive into the staging area.
    Extracting,
    /// Deciding the plugin kind and name.
    Classifying,
    /// Placing the plugin and installing its dependencies.
    Installing,
    /// Running the OS package manager.
    InstallingPackage,
    /// Removing staged artefacts.
    CleaningUp,
    /// The request has finished.
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::Classifying => "classifying",
            Self::Installing => "installing",
            Self::InstallingPackage => "installing package",
            Self::CleaningUp => "cleaning up",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Final classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The plugin was installed.
    Success,
    /// The request, its content or an external installer was at fault.
    BadRequest,
    /// The archive lacks a usable plugin structure.
    NotFound,
    /// An infrastructure failure.
    Internal,
}

impl From<FailureClass> for Verdict {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::BadRequest => Self::BadRequest,
            FailureClass::NotFound => Self::NotFound,
            FailureClass::Internal => Self::Internal,
        }
    }
}

/// The only result handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Success or the failure category.
    pub verdict: Verdict,
    /// Success message, or the failure reason.
    pub message: String,
    /// Staged file name, set on success.
    pub installed_name: Option<String>,
}

impl InstallOutcome {
    fn installed(file_name: &str) -> Self {
        Self {
            verdict: Verdict::Success,
            message: format!("{file_name} is successfully downloaded and installed"),
            installed_name: Some(file_name.to_owned()),
        }
    }

    fn failed(err: &InstallerError) -> Self {
        Self {
            verdict: err.class().into(),
            message: err.caller_message(),
            installed_name: None,
        }
    }

    /// Returns `true` when the plugin was installed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.verdict == Verdict::Success
    }
}

/// Collaborators used to carry out a request.
pub struct InstallContext<'a> {
    /// Staging and destination directories.
    pub dirs: &'a DirectoryLayout,
    /// Downloads the requested resource.
    pub fetcher: &'a dyn Fetcher,
    /// Unpacks plugin archives.
    pub extractor: &'a dyn ArchiveExtractor,
    /// Mutates the plugin tree and runs external installers.
    pub host: &'a dyn HostOperations,
}

/// Build the host operations selected by `config`.
///
/// A configured filesystem utility selects [`UtilityHost`]; otherwise the
/// tree is mutated in process.
#[must_use]
pub fn system_host(config: &InstallerConfig) -> Box<dyn HostOperations> {
    let commands = config.installer_commands();
    match &config.filesystem_utility {
        Some(utility) => Box::new(UtilityHost::new(
            utility.clone(),
            SystemCommandExecutor,
            commands,
        )),
        None => Box::new(InProcessHost::new(SystemCommandExecutor, commands)),
    }
}

/// Handle a JSON install request using production collaborators.
///
/// # Examples
///
/// ```no_run
/// use plugin_installer::config::InstallerConfig;
/// use plugin_installer::pipeline::handle_request;
///
/// let body = r#"{"format": "tar", "type": "south", "checksum": "9e1ad5d4d1a6b1e1c1ae1e36e8b9e0d5",
///                "url": "http://host/foglamp-south-dht11.tar"}"#;
/// let outcome = handle_request(body, &InstallerConfig::default());
/// println!("{}", outcome.message);
/// ```
#[must_use]
pub fn handle_request(body: &str, config: &InstallerConfig) -> InstallOutcome {
    with_system_context(config, |context| handle_request_with(body, context))
}

/// Handle an already-decoded request using production collaborators.
#[must_use]
pub fn handle_raw_request(raw: &RawInstallRequest, config: &InstallerConfig) -> InstallOutcome {
    with_system_context(config, |context| handle_raw_request_with(raw, context))
}

fn with_system_context<R>(
    config: &InstallerConfig,
    f: impl FnOnce(&InstallContext<'_>) -> R,
) -> R {
    let dirs = config.directory_layout();
    let fetcher = HttpFetcher::new(config.download_timeout(), config.chunk_size);
    let host = system_host(config);
    let context = InstallContext {
        dirs: &dirs,
        fetcher: &fetcher,
        extractor: &TarExtractor,
        host: host.as_ref(),
    };
    f(&context)
}

/// Testable inner function with injected collaborators.
///
/// Parses and validates `body`; invalid requests fail before any network
/// or filesystem activity.
#[must_use]
pub fn handle_request_with(body: &str, context: &InstallContext<'_>) -> InstallOutcome {
    match RawInstallRequest::from_json(body) {
        Ok(raw) => handle_raw_request_with(&raw, context),
        Err(err) => reject(err.into()),
    }
}

/// Validate `raw` and carry it out with injected collaborators.
#[must_use]
pub fn handle_raw_request_with(
    raw: &RawInstallRequest,
    context: &InstallContext<'_>,
) -> InstallOutcome {
    match raw.validate() {
        Ok(request) => run_install(&request, context),
        Err(err) => reject(err.into()),
    }
}

fn reject(err: InstallerError) -> InstallOutcome {
    warn!("rejected install request: {err}");
    InstallOutcome::failed(&err)
}

/// Carry out a validated request.
///
/// Cleanup of the staging area runs whatever the outcome.
#[must_use]
pub fn run_install(request: &InstallRequest, context: &InstallContext<'_>) -> InstallOutcome {
    let mut run = RequestRun::new(request.url());
    run.enter(Stage::Downloading);
    let outcome = match StagingArea::create(context.dirs.staging_root()) {
        Ok(staging) => {
            let result = run.execute(request, context, &staging);
            run.cleanup(staging);
            result
        }
        Err(err) => {
            run.failed_stage = Some(run.stage);
            Err(err)
        }
    };
    run.enter(Stage::Done);

    match outcome {
        Ok(file_name) => {
            info!("{file_name} is successfully downloaded and installed");
            InstallOutcome::installed(&file_name)
        }
        Err(err) => {
            run.report_failure(&err);
            InstallOutcome::failed(&err)
        }
    }
}

/// Bookkeeping for one request: the current stage and every path staged.
struct RequestRun<'a> {
    url: &'a str,
    stage: Stage,
    failed_stage: Option<Stage>,
    staged: Vec<Utf8PathBuf>,
}

impl<'a> RequestRun<'a> {
    fn new(url: &'a str) -> Self {
        Self {
            url,
            stage: Stage::Validating,
            failed_stage: None,
            staged: Vec::new(),
        }
    }

    fn enter(&mut self, next: Stage) {
        debug!("{}: {} -> {next}", self.url, self.stage);
        self.stage = next;
    }

    fn execute(
        &mut self,
        request: &InstallRequest,
        context: &InstallContext<'_>,
        staging: &StagingArea,
    ) -> Result<String> {
        let result = self.install(request, context, staging);
        if result.is_err() {
            self.failed_stage = Some(self.stage);
        }
        result
    }

    fn install(
        &mut self,
        request: &InstallRequest,
        context: &InstallContext<'_>,
        staging: &StagingArea,
    ) -> Result<String> {
        let artifact = context.fetcher.fetch(request.url(), staging.path())?;
        self.staged.push(artifact.path().to_owned());

        self.enter(Stage::Verifying);
        check_digest(&artifact, request.checksum())?;

        let report = match *request.target() {
            InstallTarget::Archive {
                compressed,
                plugin_type,
            } => {
                self.enter(Stage::Extracting);
                let manifest = context
                    .extractor
                    .extract(artifact.path(), staging.path(), compressed)?;

                self.enter(Stage::Classifying);
                let layout = classify(&manifest)?;
                self.staged.extend(
                    std::iter::once(&layout.top_level_name)
                        .chain(&layout.other_roots)
                        .map(|root| staging.path().join(root)),
                );

                self.enter(Stage::Installing);
                install_archive(
                    &layout,
                    staging.path(),
                    plugin_type,
                    context.dirs,
                    context.host,
                )?
                .into_result("dependency installer")?
            }
            InstallTarget::NativePackage => {
                self.enter(Stage::InstallingPackage);
                install_package(&artifact, staging.path(), context.host)?
                    .into_result("package manager")?
            }
        };
        if !report.message.is_empty() {
            debug!("{}: {}", self.url, report.message);
        }
        Ok(artifact.file_name().to_owned())
    }

    fn cleanup(&mut self, staging: StagingArea) {
        self.enter(Stage::CleaningUp);
        let failures = remove_all(&self.staged);
        if !staging.cleanup() || failures > 0 {
            warn!("{}: staging artefacts were left behind", self.url);
        }
    }

    fn report_failure(&self, err: &InstallerError) {
        let stage = self.failed_stage.unwrap_or(self.stage);
        match err.class() {
            FailureClass::Internal => error!("{}: failed while {stage}: {err}", self.url),
            FailureClass::BadRequest | FailureClass::NotFound => {
                warn!("{}: failed while {stage}: {err}", self.url);
            }
        }
    }
}

/// Compare the staged file's digest with the caller's checksum.
fn check_digest(artifact: &StagedArtifact, expected: &str) -> Result<()> {
    let readable = |source: std::io::Error| InstallerError::Filesystem {
        path: artifact.path().to_owned(),
        source,
    };
    if verify_checksum(artifact, expected).map_err(readable)? {
        return Ok(());
    }
    let actual = artifact.digest().map_err(readable)?;
    Err(InstallerError::ChecksumMismatch {
        file_name: artifact.file_name().to_owned(),
        expected: expected.to_owned(),
        actual: actual.to_string(),
    })
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
