//! Remote resource retrieval into the staging area.
//!
//! Provides a trait-based abstraction for downloading the plugin archive or
//! package named in an install request, enabling dependency injection for
//! testing. The HTTP implementation streams the response body to disk in
//! fixed-size chunks under an overall time budget.

use crate::error::FailureClass;
use crate::verify::{Md5Digest, compute_md5};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::cell::OnceCell;
use std::fs::File;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Overall time budget for a single download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Size of each chunk copied from the response body to disk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A downloaded file sitting in the staging area.
///
/// The content digest is computed on first request and cached.
#[derive(Debug)]
pub struct StagedArtifact {
    path: Utf8PathBuf,
    len: u64,
    digest: OnceCell<Md5Digest>,
}

impl StagedArtifact {
    /// Describe a staged file of `len` bytes at `path`.
    #[must_use]
    pub fn new(path: Utf8PathBuf, len: u64) -> Self {
        Self {
            path,
            len,
            digest: OnceCell::new(),
        }
    }

    /// Location of the staged file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// File name of the staged file, as derived from the request URL.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or_default()
    }

    /// Number of bytes written to disk.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` when the download produced no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the MD5 digest of the staged file, computing it once.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the staged file cannot be read.
    pub fn digest(&self) -> io::Result<&Md5Digest> {
        if let Some(digest) = self.digest.get() {
            return Ok(digest);
        }
        let computed = compute_md5(self.path.as_std_path())?;
        Ok(self.digest.get_or_init(|| computed))
    }
}

/// Trait for retrieving a remote resource into a staging directory.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher {
    /// Download `url` into `staging_dir`, naming the file after the final
    /// path segment of the URL.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Timeout`] when the time budget elapses,
    /// [`FetchError::Network`] or [`FetchError::Status`] for transport
    /// failures, and [`FetchError::Filesystem`] when the file cannot be
    /// written.
    fn fetch(&self, url: &str, staging_dir: &Utf8Path) -> Result<StagedArtifact, FetchError>;
}

/// Errors arising from fetching a remote resource.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The URL does not name a file that can be staged.
    #[error("invalid download URL {url}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why no file name could be derived.
        reason: String,
    },

    /// The transfer did not complete within the time budget.
    #[error("download of {url} timed out after {seconds} seconds")]
    Timeout {
        /// The URL being downloaded.
        url: String,
        /// The budget that elapsed.
        seconds: u64,
    },

    /// Connection or protocol failure.
    #[error("download failed for {url}: {reason}")]
    Network {
        /// The URL being downloaded.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("download of {url} failed with HTTP status {status}")]
    Status {
        /// The URL being downloaded.
        url: String,
        /// HTTP status code returned by the server.
        status: u16,
    },

    /// The staged file could not be created or written.
    #[error("could not write download to {path}: {source}")]
    Filesystem {
        /// Destination of the download.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    /// Classify the failure for the caller.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::InvalidUrl { .. } | Self::Status { .. } => FailureClass::BadRequest,
            Self::Timeout { .. } | Self::Network { .. } | Self::Filesystem { .. } => {
                FailureClass::Internal
            }
        }
    }
}

/// HTTP-based fetcher using `ureq`.
pub struct HttpFetcher {
    agent: ureq::Agent,
    timeout: Duration,
    chunk_size: usize,
}

impl HttpFetcher {
    /// Create a fetcher with the given overall timeout and chunk size.
    #[must_use]
    pub fn new(timeout: Duration, chunk_size: usize) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            timeout,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_CHUNK_SIZE)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, staging_dir: &Utf8Path) -> Result<StagedArtifact, FetchError> {
        let file_name = file_name_from_url(url)?;
        let dest = staging_dir.join(file_name);
        debug!("downloading {url} to {dest}");

        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e, self.timeout))?;
        let mut body = response.into_body();
        let mut reader = body.as_reader();

        let mut file = File::create(&dest).map_err(|source| FetchError::Filesystem {
            path: dest.clone(),
            source,
        })?;

        match copy_in_chunks(&mut reader, &mut file, self.chunk_size) {
            Ok(len) => {
                debug!("downloaded {len} bytes to {dest}");
                Ok(StagedArtifact::new(dest, len))
            }
            Err(err) => {
                drop(file);
                if let Err(remove_err) = std::fs::remove_file(&dest) {
                    debug!("could not remove partial download {dest}: {remove_err}");
                }
                Err(err.into_fetch_error(url, &dest, self.timeout))
            }
        }
    }
}

/// Derive the staged file name from the final path segment of `url`.
///
/// Query strings and fragments are ignored.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] if the URL has no path or its final
/// segment is empty or a relative directory reference.
///
/// # Examples
///
/// ```
/// use plugin_installer::fetch::file_name_from_url;
///
/// let name = file_name_from_url("http://host/dist/foglamp-south-dht11.tar.gz?x=1")?;
/// assert_eq!(name, "foglamp-south-dht11.tar.gz");
/// # Ok::<(), plugin_installer::fetch::FetchError>(())
/// ```
pub fn file_name_from_url(url: &str) -> Result<&str, FetchError> {
    let invalid = |reason: &str| FetchError::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };

    let without_suffix = url.split(['?', '#']).next().unwrap_or_default();
    let without_scheme = without_suffix
        .split_once("://")
        .map_or(without_suffix, |(_, rest)| rest);
    let Some((_, path)) = without_scheme.split_once('/') else {
        return Err(invalid("URL has no path"));
    };

    match path.rsplit('/').next() {
        None | Some("" | "." | "..") => Err(invalid("URL does not end in a file name")),
        Some(name) => Ok(name),
    }
}

/// Failure while streaming the body, split by side so it can be classified.
#[derive(Debug)]
enum StreamError {
    Read(io::Error),
    Write(io::Error),
}

impl StreamError {
    fn into_fetch_error(self, url: &str, dest: &Utf8Path, timeout: Duration) -> FetchError {
        match self {
            Self::Read(err) if is_timeout(&err) => FetchError::Timeout {
                url: url.to_owned(),
                seconds: timeout.as_secs(),
            },
            Self::Read(err) => FetchError::Network {
                url: url.to_owned(),
                reason: err.to_string(),
            },
            Self::Write(source) => FetchError::Filesystem {
                path: dest.to_owned(),
                source,
            },
        }
    }
}

/// Returns `true` when a body read failed because the time budget ran out.
///
/// ureq reports its own timeouts while streaming as an `io::Error` of kind
/// `Other` that wraps the `ureq::Error`.
fn is_timeout(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::TimedOut {
        return true;
    }
    match err.get_ref().and_then(|inner| inner.downcast_ref::<ureq::Error>()) {
        Some(ureq::Error::Timeout(_)) => true,
        Some(ureq::Error::Io(io_err)) => io_err.kind() == io::ErrorKind::TimedOut,
        _ => false,
    }
}

/// Copy `reader` into `writer` `chunk_size` bytes at a time.
fn copy_in_chunks(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    chunk_size: usize,
) -> Result<u64, StreamError> {
    let mut buffer = vec![0_u8; chunk_size.max(1)];
    let mut total: u64 = 0;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(StreamError::Read(err)),
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        writer.write_all(chunk).map_err(StreamError::Write)?;
        total = total.saturating_add(read as u64);
    }
    writer.flush().map_err(StreamError::Write)?;
    Ok(total)
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error, timeout: Duration) -> FetchError {
    match err {
        ureq::Error::Timeout(_) => FetchError::Timeout {
            url: url.to_owned(),
            seconds: timeout.as_secs(),
        },
        ureq::Error::Io(io_err) if io_err.kind() == io::ErrorKind::TimedOut => {
            FetchError::Timeout {
                url: url.to_owned(),
                seconds: timeout.as_secs(),
            }
        }
        ureq::Error::StatusCode(status) => FetchError::Status {
            url: url.to_owned(),
            status: *status,
        },
        other => FetchError::Network {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
