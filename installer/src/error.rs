//! Error types for the plugin installer.
//!
//! Each stage of the install pipeline owns a narrow error enum; this module
//! gathers them into [`InstallerError`] and classifies every failure into one
//! of the three caller-visible outcomes via [`FailureClass`].

use crate::archive::ExtractionError;
use crate::fetch::FetchError;
use crate::layout::LayoutError;
use crate::request::RequestError;
use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Caller-visible category of a failed installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The request, the downloaded content, or an external command was at
    /// fault.
    BadRequest,
    /// The archive lacks a usable plugin structure.
    NotFound,
    /// An infrastructure failure that the caller cannot correct.
    Internal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest => write!(f, "bad request"),
            Self::NotFound => write!(f, "not found"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

/// Errors that can occur while installing a plugin.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The request failed validation before any side effect took place.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Retrieving the remote resource failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The downloaded file does not match the expected checksum.
    #[error("checksum mismatch for {file_name}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Name of the staged file.
        file_name: String,
        /// Digest supplied by the caller.
        expected: String,
        /// Digest computed over the staged file.
        actual: String,
    },

    /// The staged archive could not be read or unpacked.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The archive contents do not form a recognisable plugin.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// An external command exited with a non-zero status.
    #[error("{command} exited with status {exit_code}: {message}")]
    ExternalCommand {
        /// Program that was invoked.
        command: String,
        /// Exit status reported by the program.
        exit_code: i32,
        /// Captured and flattened command output.
        message: String,
    },

    /// A filesystem mutation failed.
    #[error("filesystem operation failed on {path}: {source}")]
    Filesystem {
        /// Path the operation targeted.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The installer configuration is unusable.
    #[error("invalid configuration: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl InstallerError {
    /// Classify this error into a caller-visible outcome.
    ///
    /// # Examples
    ///
    /// ```
    /// use plugin_installer::error::{FailureClass, InstallerError};
    ///
    /// let err = InstallerError::ExternalCommand {
    ///     command: "apt".to_owned(),
    ///     exit_code: 100,
    ///     message: "E: Unable to locate package".to_owned(),
    /// };
    /// assert_eq!(err.class(), FailureClass::BadRequest);
    /// ```
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Request(_) | Self::ChecksumMismatch { .. } | Self::ExternalCommand { .. } => {
                FailureClass::BadRequest
            }
            Self::Fetch(err) => err.class(),
            Self::Extraction(err) => err.class(),
            Self::Layout(_) => FailureClass::NotFound,
            Self::Filesystem { .. } | Self::Config { .. } | Self::Io(_) => FailureClass::Internal,
            #[cfg(any(test, feature = "test-support"))]
            Self::StubMismatch { .. } => FailureClass::Internal,
        }
    }

    /// Return the reason string reported to the caller.
    ///
    /// External command failures report the command's captured output
    /// verbatim; every other error reports its display form.
    #[must_use]
    pub fn caller_message(&self) -> String {
        match self {
            Self::ExternalCommand { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn external_command_reports_output_verbatim() {
        let err = InstallerError::ExternalCommand {
            command: "pip3".to_owned(),
            exit_code: 1,
            message: "ERROR: No matching distribution found for wiringpi".to_owned(),
        };
        assert_eq!(
            err.caller_message(),
            "ERROR: No matching distribution found for wiringpi"
        );
        assert!(err.to_string().contains("pip3"));
    }

    #[test]
    fn checksum_mismatch_names_both_digests() {
        let err = InstallerError::ChecksumMismatch {
            file_name: "dht11.tar".to_owned(),
            expected: "aaaa".to_owned(),
            actual: "bbbb".to_owned(),
        };
        let msg = err.caller_message();
        assert!(msg.contains("dht11.tar"));
        assert!(msg.contains("aaaa"));
        assert!(msg.contains("bbbb"));
    }

    #[rstest]
    #[case::request(InstallerError::Request(RequestError::MissingPluginType), FailureClass::BadRequest)]
    #[case::layout(InstallerError::Layout(LayoutError::NoEntryPoint), FailureClass::NotFound)]
    #[case::io(InstallerError::Io(std::io::Error::other("disk full")), FailureClass::Internal)]
    #[case::config(
        InstallerError::Config { reason: "empty package manager".to_owned() },
        FailureClass::Internal
    )]
    fn errors_map_to_caller_classes(#[case] err: InstallerError, #[case] expected: FailureClass) {
        assert_eq!(err.class(), expected);
    }

    #[test]
    fn filesystem_error_preserves_source() {
        let err = InstallerError::Filesystem {
            path: Utf8PathBuf::from("/usr/local/foglamp/plugins/south/dht11"),
            source: std::io::Error::other("permission denied"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.class(), FailureClass::Internal);
    }
}
