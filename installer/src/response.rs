//! Caller-facing rendering of install outcomes.
//!
//! An [`InstallOutcome`] is surfaced either as an HTTP-style status with a
//! JSON body, for the service hosting this library, or as a process exit
//! code for the command-line binary.

use crate::pipeline::{InstallOutcome, Verdict};
use serde::Serialize;

/// Response body for an install request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Returned with status 200.
    Installed {
        /// `"<file> is successfully downloaded and installed"`.
        message: String,
    },
    /// Returned with every failure status.
    Failed {
        /// Why the request failed.
        reason: String,
    },
}

/// Status code and body for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: ResponseBody,
}

impl InstallResponse {
    /// Serialise the body as JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use plugin_installer::response::{InstallResponse, ResponseBody};
    ///
    /// let response = InstallResponse {
    ///     status: 404,
    ///     body: ResponseBody::Failed { reason: "no plugin".to_owned() },
    /// };
    /// assert_eq!(response.body_json(), r#"{"reason":"no plugin"}"#);
    /// ```
    #[must_use]
    pub fn body_json(&self) -> String {
        serde_json::to_string(&self.body).unwrap_or_else(|_| "{}".to_owned())
    }
}

impl From<&InstallOutcome> for InstallResponse {
    fn from(outcome: &InstallOutcome) -> Self {
        let body = match outcome.verdict {
            Verdict::Success => ResponseBody::Installed {
                message: outcome.message.clone(),
            },
            Verdict::BadRequest | Verdict::NotFound | Verdict::Internal => ResponseBody::Failed {
                reason: outcome.message.clone(),
            },
        };
        Self {
            status: http_status(outcome.verdict),
            body,
        }
    }
}

/// HTTP status code for a verdict.
#[must_use]
pub const fn http_status(verdict: Verdict) -> u16 {
    match verdict {
        Verdict::Success => 200,
        Verdict::BadRequest => 400,
        Verdict::NotFound => 404,
        Verdict::Internal => 500,
    }
}

/// Process exit code for a verdict.
#[must_use]
pub const fn exit_code(verdict: Verdict) -> i32 {
    match verdict {
        Verdict::Success => 0,
        Verdict::BadRequest => 1,
        Verdict::NotFound => 2,
        Verdict::Internal => 3,
    }
}
