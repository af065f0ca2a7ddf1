//! Install request parsing and validation.
//!
//! The inbound JSON body is loosely typed: `compressed` may arrive as a
//! boolean or as the strings `"true"`/`"false"`, and `type` is only
//! meaningful for tar archives. [`RawInstallRequest`] mirrors the wire
//! shape; [`RawInstallRequest::validate`] normalises it into a strict
//! [`InstallRequest`] before any network or filesystem activity happens.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Errors raised while validating an install request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The body was not a JSON object of the expected shape.
    #[error("malformed request body: {reason}")]
    MalformedBody {
        /// Parser diagnostic.
        reason: String,
    },

    /// One of `url`, `checksum` or `format` was absent or empty.
    #[error("url, checksum and format are mandatory")]
    MissingField,

    /// `format` was not one of the supported values.
    #[error("invalid format \"{value}\"; must be 'tar' or 'deb'")]
    InvalidFormat {
        /// The rejected value.
        value: String,
    },

    /// `type` was absent for a tar archive.
    #[error("plugin type is required for tar archives")]
    MissingPluginType,

    /// `type` was not one of the five plugin categories.
    #[error(
        "invalid plugin type \"{value}\"; must be 'south', 'north', 'filter', \
         'notificationDelivery' or 'notificationRule'"
    )]
    InvalidPluginType {
        /// The rejected value.
        value: String,
    },

    /// `compressed` carried a value other than a boolean or its string form.
    #[error("only \"true\", \"false\", true and false are allowed for compressed, got {value}")]
    InvalidCompressed {
        /// JSON rendering of the rejected value.
        value: String,
    },
}

/// Declared format of the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// A tar archive, optionally gzip-compressed.
    Tar,
    /// A native OS package handed to the package manager.
    NativePackage,
}

impl ArchiveFormat {
    /// Return the wire name of this format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::NativePackage => "deb",
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = RequestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tar" => Ok(Self::Tar),
            "deb" => Ok(Self::NativePackage),
            other => Err(RequestError::InvalidFormat {
                value: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role a plugin serves; also the category directory it installs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PluginType {
    /// Data ingress plugin.
    South,
    /// Data egress plugin.
    North,
    /// Reading filter plugin.
    Filter,
    /// Notification delivery channel.
    NotificationDelivery,
    /// Notification rule evaluator.
    NotificationRule,
}

impl PluginType {
    /// Every supported plugin category, in directory listing order.
    pub const ALL: [Self; 5] = [
        Self::South,
        Self::North,
        Self::Filter,
        Self::NotificationDelivery,
        Self::NotificationRule,
    ];

    /// Return the category name used on the wire and on disk.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::South => "south",
            Self::North => "north",
            Self::Filter => "filter",
            Self::NotificationDelivery => "notificationDelivery",
            Self::NotificationRule => "notificationRule",
        }
    }
}

impl FromStr for PluginType {
    type Err = RequestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| RequestError::InvalidPluginType {
                value: value.to_owned(),
            })
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request body exactly as the caller sent it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawInstallRequest {
    /// Remote location of the archive or package.
    #[serde(default)]
    pub url: Option<String>,
    /// `"tar"` or `"deb"`.
    #[serde(default)]
    pub format: Option<String>,
    /// Boolean or `"true"`/`"false"`.
    #[serde(default)]
    pub compressed: Option<Value>,
    /// Plugin category, required for tar archives.
    #[serde(default, rename = "type")]
    pub plugin_type: Option<String>,
    /// Expected MD5 hex digest of the download.
    #[serde(default)]
    pub checksum: Option<String>,
}

/// What to install once the request is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallTarget {
    /// Unpack a tar archive into the given plugin category.
    Archive {
        /// Whether the archive is gzip-compressed.
        compressed: bool,
        /// Category subtree the plugin is placed in.
        plugin_type: PluginType,
    },
    /// Hand the download to the OS package manager.
    NativePackage,
}

/// A validated install request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    url: String,
    checksum: String,
    target: InstallTarget,
}

impl InstallRequest {
    /// Build a request for a tar archive.
    #[must_use]
    pub fn archive(
        url: impl Into<String>,
        checksum: impl Into<String>,
        compressed: bool,
        plugin_type: PluginType,
    ) -> Self {
        Self {
            url: url.into(),
            checksum: checksum.into(),
            target: InstallTarget::Archive {
                compressed,
                plugin_type,
            },
        }
    }

    /// Build a request for a native OS package.
    #[must_use]
    pub fn package(url: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            checksum: checksum.into(),
            target: InstallTarget::NativePackage,
        }
    }

    /// Remote location to download.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Expected digest of the downloaded file.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// What the download should be installed as.
    #[must_use]
    pub fn target(&self) -> &InstallTarget {
        &self.target
    }

    /// Declared format of the download.
    #[must_use]
    pub fn format(&self) -> ArchiveFormat {
        match self.target {
            InstallTarget::Archive { .. } => ArchiveFormat::Tar,
            InstallTarget::NativePackage => ArchiveFormat::NativePackage,
        }
    }
}

impl RawInstallRequest {
    /// Parse a JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::MalformedBody`] when the body is not a JSON
    /// object or a field has the wrong JSON type.
    pub fn from_json(body: &str) -> Result<Self, RequestError> {
        serde_json::from_str(body).map_err(|e| RequestError::MalformedBody {
            reason: e.to_string(),
        })
    }

    /// Validate and normalise the request.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestError`] describing the first rule that failed.
    ///
    /// # Examples
    ///
    /// ```
    /// use plugin_installer::request::{InstallTarget, PluginType, RawInstallRequest};
    ///
    /// let raw = RawInstallRequest::from_json(
    ///     r#"{"url": "http://host/dht11.tar.gz", "format": "tar",
    ///         "compressed": "true", "type": "south", "checksum": "abc"}"#,
    /// )?;
    /// let request = raw.validate()?;
    /// assert_eq!(
    ///     request.target(),
    ///     &InstallTarget::Archive { compressed: true, plugin_type: PluginType::South }
    /// );
    /// # Ok::<(), plugin_installer::request::RequestError>(())
    /// ```
    pub fn validate(&self) -> Result<InstallRequest, RequestError> {
        let (Some(url), Some(format), Some(checksum)) = (
            non_empty(self.url.as_deref()),
            non_empty(self.format.as_deref()),
            non_empty(self.checksum.as_deref()),
        ) else {
            return Err(RequestError::MissingField);
        };

        let format = format.parse::<ArchiveFormat>()?;
        let target = match format {
            ArchiveFormat::Tar => {
                let plugin_type = non_empty(self.plugin_type.as_deref())
                    .ok_or(RequestError::MissingPluginType)?
                    .parse::<PluginType>()?;
                InstallTarget::Archive {
                    compressed: normalise_compressed(self.compressed.as_ref())?,
                    plugin_type,
                }
            }
            ArchiveFormat::NativePackage => {
                normalise_compressed(self.compressed.as_ref())?;
                InstallTarget::NativePackage
            }
        };

        Ok(InstallRequest {
            url: url.to_owned(),
            checksum: checksum.to_owned(),
            target,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Collapse the accepted representations of `compressed` into a boolean.
///
/// Absent, `null`, `false` and the empty string mean uncompressed. Only
/// `true`, `"true"`, `false` and `"false"` are otherwise accepted.
fn normalise_compressed(value: Option<&Value>) -> Result<bool, RequestError> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(Value::String(text)) => match text.as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            _ => Err(RequestError::InvalidCompressed {
                value: format!("\"{text}\""),
            }),
        },
        Some(other) => Err(RequestError::InvalidCompressed {
            value: other.to_string(),
        }),
    }
}
