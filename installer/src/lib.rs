//! FogLAMP plugin installer library.
//!
//! This crate downloads a plugin archive or native package, verifies its MD5
//! checksum, and installs it into the FogLAMP plugin tree. Tar archives are
//! classified as script or compiled plugins and placed under their category;
//! packages are handed to the OS package manager. It is used by the
//! `plugin-installer` CLI binary and can be embedded by a service that
//! exposes installation over HTTP.
//!
//! # Modules
//!
//! - [`archive`] - Tar and tar.gz extraction with member listing
//! - [`cleanup`] - Per-request staging directories and best-effort removal
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Layered settings and the derived directory layout
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Error taxonomy and caller-visible failure classes
//! - [`exec`] - External command execution and output capture
//! - [`fetch`] - Time-bounded, chunked downloads into the staging area
//! - [`host`] - Plugin tree mutation and external installer invocation
//! - [`installer`] - Plugin placement and native package installation
//! - [`layout`] - Classification of extracted archives
//! - [`list_output`] - Output formatting for plugin listing
//! - [`pipeline`] - Install request orchestration
//! - [`request`] - Request decoding and validation
//! - [`response`] - Status codes, JSON bodies and exit codes
//! - [`scanner`] - Discovery of installed plugins
//! - [`verify`] - MD5 checksum computation

pub mod archive;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod dirs;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod host;
pub mod installer;
pub mod layout;
pub mod list_output;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod scanner;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
