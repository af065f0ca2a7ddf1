//! Plugin layout classification from archive member names.
//!
//! Classification is a pure function over an [`ArchiveManifest`]: it decides
//! whether the archive carries a script plugin or a compiled one, which
//! top-level directory names the plugin, and whether a dependency manifest
//! ships alongside it. Suffix matching is heuristic by nature; keeping it
//! free of I/O keeps it testable in isolation.

use crate::archive::ArchiveManifest;
use log::warn;
use std::fmt;

/// Suffix identifying script plugin sources.
const SCRIPT_SUFFIX: &str = ".py";

/// Suffix of a bare (link) shared library.
const LINK_LIBRARY_SUFFIX: &str = ".so";

/// Marker preceding the version of a versioned shared library.
const VERSIONED_LIBRARY_MARKER: &str = ".so.";

/// Prefix of a dependency manifest file name.
const REQUIREMENTS_PREFIX: &str = "requirement";

/// Suffix of a dependency manifest file name.
const REQUIREMENTS_SUFFIX: &str = ".txt";

/// Errors raised when an archive does not describe a usable plugin.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// Neither a script source nor a shared library was found.
    #[error(
        "invalid plugin directory structure found, please check the contents of your tar file"
    )]
    NoEntryPoint,

    /// A versioned library ships without the unversioned link the loader
    /// resolves it by.
    #[error("symlink file is missing for versioned library {library}")]
    MissingLinkLibrary {
        /// Member path of the versioned library.
        library: String,
    },
}

/// How the plugin is loaded at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PluginKind {
    /// Interpreted plugin shipped as script sources.
    Script,
    /// Native plugin shipped as a shared library.
    Compiled,
}

impl PluginKind {
    /// Both kinds, in listing order.
    pub const ALL: [Self; 2] = [Self::Script, Self::Compiled];

    /// Short name used in listings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Compiled => "compiled",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classified shape of an extracted plugin archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginLayout {
    /// Script or compiled plugin.
    pub kind: PluginKind,
    /// Whether a versioned shared library (`libx.so.1`) is present.
    pub has_versioned_library: bool,
    /// Whether a bare shared library (`libx.so`) is present.
    pub has_link_library: bool,
    /// First path segment of the first member; names the installed plugin.
    pub top_level_name: String,
    /// Further distinct top-level names, which are not installed.
    pub other_roots: Vec<String>,
    /// Member path of the first dependency manifest, if any.
    pub requirements_file: Option<String>,
}

/// Classify an extracted archive.
///
/// # Errors
///
/// Returns [`LayoutError::NoEntryPoint`] when no script source or bare
/// shared library is present, and [`LayoutError::MissingLinkLibrary`] when a
/// versioned library lacks its link library.
///
/// # Examples
///
/// ```
/// use plugin_installer::archive::ArchiveManifest;
/// use plugin_installer::layout::{PluginKind, classify};
///
/// let manifest: ArchiveManifest =
///     ["dht11", "dht11/dht11.py", "dht11/requirements.txt"].into_iter().collect();
/// let layout = classify(&manifest)?;
/// assert_eq!(layout.kind, PluginKind::Script);
/// assert_eq!(layout.top_level_name, "dht11");
/// assert_eq!(layout.requirements_file.as_deref(), Some("dht11/requirements.txt"));
/// # Ok::<(), plugin_installer::layout::LayoutError>(())
/// ```
pub fn classify(manifest: &ArchiveManifest) -> Result<PluginLayout, LayoutError> {
    let mut has_script = false;
    let mut has_link_library = false;
    let mut versioned_library: Option<&str> = None;
    let mut requirements_file = None;

    for member in manifest.members() {
        let name = final_segment(member);
        has_script |= name.ends_with(SCRIPT_SUFFIX);
        has_link_library |= name.ends_with(LINK_LIBRARY_SUFFIX);
        if versioned_library.is_none() && is_versioned_library(name) {
            versioned_library = Some(member);
        }
        if requirements_file.is_none() && is_requirements_file(name) {
            requirements_file = Some(member.clone());
        }
    }

    if !has_script && !has_link_library {
        return Err(LayoutError::NoEntryPoint);
    }
    if let (Some(library), false) = (versioned_library, has_link_library) {
        warn!("versioned library {library} has no accompanying link library");
        return Err(LayoutError::MissingLinkLibrary {
            library: library.to_owned(),
        });
    }

    let mut roots = top_level_names(manifest).into_iter();
    let top_level_name = roots.next().ok_or(LayoutError::NoEntryPoint)?;
    let other_roots: Vec<String> = roots.collect();
    if !other_roots.is_empty() {
        warn!(
            "archive has several top-level entries; installing {top_level_name} and ignoring {}",
            other_roots.join(", ")
        );
    }

    Ok(PluginLayout {
        kind: if has_script {
            PluginKind::Script
        } else {
            PluginKind::Compiled
        },
        has_versioned_library: versioned_library.is_some(),
        has_link_library,
        top_level_name,
        other_roots,
        requirements_file,
    })
}

/// Distinct first path segments, in order of first appearance.
fn top_level_names(manifest: &ArchiveManifest) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for member in manifest.members() {
        let Some(root) = member.split('/').find(|segment| !segment.is_empty()) else {
            continue;
        };
        if !names.iter().any(|known| known == root) {
            names.push(root.to_owned());
        }
    }
    names
}

fn final_segment(member: &str) -> &str {
    member.rsplit('/').next().unwrap_or(member)
}

/// Matches `libfoo.so.1`, `libfoo.so.1.2.3` and the like.
fn is_versioned_library(name: &str) -> bool {
    name.rsplit_once(VERSIONED_LIBRARY_MARKER)
        .is_some_and(|(stem, version)| {
            !stem.is_empty()
                && !version.is_empty()
                && version
                    .split('.')
                    .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
        })
}

fn is_requirements_file(name: &str) -> bool {
    name.starts_with(REQUIREMENTS_PREFIX) && name.ends_with(REQUIREMENTS_SUFFIX)
}
