//! Archive extraction for downloaded plugin tarballs.
//!
//! Unpacks plain or gzip-compressed tar archives into the per-request
//! staging directory with path traversal protection, returning the member
//! paths as recorded in the archive. Extraction is data-only: nothing
//! unpacked here is ever executed.

use crate::error::FailureClass;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path};

/// Member paths of an archive, in archive order.
///
/// Paths use `/` separators, carry no leading `./` and no trailing `/`;
/// directory entries are included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveManifest {
    members: Vec<String>,
}

impl ArchiveManifest {
    /// Wrap an ordered list of member paths.
    #[must_use]
    pub fn new(members: Vec<String>) -> Self {
        Self { members }
    }

    /// Member paths in archive order.
    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` when the archive listed no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ArchiveManifest {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Trait for extracting plugin archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the archive at `archive_path` into `dest_dir`.
    ///
    /// When `compressed` is true the archive is read through a gzip
    /// decoder. Returns every member path recorded in the archive.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Format`] if the file is not an archive of
    /// the declared kind, [`ExtractionError::PathTraversal`] if an entry
    /// would escape `dest_dir`, [`ExtractionError::EmptyArchive`] if no
    /// members are found, and [`ExtractionError::Filesystem`] on write
    /// failures.
    fn extract(
        &self,
        archive_path: &Utf8Path,
        dest_dir: &Utf8Path,
        compressed: bool,
    ) -> Result<ArchiveManifest, ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The file is not a readable archive of the declared kind.
    #[error("{path} is not a valid archive: {reason}")]
    Format {
        /// The archive being read.
        path: Utf8PathBuf,
        /// Decoder diagnostic.
        reason: String,
    },

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no members.
    #[error("archive {path} contains no entries")]
    EmptyArchive {
        /// The archive being read.
        path: Utf8PathBuf,
    },

    /// Writing an extracted member failed.
    #[error("extraction I/O error at {path}: {source}")]
    Filesystem {
        /// Path being written.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl ExtractionError {
    /// Classify the failure for the caller.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Format { .. } | Self::PathTraversal { .. } | Self::EmptyArchive { .. } => {
                FailureClass::BadRequest
            }
            Self::Filesystem { .. } => FailureClass::Internal,
        }
    }
}

/// Default extractor using the `tar` and `flate2` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarExtractor;

impl ArchiveExtractor for TarExtractor {
    fn extract(
        &self,
        archive_path: &Utf8Path,
        dest_dir: &Utf8Path,
        compressed: bool,
    ) -> Result<ArchiveManifest, ExtractionError> {
        let file = File::open(archive_path).map_err(|source| ExtractionError::Filesystem {
            path: archive_path.to_owned(),
            source,
        })?;
        if compressed {
            unpack_entries(tar::Archive::new(GzDecoder::new(file)), archive_path, dest_dir)
        } else {
            unpack_entries(tar::Archive::new(file), archive_path, dest_dir)
        }
    }
}

fn unpack_entries<R: Read>(
    mut archive: tar::Archive<R>,
    archive_path: &Utf8Path,
    dest_dir: &Utf8Path,
) -> Result<ArchiveManifest, ExtractionError> {
    let format_error = |err: io::Error| ExtractionError::Format {
        path: archive_path.to_owned(),
        reason: err.to_string(),
    };

    fs::create_dir_all(dest_dir)
        .map_err(|source| filesystem_error(dest_dir.as_std_path(), source))?;
    let dest_root = dest_dir
        .as_std_path()
        .canonicalize()
        .map_err(|source| filesystem_error(dest_dir.as_std_path(), source))?;

    let mut members = Vec::new();
    for entry_result in archive.entries().map_err(format_error)? {
        let mut entry = entry_result.map_err(format_error)?;
        if entry.header().entry_type().is_pax_global_extensions() {
            continue;
        }
        let entry_path = entry.path().map_err(format_error)?.into_owned();

        validate_entry_path(&entry_path)?;
        let Some(member) = member_name(&entry_path) else {
            continue;
        };
        ensure_parent_inside(&dest_root, &entry_path)?;
        if entry.header().entry_type().is_hard_link() {
            if let Some(source) = entry.link_name().map_err(format_error)? {
                validate_entry_path(&source)?;
                ensure_parent_inside(&dest_root, &source)?;
            }
        }

        // `unpack_in` re-checks every parent against `dest_root` and resolves
        // hard link sources relative to it.
        let unpacked = entry.unpack_in(&dest_root).map_err(|err| match err.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => format_error(err),
            _ => filesystem_error(&dest_root.join(&entry_path), err),
        })?;
        if !unpacked {
            return Err(ExtractionError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }

        members.push(member);
    }

    if members.is_empty() {
        return Err(ExtractionError::EmptyArchive {
            path: archive_path.to_owned(),
        });
    }
    Ok(ArchiveManifest::new(members))
}

/// Reject `entry_path` when one of its already extracted ancestors is a
/// symlink resolving outside `dest_root`.
///
/// `dest_root` must be canonical. Dangling symlinks are rejected too.
fn ensure_parent_inside(dest_root: &Path, entry_path: &Path) -> Result<(), ExtractionError> {
    let Some(parent) = entry_path.parent() else {
        return Ok(());
    };
    let mut current = dest_root.to_path_buf();
    for component in parent.components() {
        let Component::Normal(segment) = component else {
            continue;
        };
        current.push(segment);
        let Ok(metadata) = fs::symlink_metadata(&current) else {
            break;
        };
        if !metadata.file_type().is_symlink() {
            continue;
        }
        let inside = current
            .canonicalize()
            .is_ok_and(|resolved| resolved.starts_with(dest_root));
        if !inside {
            return Err(ExtractionError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }
    }
    Ok(())
}

fn filesystem_error(path: &Path, source: io::Error) -> ExtractionError {
    ExtractionError::Filesystem {
        path: Utf8PathBuf::from(path.to_string_lossy().into_owned()),
        source,
    }
}

/// Render an entry path as a `/`-separated member name.
///
/// Returns `None` for the archive root itself (`.` or `./`).
fn member_name(path: &Path) -> Option<String> {
    let segments: Vec<_> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy()),
            _ => None,
        })
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::RootDir));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ArchiveEntry, write_tar};
    use rstest::rstest;
    use std::path::PathBuf;

    fn workspace() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        (temp, root)
    }

    fn dht11_entries() -> Vec<ArchiveEntry<'static>> {
        vec![
            ArchiveEntry::Dir("dht11"),
            ArchiveEntry::File("dht11/__init__.py", b""),
            ArchiveEntry::File("dht11/dht11.py", b"def plugin_info(): pass\n"),
        ]
    }

    #[rstest]
    #[case::plain(false)]
    #[case::gzip(true)]
    fn extracts_members_in_archive_order(#[case] compressed: bool) {
        let (_temp, root) = workspace();
        let archive = root.join("dht11.tar");
        write_tar(&archive, &dht11_entries(), compressed).expect("write archive");
        let dest = root.join("out");

        let manifest = TarExtractor
            .extract(&archive, &dest, compressed)
            .expect("extract");

        assert_eq!(
            manifest.members(),
            ["dht11", "dht11/__init__.py", "dht11/dht11.py"]
        );
        assert!(dest.join("dht11/dht11.py").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn preserves_library_symlinks() {
        let (_temp, root) = workspace();
        let archive = root.join("sinusoid.tar");
        write_tar(
            &archive,
            &[
                ArchiveEntry::Dir("sinusoid"),
                ArchiveEntry::File("sinusoid/libsinusoid.so.1", b"\x7fELF"),
                ArchiveEntry::Symlink("sinusoid/libsinusoid.so", "libsinusoid.so.1"),
            ],
            false,
        )
        .expect("write archive");
        let dest = root.join("out");

        TarExtractor.extract(&archive, &dest, false).expect("extract");

        let link = dest.join("sinusoid/libsinusoid.so");
        let target = fs::read_link(&link).expect("symlink");
        assert_eq!(target, PathBuf::from("libsinusoid.so.1"));
    }

    #[cfg(unix)]
    #[test]
    fn refuses_to_write_through_a_symlink_leaving_the_destination() {
        let (_temp, root) = workspace();
        let outside = root.join("outside");
        fs::create_dir(&outside).expect("outside dir");
        let archive = root.join("escape.tar");
        write_tar(
            &archive,
            &[
                ArchiveEntry::Dir("p"),
                ArchiveEntry::Symlink("p/esc", outside.as_str()),
                ArchiveEntry::File("p/esc/pwned.py", b"print('hi')\n"),
            ],
            false,
        )
        .expect("write archive");

        let result = TarExtractor.extract(&archive, &root.join("out"), false);

        let err = result.expect_err("escape must be refused");
        assert!(matches!(err, ExtractionError::PathTraversal { .. }), "{err}");
        assert_eq!(err.class(), FailureClass::BadRequest);
        assert!(!outside.join("pwned.py").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_inside_the_destination_are_allowed() {
        let (_temp, root) = workspace();
        let archive = root.join("aliased.tar");
        write_tar(
            &archive,
            &[
                ArchiveEntry::Dir("p"),
                ArchiveEntry::Dir("p/real"),
                ArchiveEntry::Symlink("p/alias", "real"),
                ArchiveEntry::File("p/alias/plugin.py", b""),
            ],
            false,
        )
        .expect("write archive");
        let dest = root.join("out");

        TarExtractor.extract(&archive, &dest, false).expect("extract");

        assert!(dest.join("p/real/plugin.py").is_file());
    }

    #[test]
    fn hard_links_resolve_inside_the_destination() {
        let (_temp, root) = workspace();
        let archive = root.join("linked.tar");
        write_tar(
            &archive,
            &[
                ArchiveEntry::Dir("sinusoid"),
                ArchiveEntry::File("sinusoid/libsinusoid.so.1", b"\x7fELF"),
                ArchiveEntry::HardLink("sinusoid/libsinusoid.so", "sinusoid/libsinusoid.so.1"),
            ],
            false,
        )
        .expect("write archive");
        let dest = root.join("out");

        let manifest = TarExtractor.extract(&archive, &dest, false).expect("extract");

        assert_eq!(manifest.len(), 3);
        let linked = fs::read(dest.join("sinusoid/libsinusoid.so")).expect("hard link");
        assert_eq!(linked, b"\x7fELF");
    }

    #[test]
    fn hard_link_to_a_path_outside_is_rejected() {
        let (_temp, root) = workspace();
        let archive = root.join("linked.tar");
        write_tar(
            &archive,
            &[
                ArchiveEntry::Dir("p"),
                ArchiveEntry::HardLink("p/passwd", "../outside.txt"),
            ],
            false,
        )
        .expect("write archive");

        let result = TarExtractor.extract(&archive, &root.join("out"), false);
        assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
    }

    #[test]
    fn gzip_declared_for_plain_archive_is_a_format_error() {
        let (_temp, root) = workspace();
        let archive = root.join("dht11.tar");
        write_tar(&archive, &dht11_entries(), false).expect("write archive");

        let result = TarExtractor.extract(&archive, &root.join("out"), true);
        assert!(matches!(result, Err(ExtractionError::Format { .. })));
    }

    #[test]
    fn non_archive_is_a_format_error() {
        let (_temp, root) = workspace();
        let archive = root.join("notes.tar");
        fs::write(&archive, vec![b'x'; 1024]).expect("write junk");

        let result = TarExtractor.extract(&archive, &root.join("out"), false);
        let err = result.expect_err("junk should not extract");
        assert!(matches!(err, ExtractionError::Format { .. }));
        assert_eq!(err.class(), FailureClass::BadRequest);
    }

    #[test]
    fn empty_archive_is_rejected() {
        let (_temp, root) = workspace();
        let archive = root.join("empty.tar");
        write_tar(&archive, &[], false).expect("write archive");

        let result = TarExtractor.extract(&archive, &root.join("out"), false);
        assert!(matches!(result, Err(ExtractionError::EmptyArchive { .. })));
    }

    #[test]
    fn missing_archive_is_a_filesystem_error() {
        let (_temp, root) = workspace();
        let result = TarExtractor.extract(&root.join("absent.tar"), &root.join("out"), false);
        let err = result.expect_err("missing file");
        assert_eq!(err.class(), FailureClass::Internal);
    }

    #[rstest]
    #[case::parent_dir("../escape.txt")]
    #[case::nested_parent("foo/../../escape.txt")]
    #[case::absolute("/etc/passwd")]
    fn rejects_path_traversal(#[case] bad_path: &str) {
        let result = validate_entry_path(Path::new(bad_path));
        assert!(
            matches!(result, Err(ExtractionError::PathTraversal { .. })),
            "expected PathTraversal for {bad_path}"
        );
    }

    #[rstest]
    #[case::plain("dht11/dht11.py", Some("dht11/dht11.py"))]
    #[case::dot_prefixed("./dht11/dht11.py", Some("dht11/dht11.py"))]
    #[case::trailing_slash("dht11/", Some("dht11"))]
    #[case::root("./", None)]
    fn member_names_are_normalised(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(member_name(Path::new(raw)).as_deref(), expected);
    }
}
