//! Content digests for downloaded artefacts.
//!
//! The caller supplies an MD5 hex digest alongside the URL; the staged
//! file's digest must match it exactly before anything is unpacked or
//! installed.

use crate::fetch::StagedArtifact;
use md5::{Digest, Md5};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Expected length of a hex-encoded MD5 digest.
const DIGEST_HEX_LEN: usize = 32;

/// Read buffer used while hashing.
const HASH_BUFFER_LEN: usize = 8192;

/// A hex-encoded MD5 digest as produced by [`compute_md5`].
///
/// # Examples
///
/// ```
/// use plugin_installer::verify::Md5Digest;
///
/// let digest = Md5Digest::try_from("d41d8cd98f00b204e9800998ecf8427e").unwrap();
/// assert_eq!(digest.as_str().len(), 32);
/// assert!(Md5Digest::try_from("not-a-digest").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Md5Digest(String);

/// Error returned when a string is not a lowercase 32-character hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MD5 digest: {reason}")]
pub struct InvalidDigest {
    reason: String,
}

impl Md5Digest {
    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when `expected` is exactly this digest.
    #[must_use]
    pub fn matches(&self, expected: &str) -> bool {
        self.0 == expected
    }
}

impl TryFrom<&str> for Md5Digest {
    type Error = InvalidDigest;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_md5(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl AsRef<str> for Md5Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_md5(value: &str) -> Result<(), InvalidDigest> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(InvalidDigest {
            reason: format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !c.is_ascii_digit() && !matches!(c, 'a'..='f'))
    {
        return Err(InvalidDigest {
            reason: format!("unexpected character '{bad}'"),
        });
    }
    Ok(())
}

/// Compute the MD5 digest of a file.
///
/// Reads the file at `path` in chunks and returns the lowercase hex digest.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub fn compute_md5(path: &Path) -> io::Result<Md5Digest> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = [0_u8; HASH_BUFFER_LEN];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }
    Ok(Md5Digest(format!("{:x}", hasher.finalize())))
}

/// Check a staged artefact against the caller-supplied digest.
///
/// Returns `Ok(false)` on mismatch; only an unreadable file is an error.
///
/// # Errors
///
/// Returns an I/O error if the staged file cannot be read.
pub fn verify_checksum(artifact: &StagedArtifact, expected: &str) -> io::Result<bool> {
    Ok(artifact.digest()?.matches(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    fn staged(contents: &[u8]) -> (tempfile::TempDir, StagedArtifact) {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(temp.path().join("plugin.tar")).expect("UTF-8 path");
        fs::write(&path, contents).expect("write staged file");
        let len = contents.len() as u64;
        (temp, StagedArtifact::new(path, len))
    }

    #[rstest]
    #[case::empty(b"", EMPTY_MD5)]
    #[case::hello(b"hello", HELLO_MD5)]
    fn compute_md5_matches_known_vectors(#[case] contents: &[u8], #[case] expected: &str) {
        let (_temp, artifact) = staged(contents);
        let digest = compute_md5(artifact.path().as_std_path()).expect("digest");
        assert_eq!(digest.as_str(), expected);
    }

    #[test]
    fn verify_accepts_exact_digest() {
        let (_temp, artifact) = staged(b"hello");
        assert!(verify_checksum(&artifact, HELLO_MD5).expect("readable"));
    }

    #[rstest]
    #[case::different(EMPTY_MD5)]
    #[case::uppercase("5D41402ABC4B2A76B9719D911017C592")]
    #[case::garbage("checksum")]
    fn verify_rejects_anything_but_exact_digest(#[case] expected: &str) {
        let (_temp, artifact) = staged(b"hello");
        assert!(!verify_checksum(&artifact, expected).expect("readable"));
    }

    #[test]
    fn verify_reports_missing_file() {
        let artifact = StagedArtifact::new(Utf8PathBuf::from("/nonexistent/plugin.tar"), 0);
        assert!(verify_checksum(&artifact, EMPTY_MD5).is_err());
    }

    #[test]
    fn digest_is_computed_once() {
        let (_temp, artifact) = staged(b"hello");
        let first = artifact.digest().expect("digest").clone();
        fs::write(artifact.path(), b"changed").expect("rewrite");
        assert_eq!(artifact.digest().expect("cached digest"), &first);
    }

    #[test]
    fn rejects_uppercase_digest_string() {
        assert!(Md5Digest::try_from("5D41402ABC4B2A76B9719D911017C592").is_err());
    }
}
