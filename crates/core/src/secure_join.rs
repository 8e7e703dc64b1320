// SPDX-License-Identifier: MIT

//! Secure-join: compose a root directory with a request-supplied
//! relative path, forbidding `..` escapes and symlink traversal outside
//! the root. Used by the HTTP server family's root-directory fallback
//! and by any resource that serves files by untrusted relative path.

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecureJoinError {
    #[error("path escapes root via '..'")]
    ParentEscape,
    #[error("path contains disallowed component")]
    DisallowedComponent,
    #[error("path resolves outside root via symlink")]
    SymlinkEscape,
    #[error("path not found")]
    NotFound,
}

/// Join `root` with `requested` (a `/`-separated, request-supplied
/// path), refusing anything that would resolve outside `root`.
///
/// Rejects any `..` or root (`/`) component in `requested` outright,
/// then canonicalizes the joined path and checks canonicalized `root`
/// is still a prefix — this is what catches symlink escapes a purely
/// lexical check would miss.
pub fn secure_join(root: &Path, requested: &str) -> Result<PathBuf, SecureJoinError> {
    let requested_path = Path::new(requested.trim_start_matches('/'));
    for component in requested_path.components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir => {}
            Component::ParentDir => return Err(SecureJoinError::ParentEscape),
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecureJoinError::DisallowedComponent)
            }
        }
    }

    let joined = root.join(requested_path);

    let canonical_root = fs::canonicalize(root).map_err(|_| SecureJoinError::NotFound)?;
    let canonical_joined = match fs::canonicalize(&joined) {
        Ok(p) => p,
        Err(_) => return Err(SecureJoinError::NotFound),
    };

    if canonical_joined.starts_with(&canonical_root) {
        Ok(canonical_joined)
    } else {
        Err(SecureJoinError::SymlinkEscape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    #[cfg(unix)]
    use std::os::unix::fs::symlink;

    #[test]
    fn serves_a_plain_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("index.html")).unwrap();
        let resolved = secure_join(dir.path(), "/index.html").unwrap();
        assert_eq!(resolved, fs::canonicalize(dir.path().join("index.html")).unwrap());
    }

    #[test]
    fn rejects_parent_dir_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = secure_join(dir.path(), "/../etc/passwd").unwrap_err();
        assert_eq!(err, SecureJoinError::ParentEscape);
    }

    #[test]
    fn rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = secure_join(dir.path(), "/nope.html").unwrap_err();
        assert_eq!(err, SecureJoinError::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        File::create(outside.path().join("secret")).unwrap();
        symlink(outside.path().join("secret"), dir.path().join("link")).unwrap();
        let err = secure_join(dir.path(), "/link").unwrap_err();
        assert_eq!(err, SecureJoinError::SymlinkEscape);
    }
}
