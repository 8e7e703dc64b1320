// SPDX-License-Identifier: MIT

//! The hash-sidecar format `mgmt-core` mandates for any resource's
//! var-dir: a single line containing the hex digest, nothing else.

use std::io;
use std::path::{Path, PathBuf};

/// A single persisted SHA-256 digest, read and written as one line.
pub struct HashSidecar {
    path: PathBuf,
}

impl HashSidecar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `input.sha256` under `dir`.
    pub fn input(dir: &Path) -> Self {
        Self::new(dir.join("input.sha256"))
    }

    /// `output.sha256` under `dir`.
    pub fn output(dir: &Path) -> Self {
        Self::new(dir.join("output.sha256"))
    }

    /// `None` if the sidecar has never been written.
    pub async fn read(&self) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write(&self, digest: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, format!("{digest}\n")).await?;
        tracing::debug!(path = %self.path.display(), %digest, "wrote hash sidecar");
        Ok(())
    }

    /// True iff the sidecar exists and holds exactly `digest`.
    pub async fn matches(&self, digest: &str) -> io::Result<bool> {
        Ok(self.read().await?.as_deref() == Some(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_sidecar_reads_as_none() {
        let dir = tempdir().unwrap();
        let sidecar = HashSidecar::input(dir.path());
        assert_eq!(sidecar.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let sidecar = HashSidecar::output(dir.path());
        sidecar.write("abc123").await.unwrap();
        assert_eq!(sidecar.read().await.unwrap(), Some("abc123".to_string()));
        assert!(sidecar.matches("abc123").await.unwrap());
        assert!(!sidecar.matches("other").await.unwrap());
    }
}
