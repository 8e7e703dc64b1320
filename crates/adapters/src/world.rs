// SPDX-License-Identifier: MIT

//! The default `World`: a single local filesystem reached through
//! plain `tokio::fs`, addressed by the fixed `"local://"` URI.

use async_trait::async_trait;
use mgmt_core::{World, WorldError, WorldFs};
use std::path::{Path, PathBuf};

/// `WorldFs` rooted at an arbitrary directory on the local filesystem.
pub struct LocalWorldFs {
    root: PathBuf,
}

impl LocalWorldFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl WorldFs for LocalWorldFs {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, WorldError> {
        tokio::fs::read(self.resolve(path)).await.map_err(WorldError::Io)
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), WorldError> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(WorldError::Io)?;
        }
        tokio::fs::write(resolved, contents).await.map_err(WorldError::Io)
    }

    async fn exists(&self, path: &Path) -> Result<bool, WorldError> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await.map_err(WorldError::Io)?)
    }
}

/// The host's own filesystem, the only world every daemon has by default.
pub struct LocalWorld {
    root: PathBuf,
}

impl LocalWorld {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl World for LocalWorld {
    fn uri(&self) -> &str {
        "local://"
    }

    async fn fs(&self, uri: &str) -> Result<Box<dyn WorldFs>, WorldError> {
        match uri {
            "local://" | "" => Ok(Box::new(LocalWorldFs::new(self.root.clone()))),
            other => Err(WorldError::UnknownUri(other.to_string())),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    pub struct FakeWorldFs {
        files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    }

    #[async_trait]
    impl WorldFs for FakeWorldFs {
        async fn read(&self, path: &Path) -> Result<Vec<u8>, WorldError> {
            self.files
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| WorldError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
        }

        async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), WorldError> {
            self.files.lock().insert(path.to_path_buf(), contents.to_vec());
            Ok(())
        }

        async fn exists(&self, path: &Path) -> Result<bool, WorldError> {
            Ok(self.files.lock().contains_key(path))
        }
    }

    /// Cheap handle onto a `FakeWorld`'s shared filesystem, returned from
    /// `fs()` so state seeded before `Init` is visible afterwards.
    pub struct FakeWorldFsHandle(Arc<FakeWorldFs>);

    #[async_trait]
    impl WorldFs for FakeWorldFsHandle {
        async fn read(&self, path: &Path) -> Result<Vec<u8>, WorldError> {
            self.0.read(path).await
        }

        async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), WorldError> {
            self.0.write(path, contents).await
        }

        async fn exists(&self, path: &Path) -> Result<bool, WorldError> {
            self.0.exists(path).await
        }
    }

    /// In-memory `World` with a single fake filesystem, for resources that
    /// pull inputs from a shared deploy area rather than the local disk.
    #[derive(Clone, Default)]
    pub struct FakeWorld {
        fs: Arc<FakeWorldFs>,
    }

    impl FakeWorld {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
            self.fs.files.lock().insert(path.into(), contents.into());
        }
    }

    #[async_trait]
    impl World for FakeWorld {
        fn uri(&self) -> &str {
            "fake://"
        }

        async fn fs(&self, _uri: &str) -> Result<Box<dyn WorldFs>, WorldError> {
            Ok(Box::new(FakeWorldFsHandle(self.fs.clone())))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeWorld;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn local_world_round_trips_a_file() {
        let dir = tempdir().unwrap();
        let world = LocalWorld::new(dir.path());
        let fs = world.fs("local://").await.unwrap();
        fs.write(Path::new("a/b.txt"), b"hello").await.unwrap();
        assert!(fs.exists(Path::new("a/b.txt")).await.unwrap());
        assert_eq!(fs.read(Path::new("a/b.txt")).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn unknown_uri_is_rejected() {
        let dir = tempdir().unwrap();
        let world = LocalWorld::new(dir.path());
        assert!(world.fs("s3://bucket").await.is_err());
    }

    #[tokio::test]
    async fn fake_world_seed_is_visible_through_fs() {
        let world = fake::FakeWorld::new();
        world.seed("deploy/app.tar", b"payload".to_vec());
        let fs = world.fs("fake://").await.unwrap();
        assert_eq!(fs.read(Path::new("deploy/app.tar")).await.unwrap(), b"payload");
    }
}
