// SPDX-License-Identifier: MIT

//! `handle.world()` — access to externally maintained filesystems/state
//! snapshots. Used by resources that pull inputs from a shared deploy
//! area rather than the local filesystem (e.g. an archive-of-deploy
//! variant).

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("unknown world uri: {0}")]
    UnknownUri(String),
    #[error("world io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single externally maintained filesystem snapshot, addressed by URI.
#[async_trait]
pub trait WorldFs: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, WorldError>;
    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), WorldError>;
    async fn exists(&self, path: &Path) -> Result<bool, WorldError>;
}

/// `handle.world()`: the resource's view of externally maintained state.
#[async_trait]
pub trait World: Send + Sync + 'static {
    /// The URI identifying this world (e.g. `"local://"`, `"s3://bucket"`).
    fn uri(&self) -> &str;

    /// Resolve a named external filesystem snapshot.
    async fn fs(&self, uri: &str) -> Result<Box<dyn WorldFs>, WorldError>;
}
