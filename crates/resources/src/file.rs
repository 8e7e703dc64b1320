// SPDX-License-Identifier: MIT

//! The `file` resource: converges a single path's existence, content,
//! and permission bits. The recursive filesystem watcher primitive
//! stays an external collaborator (out of scope per the workspace's own
//! framework/resource split), so `Watch` only arms and then idles;
//! divergence is caught by the engine's own event-driven `CheckApply`
//! cadence rather than by a native inotify-style observer here.

use async_trait::async_trait;
use mgmt_core::{
    AutoEdgeCandidate, AutoEdgeIter, Edgeable, Handle, MgmtError, Resource, ResourceMeta,
    Reversible, StateValue, Uid,
};
use parking_lot::Mutex;
use std::any::Any;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where a file's desired content comes from. `Inline` covers the
/// common case (content supplied directly by the config loader);
/// `FromWorld` reads it from an externally maintained filesystem
/// snapshot via `handle.world()`, for resources layered on top of a
/// shared deploy area.
#[derive(Debug, Clone)]
pub enum FileContent {
    Inline(Vec<u8>),
    FromWorld { uri: String, path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct FileConfig {
    pub path: PathBuf,
    /// Only `Exists` and `Absent` are meaningful for this kind.
    pub state: StateValue,
    /// `None` means "don't manage content" (useful for a bare directory
    /// or a pre-existing file this config only needs to guarantee exists).
    pub content: Option<FileContent>,
    /// `None` means "don't manage permission bits".
    pub mode: Option<u32>,
}

pub struct FileResource {
    meta: ResourceMeta,
    config: Mutex<FileConfig>,
    handle: Mutex<Option<Arc<dyn Handle>>>,
}

impl FileResource {
    pub fn new(config: FileConfig) -> Self {
        let meta = ResourceMeta::new("file", config.path.display().to_string());
        Self { meta, config: Mutex::new(config), handle: Mutex::new(None) }
    }

    fn handle(&self) -> Result<Arc<dyn Handle>, MgmtError> {
        self.handle
            .lock()
            .clone()
            .ok_or_else(|| MgmtError::precondition(self.meta.to_string(), "not initialized"))
    }

    async fn desired_content(&self, handle: &Arc<dyn Handle>, content: &FileContent) -> Result<Vec<u8>, MgmtError> {
        match content {
            FileContent::Inline(bytes) => Ok(bytes.clone()),
            FileContent::FromWorld { uri, path } => {
                let fs = handle
                    .world()
                    .fs(uri)
                    .await
                    .map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
                fs.read(path).await.map_err(|e| MgmtError::transient(self.meta.to_string(), e))
            }
        }
    }

    /// Converge the filesystem toward `config`, mutating only if `apply`.
    /// Returns whether the path is (now) converged.
    async fn converge(&self, handle: &Arc<dyn Handle>, config: &FileConfig, apply: bool) -> Result<bool, MgmtError> {
        match config.state {
            StateValue::Absent => self.converge_absent(config, apply).await,
            StateValue::Exists => self.converge_exists(handle, config, apply).await,
            other => {
                Err(MgmtError::validation(self.meta.to_string(), format!("unsupported state {other}")))
            }
        }
    }

    async fn converge_absent(&self, config: &FileConfig, apply: bool) -> Result<bool, MgmtError> {
        let metadata = tokio::fs::metadata(&config.path).await;
        let exists = match metadata {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(MgmtError::transient(self.meta.to_string(), e)),
        };
        if !exists {
            return Ok(true);
        }
        if !apply {
            return Ok(false);
        }
        let is_dir = tokio::fs::metadata(&config.path)
            .await
            .map_err(|e| MgmtError::transient(self.meta.to_string(), e))?
            .is_dir();
        let result = if is_dir {
            tokio::fs::remove_dir_all(&config.path).await
        } else {
            tokio::fs::remove_file(&config.path).await
        };
        result.map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        Ok(false)
    }

    async fn converge_exists(&self, handle: &Arc<dyn Handle>, config: &FileConfig, apply: bool) -> Result<bool, MgmtError> {
        let Some(content) = &config.content else {
            return self.converge_directory(config, apply).await;
        };
        let desired = self.desired_content(handle, content).await?;

        let current = tokio::fs::read(&config.path).await.ok();
        let content_matches = current.as_deref() == Some(desired.as_slice());
        let mode_matches = self.mode_matches(config).await?;

        if content_matches && mode_matches {
            return Ok(true);
        }
        if !apply {
            return Ok(false);
        }

        if let Some(parent) = config.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        }
        let tmp = config.path.with_extension("mgmt-tmp");
        tokio::fs::write(&tmp, &desired).await.map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        if let Some(mode) = config.mode {
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        }
        if let Err(e) = tokio::fs::rename(&tmp, &config.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(MgmtError::transient(self.meta.to_string(), e));
        }
        handle.logf(&format!("wrote {} bytes", desired.len()));
        Ok(false)
    }

    async fn converge_directory(&self, config: &FileConfig, apply: bool) -> Result<bool, MgmtError> {
        let exists = tokio::fs::metadata(&config.path).await.map(|m| m.is_dir()).unwrap_or(false);
        if exists {
            return Ok(true);
        }
        if !apply {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&config.path).await.map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        Ok(false)
    }

    async fn mode_matches(&self, config: &FileConfig) -> Result<bool, MgmtError> {
        let Some(mode) = config.mode else { return Ok(true) };
        match tokio::fs::metadata(&config.path).await {
            Ok(metadata) => Ok(metadata.permissions().mode() & 0o7777 == mode),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MgmtError::transient(self.meta.to_string(), e)),
        }
    }

    /// Nearest-first chain of ancestor directories, stopping at the filesystem root.
    fn ancestors(path: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut current = path.parent();
        while let Some(p) = current {
            if p.as_os_str().is_empty() {
                break;
            }
            out.push(p.to_path_buf());
            current = p.parent();
        }
        out
    }
}

#[async_trait]
impl Resource for FileResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), MgmtError> {
        let config = self.config.lock();
        if !config.path.is_absolute() {
            return Err(MgmtError::validation(self.meta.to_string(), "path must be absolute"));
        }
        match config.state {
            StateValue::Exists | StateValue::Absent => {}
            other => {
                return Err(MgmtError::validation(self.meta.to_string(), format!("unsupported state {other}")));
            }
        }
        if config.state == StateValue::Absent && config.content.is_some() {
            return Err(MgmtError::validation(self.meta.to_string(), "absent file cannot declare content"));
        }
        Ok(())
    }

    async fn init(&self, handle: Arc<dyn Handle>) -> Result<(), MgmtError> {
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    async fn watch(&self, ctx: CancellationToken) -> Result<(), MgmtError> {
        let handle = self.handle()?;
        handle.running().await;
        ctx.cancelled().await;
        Ok(())
    }

    async fn check_apply(&self, _ctx: &CancellationToken, apply: bool) -> Result<bool, MgmtError> {
        let handle = self.handle()?;
        let config = self.config.lock().clone();
        self.converge(&handle, &config, apply).await
    }

    async fn cleanup(&self) -> Result<(), MgmtError> {
        Ok(())
    }

    fn cmp(&self, other: &dyn Resource) -> Result<(), MgmtError> {
        let Some(other) = other.as_any().downcast_ref::<FileResource>() else {
            return Err(MgmtError::inconsistency(self.meta.to_string(), "cmp against a different kind"));
        };
        let (ours, theirs) = (self.config.lock(), other.config.lock());
        if ours.path == theirs.path && ours.state == theirs.state {
            Ok(())
        } else {
            Err(MgmtError::inconsistency(self.meta.to_string(), "path or state changed"))
        }
    }

    fn uids(&self) -> Vec<Uid> {
        vec![Uid::path(self.config.lock().path.clone())]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn as_edgeable(&self) -> Option<&dyn Edgeable> {
        Some(self)
    }

    fn as_reversible(&self) -> Option<&dyn Reversible> {
        Some(self)
    }
}

struct AncestorEdges {
    candidates: std::vec::IntoIter<PathBuf>,
    reversed: bool,
}

impl AutoEdgeIter for AncestorEdges {
    fn next(&mut self) -> Option<AutoEdgeCandidate> {
        let path = self.candidates.next()?;
        let uid = Uid::path(path);
        Some(if self.reversed { AutoEdgeCandidate::reversed(uid) } else { AutoEdgeCandidate::new(uid) })
    }

    fn test(&mut self, matched: &[Uid]) -> bool {
        // Stop walking further up the tree once the nearest managed
        // ancestor has been found.
        matched.is_empty()
    }
}

impl Edgeable for FileResource {
    fn auto_edges(&self) -> Box<dyn AutoEdgeIter + '_> {
        let config = self.config.lock();
        let candidates = Self::ancestors(&config.path);
        // Exists: this file depends on its parent directory (parent must
        // be created first) — the default, candidate-precedes-resource
        // direction. Absent: the parent's own removal (if it too is
        // managed absent) must wait for this file's removal first, so
        // the edge runs the other way. See DESIGN.md for why this reads
        // opposite the literal wording of the rule it's grounded on.
        let reversed = config.state == StateValue::Absent;
        Box::new(AncestorEdges { candidates: candidates.into_iter(), reversed })
    }
}

impl Reversible for FileResource {
    fn reverse(&self) -> Result<Box<dyn Resource>, MgmtError> {
        let config = self.config.lock();
        let reversed_state = match config.state {
            StateValue::Exists => StateValue::Absent,
            StateValue::Absent => StateValue::Exists,
            other => return Err(MgmtError::validation(self.meta.to_string(), format!("cannot reverse state {other}"))),
        };
        Ok(Box::new(FileResource::new(FileConfig {
            path: config.path.clone(),
            state: reversed_state,
            content: if reversed_state == StateValue::Absent { None } else { config.content.clone() },
            mode: config.mode,
        })))
    }
}
