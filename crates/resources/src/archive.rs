// SPDX-License-Identifier: MIT

//! The `archive` resource: converges a tar file built from a set of
//! file/directory inputs, using the content-addressable pattern shared
//! by every resource that generates a derived artifact (§4.8): a
//! persisted input digest and output digest in the resource's var-dir,
//! compared before redoing the (possibly expensive) build.

use async_trait::async_trait;
use mgmt_core::{Handle, MgmtError, Resource, ResourceMeta, StateValue, Uid};
use mgmt_storage::{build_manifest, hash_file, hash_manifest, HashSidecar};
use parking_lot::Mutex;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    /// Only `Exists` and `Absent` are meaningful.
    pub state: StateValue,
}

pub struct ArchiveResource {
    meta: ResourceMeta,
    config: Mutex<ArchiveConfig>,
    handle: Mutex<Option<Arc<dyn Handle>>>,
}

impl ArchiveResource {
    pub fn new(config: ArchiveConfig) -> Self {
        let meta = ResourceMeta::new("archive", config.output.display().to_string());
        Self { meta, config: Mutex::new(config), handle: Mutex::new(None) }
    }

    fn handle(&self) -> Result<Arc<dyn Handle>, MgmtError> {
        self.handle
            .lock()
            .clone()
            .ok_or_else(|| MgmtError::precondition(self.meta.to_string(), "not initialized"))
    }

    async fn input_digest(&self, config: &ArchiveConfig) -> Result<String, MgmtError> {
        let inputs = config.inputs.clone();
        let manifest =
            tokio::task::spawn_blocking(move || build_manifest(&inputs))
                .await
                .map_err(|e| MgmtError::transient(self.meta.to_string(), std::io::Error::other(e)))?
                .map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        Ok(hash_manifest(&manifest))
    }

    async fn output_digest(&self, config: &ArchiveConfig) -> Result<Option<String>, MgmtError> {
        match hash_file(&config.output).await {
            Ok(digest) => Ok(Some(digest)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MgmtError::transient(self.meta.to_string(), e)),
        }
    }

    async fn converge_exists(&self, handle: &Arc<dyn Handle>, config: &ArchiveConfig, apply: bool) -> Result<bool, MgmtError> {
        let var_dir = handle.var_dir("archive");
        let input_sidecar = HashSidecar::input(&var_dir);
        let output_sidecar = HashSidecar::output(&var_dir);

        let input_digest = self.input_digest(config).await?;
        let output_digest = self.output_digest(config).await?;

        let converged = output_digest.is_some()
            && input_sidecar.matches(&input_digest).await.map_err(|e| MgmtError::transient(self.meta.to_string(), e))?
            && output_sidecar
                .matches(output_digest.as_deref().unwrap_or_default())
                .await
                .map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;

        if converged {
            return Ok(true);
        }
        if !apply {
            return Ok(false);
        }

        self.build_tar(config).await?;
        let output_digest = hash_file(&config.output).await.map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        input_sidecar.write(&input_digest).await.map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        output_sidecar.write(&output_digest).await.map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        handle.logf(&format!("rebuilt {} from {} inputs", config.output.display(), config.inputs.len()));
        Ok(false)
    }

    /// Stream every input into a fresh tar, writing to a temp path first
    /// so a failure never leaves a partial file at `config.output`.
    async fn build_tar(&self, config: &ArchiveConfig) -> Result<(), MgmtError> {
        let tmp = config.output.with_extension("mgmt-tmp");
        let inputs = config.inputs.clone();
        let tmp_for_build = tmp.clone();
        let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let file = std::fs::File::create(&tmp_for_build)?;
            let mut builder = tar::Builder::new(file);
            for input in &inputs {
                let name = input.strip_prefix("/").unwrap_or(input.as_path());
                let metadata = std::fs::metadata(input)?;
                if metadata.is_dir() {
                    builder.append_dir_all(name, input)?;
                } else {
                    builder.append_path_with_name(input, name)?;
                }
            }
            builder.into_inner()?.sync_all()
        })
        .await
        .map_err(|e| MgmtError::transient(self.meta.to_string(), std::io::Error::other(e)))?;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(MgmtError::transient(self.meta.to_string(), e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &config.output).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(MgmtError::transient(self.meta.to_string(), e));
        }
        Ok(())
    }

    async fn converge_absent(&self, config: &ArchiveConfig, apply: bool) -> Result<bool, MgmtError> {
        match tokio::fs::metadata(&config.output).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(MgmtError::transient(self.meta.to_string(), e)),
        }
        if !apply {
            return Ok(false);
        }
        tokio::fs::remove_file(&config.output).await.map_err(|e| MgmtError::transient(self.meta.to_string(), e))?;
        Ok(false)
    }
}

#[async_trait]
impl Resource for ArchiveResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), MgmtError> {
        let config = self.config.lock();
        if !config.output.is_absolute() {
            return Err(MgmtError::validation(self.meta.to_string(), "output must be an absolute path"));
        }
        match config.state {
            StateValue::Exists => {
                if config.inputs.is_empty() {
                    return Err(MgmtError::validation(self.meta.to_string(), "at least one input is required"));
                }
                for input in &config.inputs {
                    if !input.is_absolute() {
                        return Err(MgmtError::validation(self.meta.to_string(), "inputs must be absolute paths"));
                    }
                }
            }
            StateValue::Absent => {}
            other => return Err(MgmtError::validation(self.meta.to_string(), format!("unsupported state {other}"))),
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
        match config.state {
            StateValue::Absent => self.converge_absent(&config, apply).await,
            StateValue::Exists => self.converge_exists(&handle, &config, apply).await,
            other => Err(MgmtError::validation(self.meta.to_string(), format!("unsupported state {other}"))),
        }
    }

    async fn cleanup(&self) -> Result<(), MgmtError> {
        Ok(())
    }

    fn cmp(&self, other: &dyn Resource) -> Result<(), MgmtError> {
        let Some(other) = other.as_any().downcast_ref::<ArchiveResource>() else {
            return Err(MgmtError::inconsistency(self.meta.to_string(), "cmp against a different kind"));
        };
        if self.config.lock().output == other.config.lock().output {
            Ok(())
        } else {
            Err(MgmtError::inconsistency(self.meta.to_string(), "output path changed"))
        }
    }

    fn uids(&self) -> Vec<Uid> {
        vec![Uid::path(self.config.lock().output.clone())]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgmt_core::test_support::FakeHandle;

    async fn write_inputs(dir: &Path) -> Vec<PathBuf> {
        tokio::fs::write(dir.join("c.txt"), b"hello").await.unwrap();
        tokio::fs::create_dir(dir.join("b")).await.unwrap();
        tokio::fs::write(dir.join("b/d.txt"), b"world").await.unwrap();
        vec![dir.join("b"), dir.join("c.txt")]
    }

    #[tokio::test]
    async fn first_apply_builds_the_archive() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let inputs = write_inputs(src.path()).await;
        let output = out.path().join("out.tar");
        let resource = ArchiveResource::new(ArchiveConfig { inputs, output: output.clone(), state: StateValue::Exists });
        resource.init(FakeHandle::arc()).await.unwrap();
        let ctx = CancellationToken::new();

        let converged = resource.check_apply(&ctx, true).await.unwrap();
        assert!(!converged, "a build just happened, not already converged");
        assert!(tokio::fs::metadata(&output).await.is_ok());
    }

    #[tokio::test]
    async fn second_apply_performs_no_io() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let inputs = write_inputs(src.path()).await;
        let output = out.path().join("out.tar");
        let resource = ArchiveResource::new(ArchiveConfig { inputs, output: output.clone(), state: StateValue::Exists });
        resource.init(FakeHandle::arc()).await.unwrap();
        let ctx = CancellationToken::new();
        resource.check_apply(&ctx, true).await.unwrap();
        let before = tokio::fs::metadata(&output).await.unwrap().modified().unwrap();

        let converged = resource.check_apply(&ctx, true).await.unwrap();
        assert!(converged);
        let after = tokio::fs::metadata(&output).await.unwrap().modified().unwrap();
        assert_eq!(before, after, "second apply must not rewrite the output");
    }

    #[tokio::test]
    async fn input_change_triggers_a_rebuild() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let inputs = write_inputs(src.path()).await;
        let output = out.path().join("out.tar");
        let resource =
            ArchiveResource::new(ArchiveConfig { inputs: inputs.clone(), output: output.clone(), state: StateValue::Exists });
        resource.init(FakeHandle::arc()).await.unwrap();
        let ctx = CancellationToken::new();
        resource.check_apply(&ctx, true).await.unwrap();

        tokio::fs::write(src.path().join("c.txt"), b"changed").await.unwrap();
        let converged = resource.check_apply(&ctx, true).await.unwrap();
        assert!(!converged, "input content changed, must rebuild");
    }

    #[tokio::test]
    async fn dry_run_never_builds() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let inputs = write_inputs(src.path()).await;
        let output = out.path().join("out.tar");
        let resource = ArchiveResource::new(ArchiveConfig { inputs, output: output.clone(), state: StateValue::Exists });
        resource.init(FakeHandle::arc()).await.unwrap();
        let ctx = CancellationToken::new();
        assert!(!resource.check_apply(&ctx, false).await.unwrap());
        assert!(tokio::fs::metadata(&output).await.is_err());
    }

    #[tokio::test]
    async fn absent_removes_the_output() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let inputs = write_inputs(src.path()).await;
        let output = out.path().join("out.tar");
        let resource = ArchiveResource::new(ArchiveConfig { inputs, output: output.clone(), state: StateValue::Exists });
        resource.init(FakeHandle::arc()).await.unwrap();
        let ctx = CancellationToken::new();
        resource.check_apply(&ctx, true).await.unwrap();

        let resource =
            ArchiveResource::new(ArchiveConfig { inputs: vec![], output: output.clone(), state: StateValue::Absent });
        resource.init(FakeHandle::arc()).await.unwrap();
        assert!(!resource.check_apply(&ctx, true).await.unwrap());
        assert!(tokio::fs::metadata(&output).await.is_err());
    }

    #[test]
    fn validate_requires_at_least_one_input() {
        let resource =
            ArchiveResource::new(ArchiveConfig { inputs: vec![], output: PathBuf::from("/tmp/out.tar"), state: StateValue::Exists });
        assert!(resource.validate().is_err());
    }
}
