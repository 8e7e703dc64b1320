// SPDX-License-Identifier: MIT

//! The `mount` resource: a composite owning a generated `.mount` unit
//! file and the corresponding mount-unit service, reusing `file` and
//! `svc` rather than talking to the supervisor directly.

use crate::file::{FileConfig, FileContent, FileResource};
use crate::reload::DaemonReload;
use crate::svc::{ServiceConfig, ServiceResource};
use crate::unit_file::{mount_unit_name, render_unit, UnitSection};
use async_trait::async_trait;
use mgmt_core::{Handle, MgmtError, Resource, ResourceMeta, StateValue, Supervisor, Uid};
use mgmt_engine::composite::{Composite, NestedResource};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct MountConfig {
    /// What gets mounted: a device path, UUID= spec, or remote share.
    pub what: String,
    /// Where it gets mounted.
    pub where_: PathBuf,
    pub fstype: String,
    pub options: Vec<String>,
    /// Only `Exists` (mounted) and `Absent` (unmounted) are meaningful.
    pub state: StateValue,
}

fn render_mount_unit(program: &str, name: &str, config: &MountConfig) -> String {
    let mut mount_entries = vec![
        ("What".to_string(), config.what.clone()),
        ("Where".to_string(), config.where_.display().to_string()),
        ("Type".to_string(), config.fstype.clone()),
    ];
    if !config.options.is_empty() {
        mount_entries.push(("Options".to_string(), config.options.join(",")));
    }
    render_unit(
        program,
        name,
        &[
            UnitSection::new("Unit", vec![("Description".to_string(), format!("Mount for {name}"))]),
            UnitSection::new("Mount", mount_entries),
            UnitSection::new("Install", vec![("WantedBy".to_string(), "multi-user.target".to_string())]),
        ],
    )
}

pub struct MountResource {
    meta: ResourceMeta,
    composite: Composite,
}

impl MountResource {
    /// `unit_dir` is where the generated `.mount` file is written;
    /// production callers pass [`crate::unit_file::DEFAULT_UNIT_DIR`],
    /// tests pass a scratch directory.
    pub fn new(program: &str, unit_dir: &Path, supervisor: Arc<dyn Supervisor>, config: MountConfig) -> Self {
        let name = config.where_.display().to_string();
        let meta = ResourceMeta::new("mount", name.clone());
        let unit = mount_unit_name(&config.where_);
        let unit_path = unit_dir.join(&unit);
        let unit_content = render_mount_unit(program, &meta.to_string(), &config);

        let file_state = match config.state {
            StateValue::Absent => StateValue::Absent,
            _ => StateValue::Exists,
        };
        let file = FileResource::new(FileConfig {
            path: unit_path.clone(),
            state: file_state,
            content: if file_state == StateValue::Exists {
                Some(FileContent::Inline(unit_content.into_bytes()))
            } else {
                None
            },
            mode: Some(0o644),
        });
        let service_state = match config.state {
            StateValue::Absent => StateValue::Stopped,
            _ => StateValue::Running,
        };
        let service = ServiceResource::new(
            supervisor.clone(),
            ServiceConfig { unit: unit.clone(), state: service_state, enabled: config.state != StateValue::Absent, unit_file: Some(unit_path) },
        );

        let reload = DaemonReload { meta: ResourceMeta::new("mount", format!("{name}:reload")), supervisor };
        let composite = Composite::new(vec![
            NestedResource::with_side_effect(Box::new(file), Box::new(reload)),
            NestedResource::new(Box::new(service)),
        ]);

        Self { meta, composite }
    }
}

#[async_trait]
impl Resource for MountResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), MgmtError> {
        self.composite.validate()
    }

    async fn init(&self, handle: Arc<dyn Handle>) -> Result<(), MgmtError> {
        self.composite.init(handle).await
    }

    async fn watch(&self, ctx: CancellationToken) -> Result<(), MgmtError> {
        self.composite.watch(ctx).await
    }

    async fn check_apply(&self, ctx: &CancellationToken, apply: bool) -> Result<bool, MgmtError> {
        self.composite.check_apply(ctx, apply).await
    }

    async fn cleanup(&self) -> Result<(), MgmtError> {
        self.composite.cleanup().await
    }

    fn cmp(&self, other: &dyn Resource) -> Result<(), MgmtError> {
        let Some(other) = other.as_any().downcast_ref::<MountResource>() else {
            return Err(MgmtError::inconsistency(self.meta.to_string(), "cmp against a different kind"));
        };
        if self.meta.name == other.meta.name {
            Ok(())
        } else {
            Err(MgmtError::inconsistency(self.meta.to_string(), "mount point changed"))
        }
    }

    fn uids(&self) -> Vec<Uid> {
        vec![Uid::path(self.meta.name.clone())]
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
    use mgmt_adapters::FakeSupervisor;
    use mgmt_core::test_support::FakeHandle;

    fn config(where_: &str, state: StateValue) -> MountConfig {
        MountConfig {
            what: "/dev/sdb1".to_string(),
            where_: PathBuf::from(where_),
            fstype: "ext4".to_string(),
            options: vec!["noatime".to_string()],
            state,
        }
    }

    #[tokio::test]
    async fn first_apply_writes_unit_and_starts_mount() {
        let unit_dir = tempfile::tempdir().unwrap();
        let sup = FakeSupervisor::new();
        let resource = MountResource::new(
            "mgmtd",
            unit_dir.path(),
            Arc::new(sup.clone()),
            config("/mnt/data", StateValue::Exists),
        );
        let handle = FakeHandle::arc();
        resource.init(handle).await.unwrap();
        let ctx = CancellationToken::new();

        let converged = resource.check_apply(&ctx, true).await.unwrap();
        assert!(!converged, "the unit file step just wrote, composite must report not-yet-converged");

        let converged = resource.check_apply(&ctx, true).await.unwrap();
        assert!(!converged, "the service step still needs to start");

        let converged = resource.check_apply(&ctx, true).await.unwrap();
        assert!(converged, "third pass: unit file and service both settled");
        assert!(sup.is_active("mnt-data.mount"));
        assert_eq!(sup.daemon_reload_count(), 1);

        let content = tokio::fs::read_to_string(unit_dir.path().join("mnt-data.mount")).await.unwrap();
        assert!(content.contains("What=/dev/sdb1"));
        assert!(content.contains("Where=/mnt/data"));
        assert!(content.contains("Options=noatime"));
    }

    #[tokio::test]
    async fn absent_stops_the_mount_and_removes_the_unit() {
        let unit_dir = tempfile::tempdir().unwrap();
        let sup = FakeSupervisor::new();
        sup.start_unit("mnt-data.mount").await.unwrap();
        let resource = MountResource::new(
            "mgmtd",
            unit_dir.path(),
            Arc::new(sup.clone()),
            config("/mnt/data", StateValue::Absent),
        );
        resource.init(FakeHandle::arc()).await.unwrap();
        let ctx = CancellationToken::new();
        while !resource.check_apply(&ctx, true).await.unwrap() {}
        assert!(!sup.is_active("mnt-data.mount"));
        assert!(tokio::fs::metadata(unit_dir.path().join("mnt-data.mount")).await.is_err());
    }
}
