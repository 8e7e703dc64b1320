// SPDX-License-Identifier: MIT

//! The `cron` resource: a composite owning a generated `.timer` unit
//! file and the timer unit itself, reusing `file` and `svc`.

use crate::file::{FileConfig, FileContent, FileResource};
use crate::reload::DaemonReload;
use crate::svc::{ServiceConfig, ServiceResource};
use crate::unit_file::{render_unit, UnitSection};
use async_trait::async_trait;
use mgmt_core::{Handle, MgmtError, Resource, ResourceMeta, StateValue, Supervisor, Uid};
use mgmt_engine::composite::{Composite, NestedResource};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CronConfig {
    pub name: String,
    /// Only `Exists` and `Absent` are meaningful.
    pub state: StateValue,
    /// The `[Timer]` key, e.g. `"OnCalendar"` or `"OnBootSec"`.
    pub trigger: String,
    /// The value for `trigger`, e.g. `"*-*-* 03:00:00"`.
    pub schedule: String,
}

fn render_cron_unit(program: &str, name: &str, config: &CronConfig) -> String {
    render_unit(
        program,
        name,
        &[
            UnitSection::new("Unit", vec![("Description".to_string(), format!("Timer for {}", config.name))]),
            UnitSection::new("Timer", vec![(config.trigger.clone(), config.schedule.clone())]),
            UnitSection::new("Install", vec![("WantedBy".to_string(), "timers.target".to_string())]),
        ],
    )
}

pub struct CronResource {
    meta: ResourceMeta,
    composite: Composite,
}

impl CronResource {
    /// `unit_dir` is where the generated `.timer` file is written;
    /// production callers pass [`crate::unit_file::DEFAULT_UNIT_DIR`],
    /// tests pass a scratch directory.
    pub fn new(program: &str, unit_dir: &Path, supervisor: Arc<dyn Supervisor>, config: CronConfig) -> Self {
        let meta = ResourceMeta::new("cron", config.name.clone());
        let unit = format!("{}.timer", config.name);
        let unit_path = unit_dir.join(&unit);
        let unit_content = render_cron_unit(program, &meta.to_string(), &config);

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
            ServiceConfig {
                unit: unit.clone(),
                state: service_state,
                enabled: config.state != StateValue::Absent,
                unit_file: Some(unit_path),
            },
        );

        let reload =
            DaemonReload { meta: ResourceMeta::new("cron", format!("{}:reload", config.name)), supervisor };
        let composite = Composite::new(vec![
            NestedResource::with_side_effect(Box::new(file), Box::new(reload)),
            NestedResource::new(Box::new(service)),
        ]);

        Self { meta, composite }
    }
}

#[async_trait]
impl Resource for CronResource {
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
        let Some(other) = other.as_any().downcast_ref::<CronResource>() else {
            return Err(MgmtError::inconsistency(self.meta.to_string(), "cmp against a different kind"));
        };
        if self.meta.name == other.meta.name {
            Ok(())
        } else {
            Err(MgmtError::inconsistency(self.meta.to_string(), "timer name changed"))
        }
    }

    fn uids(&self) -> Vec<Uid> {
        vec![Uid::unit(format!("{}.timer", self.meta.name))]
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

    fn config(name: &str, state: StateValue) -> CronConfig {
        CronConfig {
            name: name.to_string(),
            state,
            trigger: "OnCalendar".to_string(),
            schedule: "*-*-* 03:00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn converges_to_a_unit_file_and_an_active_timer() {
        let unit_dir = tempfile::tempdir().unwrap();
        let sup = FakeSupervisor::new();
        let resource =
            CronResource::new("mgmtd", unit_dir.path(), Arc::new(sup.clone()), config("nightly", StateValue::Exists));
        resource.init(FakeHandle::arc()).await.unwrap();
        let ctx = CancellationToken::new();

        while !resource.check_apply(&ctx, true).await.unwrap() {}

        assert!(sup.is_active("nightly.timer"));
        assert!(sup.is_enabled("nightly.timer"));
        assert_eq!(sup.daemon_reload_count(), 1);

        let content = tokio::fs::read_to_string(unit_dir.path().join("nightly.timer")).await.unwrap();
        assert!(content.contains("[Timer]\nOnCalendar=*-*-* 03:00:00\n"));
        assert!(content.contains("WantedBy=timers.target"));

        assert!(resource.check_apply(&ctx, true).await.unwrap(), "second check_apply converges with no I/O");
    }

    #[tokio::test]
    async fn absent_removes_the_timer_unit() {
        let unit_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(unit_dir.path().join("nightly.timer"), b"stale").await.unwrap();
        let sup = FakeSupervisor::new();
        sup.start_unit("nightly.timer").await.unwrap();
        let resource =
            CronResource::new("mgmtd", unit_dir.path(), Arc::new(sup.clone()), config("nightly", StateValue::Absent));
        resource.init(FakeHandle::arc()).await.unwrap();
        let ctx = CancellationToken::new();

        while !resource.check_apply(&ctx, true).await.unwrap() {}

        assert!(!sup.is_active("nightly.timer"));
        assert!(tokio::fs::metadata(unit_dir.path().join("nightly.timer")).await.is_err());
    }
}
