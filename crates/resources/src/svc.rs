// SPDX-License-Identifier: MIT

//! The `svc` resource: converges a systemd-style unit's running state
//! and enablement through the `Supervisor` adapter.

use async_trait::async_trait;
use mgmt_core::{
    AutoEdgeCandidate, AutoEdgeIter, Edgeable, Handle, MgmtError, Resource, ResourceMeta,
    StateValue, Supervisor, SupervisorError, Uid, UnitJobResult,
};
use parking_lot::Mutex;
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// The unit name, e.g. `"nginx.service"`.
    pub unit: String,
    /// Only `Running` and `Stopped` are meaningful for this kind.
    pub state: StateValue,
    pub enabled: bool,
    /// Path of the unit file this service depends on, if one is managed
    /// alongside it (e.g. by a composite `mount`/`cron` resource, or a
    /// plain `file` resource in the same config).
    pub unit_file: Option<PathBuf>,
}

pub struct ServiceResource {
    meta: ResourceMeta,
    supervisor: Arc<dyn Supervisor>,
    config: Mutex<ServiceConfig>,
    handle: Mutex<Option<Arc<dyn Handle>>>,
}

impl ServiceResource {
    pub fn new(supervisor: Arc<dyn Supervisor>, config: ServiceConfig) -> Self {
        let meta = ResourceMeta::new("svc", config.unit.clone());
        Self { meta, supervisor, config: Mutex::new(config), handle: Mutex::new(None) }
    }

    fn handle(&self) -> Result<Arc<dyn Handle>, MgmtError> {
        self.handle
            .lock()
            .clone()
            .ok_or_else(|| MgmtError::precondition(self.meta.to_string(), "not initialized"))
    }

    fn map_job(&self, result: UnitJobResult) -> Result<(), MgmtError> {
        if result.is_success() {
            Ok(())
        } else {
            Err(MgmtError::precondition(self.meta.to_string(), format!("unit job returned {result}")))
        }
    }

    fn map_err(&self, e: SupervisorError) -> MgmtError {
        match e {
            SupervisorError::ConnectionFailed(reason) => MgmtError::precondition(self.meta.to_string(), reason),
            SupervisorError::UnitNotFound(reason) => MgmtError::precondition(self.meta.to_string(), reason),
            SupervisorError::CallFailed(reason) => MgmtError::transient(self.meta.to_string(), SupervisorCallError(reason)),
        }
    }

    async fn is_active(&self, unit: &str) -> Result<bool, MgmtError> {
        let state = self
            .supervisor
            .get_unit_property(unit, "ActiveState")
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(state.as_deref() == Some("active"))
    }

    async fn is_enabled(&self, unit: &str) -> Result<bool, MgmtError> {
        let state = self
            .supervisor
            .get_unit_property(unit, "UnitFileState")
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(state.as_deref() == Some("enabled"))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct SupervisorCallError(String);

#[async_trait]
impl Resource for ServiceResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), MgmtError> {
        let config = self.config.lock();
        if config.unit.is_empty() {
            return Err(MgmtError::validation(self.meta.to_string(), "unit name must not be empty"));
        }
        match config.state {
            StateValue::Running | StateValue::Stopped => Ok(()),
            other => Err(MgmtError::validation(self.meta.to_string(), format!("unsupported state {other}"))),
        }
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

        if handle.refresh() && apply {
            self.map_job(
                self.supervisor
                    .reload_or_try_restart_unit(&config.unit)
                    .await
                    .map_err(|e| self.map_err(e))?,
            )?;
            handle.logf("reloaded on upstream refresh");
        }

        let active = self.is_active(&config.unit).await?;
        let enabled = self.is_enabled(&config.unit).await?;
        let wants_running = config.state == StateValue::Running;

        let converged = active == wants_running && enabled == config.enabled;
        if converged || !apply {
            return Ok(converged);
        }

        if config.enabled != enabled {
            if config.enabled {
                self.supervisor.enable_unit(&config.unit).await.map_err(|e| self.map_err(e))?;
            } else {
                self.supervisor.disable_unit(&config.unit).await.map_err(|e| self.map_err(e))?;
            }
        }
        if wants_running != active {
            let result = if wants_running {
                self.supervisor.start_unit(&config.unit).await.map_err(|e| self.map_err(e))?
            } else {
                self.supervisor.stop_unit(&config.unit).await.map_err(|e| self.map_err(e))?
            };
            self.map_job(result)?;
        }
        handle.logf(&format!("converged to {}", config.state));
        Ok(false)
    }

    async fn cleanup(&self) -> Result<(), MgmtError> {
        Ok(())
    }

    fn cmp(&self, other: &dyn Resource) -> Result<(), MgmtError> {
        let Some(other) = other.as_any().downcast_ref::<ServiceResource>() else {
            return Err(MgmtError::inconsistency(self.meta.to_string(), "cmp against a different kind"));
        };
        if self.config.lock().unit == other.config.lock().unit {
            Ok(())
        } else {
            Err(MgmtError::inconsistency(self.meta.to_string(), "unit name changed"))
        }
    }

    fn uids(&self) -> Vec<Uid> {
        vec![Uid::unit(self.config.lock().unit.clone())]
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
}

struct ServiceEdges {
    unit_file: Option<PathBuf>,
    timer: Option<String>,
}

impl AutoEdgeIter for ServiceEdges {
    fn next(&mut self) -> Option<AutoEdgeCandidate> {
        if let Some(path) = self.unit_file.take() {
            return Some(AutoEdgeCandidate::new(Uid::path(path)));
        }
        if let Some(timer) = self.timer.take() {
            return Some(AutoEdgeCandidate::new(Uid::unit(timer)));
        }
        None
    }

    fn test(&mut self, _matched: &[Uid]) -> bool {
        true
    }
}

impl Edgeable for ServiceResource {
    fn auto_edges(&self) -> Box<dyn AutoEdgeIter + '_> {
        let config = self.config.lock();
        let timer = config.unit.strip_suffix(".service").map(|stem| format!("{stem}.timer"));
        Box::new(ServiceEdges { unit_file: config.unit_file.clone(), timer })
    }
}
