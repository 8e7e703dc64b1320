// SPDX-License-Identifier: MIT

//! The `firewall` resource: converges a set of `zone`-scoped ports
//! through the `Firewall` adapter.

use async_trait::async_trait;
use mgmt_core::{Firewall, FirewallError, Handle, MgmtError, Port, Resource, ResourceMeta, StateValue, Uid};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct FirewallConfig {
    pub zone: String,
    pub ports: Vec<Port>,
    /// `Exists` means every listed port is open; `Absent` means none are.
    pub state: StateValue,
}

pub struct FirewallResource {
    meta: ResourceMeta,
    firewall: Arc<dyn Firewall>,
    config: Mutex<FirewallConfig>,
    handle: Mutex<Option<Arc<dyn Handle>>>,
}

impl FirewallResource {
    pub fn new(firewall: Arc<dyn Firewall>, config: FirewallConfig) -> Self {
        let meta = ResourceMeta::new("firewall", config.zone.clone());
        Self { meta, firewall, config: Mutex::new(config), handle: Mutex::new(None) }
    }

    fn handle(&self) -> Result<Arc<dyn Handle>, MgmtError> {
        self.handle
            .lock()
            .clone()
            .ok_or_else(|| MgmtError::precondition(self.meta.to_string(), "not initialized"))
    }

    fn map_err(&self, e: FirewallError) -> MgmtError {
        match e {
            FirewallError::ConnectionFailed(reason) => MgmtError::precondition(self.meta.to_string(), reason),
            FirewallError::ZoneNotFound(reason) => MgmtError::precondition(self.meta.to_string(), reason),
            FirewallError::CallFailed(reason) => MgmtError::transient(self.meta.to_string(), FirewallCallError(reason)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct FirewallCallError(String);

#[async_trait]
impl Resource for FirewallResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), MgmtError> {
        let config = self.config.lock();
        if config.zone.is_empty() {
            return Err(MgmtError::validation(self.meta.to_string(), "zone must not be empty"));
        }
        match config.state {
            StateValue::Exists | StateValue::Absent => {}
            other => return Err(MgmtError::validation(self.meta.to_string(), format!("unsupported state {other}"))),
        }
        if config.state == StateValue::Exists && config.ports.is_empty() {
            return Err(MgmtError::validation(self.meta.to_string(), "at least one port is required"));
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

        let current: HashSet<Port> =
            self.firewall.get_ports(&config.zone).await.map_err(|e| self.map_err(e))?.into_iter().collect();
        let wanted: HashSet<Port> = config.ports.iter().cloned().collect();

        let missing: Vec<&Port> = match config.state {
            StateValue::Exists => wanted.difference(&current).collect(),
            StateValue::Absent => wanted.intersection(&current).collect(),
            other => return Err(MgmtError::validation(self.meta.to_string(), format!("unsupported state {other}"))),
        };

        if missing.is_empty() {
            return Ok(true);
        }
        if !apply {
            return Ok(false);
        }

        for port in &missing {
            match config.state {
                StateValue::Exists => self.firewall.add_port(&config.zone, port).await.map_err(|e| self.map_err(e))?,
                _ => self.firewall.remove_port(&config.zone, port).await.map_err(|e| self.map_err(e))?,
            }
        }
        self.firewall.reload().await.map_err(|e| self.map_err(e))?;
        handle.logf(&format!("{} {} port(s) in zone {}", missing.len(), config.state, config.zone));
        Ok(false)
    }

    async fn cleanup(&self) -> Result<(), MgmtError> {
        Ok(())
    }

    fn cmp(&self, other: &dyn Resource) -> Result<(), MgmtError> {
        let Some(other) = other.as_any().downcast_ref::<FirewallResource>() else {
            return Err(MgmtError::inconsistency(self.meta.to_string(), "cmp against a different kind"));
        };
        if self.config.lock().zone == other.config.lock().zone {
            Ok(())
        } else {
            Err(MgmtError::inconsistency(self.meta.to_string(), "zone changed"))
        }
    }

    fn uids(&self) -> Vec<Uid> {
        vec![Uid::name("firewall-zone", self.config.lock().zone.clone())]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
