// SPDX-License-Identifier: MIT

//! The composite side effect shared by `mount` and `cron`: tell the
//! supervisor to re-read unit files after the owned unit file changed,
//! per the "(1) sync file; (2) if changed, daemon-reload; (3) sync
//! service" sequencing rule.

use async_trait::async_trait;
use mgmt_core::{MgmtError, ResourceMeta, Supervisor};
use mgmt_engine::composite::CompositeSideEffect;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct DaemonReload {
    pub meta: ResourceMeta,
    pub supervisor: Arc<dyn Supervisor>,
}

#[async_trait]
impl CompositeSideEffect for DaemonReload {
    async fn run(&self, _ctx: &CancellationToken) -> Result<(), MgmtError> {
        self.supervisor
            .daemon_reload()
            .await
            .map_err(|e| MgmtError::transient(self.meta.to_string(), e))
    }
}
