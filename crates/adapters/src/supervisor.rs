// SPDX-License-Identifier: MIT

//! systemd-backed `Supervisor`, driven through the `systemctl` CLI rather
//! than a DBus client library.

use async_trait::async_trait;
use mgmt_core::{Supervisor, SupervisorError, UnitJobResult};
use tokio::process::Command;

/// Talks to the local systemd instance via `systemctl`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemdSupervisor;

impl SystemdSupervisor {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<String, SupervisorError> {
        let output = Command::new("systemctl")
            .args(args)
            .output()
            .await
            .map_err(|e| SupervisorError::ConnectionFailed(e.to_string()))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(SupervisorError::CallFailed(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }

    fn job_result_from_exit(stderr: &str) -> UnitJobResult {
        if stderr.contains("not found") {
            UnitJobResult::Dependency
        } else if stderr.contains("timeout") {
            UnitJobResult::Timeout
        } else {
            UnitJobResult::Failed
        }
    }
}

#[async_trait]
impl Supervisor for SystemdSupervisor {
    async fn get_unit_property(
        &self,
        unit: &str,
        property: &str,
    ) -> Result<Option<String>, SupervisorError> {
        let out = self.run(&["show", unit, "--property", property, "--value"]).await?;
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }

    async fn start_unit(&self, unit: &str) -> Result<UnitJobResult, SupervisorError> {
        match self.run(&["start", unit]).await {
            Ok(_) => Ok(UnitJobResult::Done),
            Err(SupervisorError::CallFailed(stderr)) => Ok(Self::job_result_from_exit(&stderr)),
            Err(e) => Err(e),
        }
    }

    async fn stop_unit(&self, unit: &str) -> Result<UnitJobResult, SupervisorError> {
        match self.run(&["stop", unit]).await {
            Ok(_) => Ok(UnitJobResult::Done),
            Err(SupervisorError::CallFailed(stderr)) => Ok(Self::job_result_from_exit(&stderr)),
            Err(e) => Err(e),
        }
    }

    async fn reload_or_try_restart_unit(
        &self,
        unit: &str,
    ) -> Result<UnitJobResult, SupervisorError> {
        match self.run(&["reload-or-try-restart", unit]).await {
            Ok(_) => Ok(UnitJobResult::Done),
            Err(SupervisorError::CallFailed(stderr)) => Ok(Self::job_result_from_exit(&stderr)),
            Err(e) => Err(e),
        }
    }

    async fn daemon_reload(&self) -> Result<(), SupervisorError> {
        self.run(&["daemon-reload"]).await.map(|_| ())
    }

    async fn enable_unit(&self, unit: &str) -> Result<(), SupervisorError> {
        self.run(&["enable", unit]).await.map(|_| ())
    }

    async fn disable_unit(&self, unit: &str) -> Result<(), SupervisorError> {
        self.run(&["disable", unit]).await.map(|_| ())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    struct UnitState {
        properties: HashMap<String, String>,
        active: bool,
        enabled: bool,
    }

    #[derive(Default)]
    struct Inner {
        units: HashMap<String, UnitState>,
        daemon_reloads: u32,
        start_calls: Vec<String>,
        stop_calls: Vec<String>,
        reload_calls: Vec<String>,
    }

    /// In-memory `Supervisor` double. Units default to present, inactive,
    /// and disabled until seeded or acted on.
    #[derive(Clone, Default)]
    pub struct FakeSupervisor {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeSupervisor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_property(&self, unit: &str, property: &str, value: &str) {
            let mut inner = self.inner.lock();
            inner
                .units
                .entry(unit.to_string())
                .or_default()
                .properties
                .insert(property.to_string(), value.to_string());
        }

        pub fn is_active(&self, unit: &str) -> bool {
            self.inner.lock().units.get(unit).map(|u| u.active).unwrap_or(false)
        }

        pub fn is_enabled(&self, unit: &str) -> bool {
            self.inner.lock().units.get(unit).map(|u| u.enabled).unwrap_or(false)
        }

        pub fn daemon_reload_count(&self) -> u32 {
            self.inner.lock().daemon_reloads
        }

        pub fn start_calls(&self) -> Vec<String> {
            self.inner.lock().start_calls.clone()
        }

        pub fn reload_calls(&self) -> Vec<String> {
            self.inner.lock().reload_calls.clone()
        }
    }

    #[async_trait]
    impl Supervisor for FakeSupervisor {
        async fn get_unit_property(
            &self,
            unit: &str,
            property: &str,
        ) -> Result<Option<String>, SupervisorError> {
            Ok(self.inner.lock().units.get(unit).and_then(|u| u.properties.get(property).cloned()))
        }

        async fn start_unit(&self, unit: &str) -> Result<UnitJobResult, SupervisorError> {
            let mut inner = self.inner.lock();
            inner.start_calls.push(unit.to_string());
            inner.units.entry(unit.to_string()).or_default().active = true;
            Ok(UnitJobResult::Done)
        }

        async fn stop_unit(&self, unit: &str) -> Result<UnitJobResult, SupervisorError> {
            let mut inner = self.inner.lock();
            inner.stop_calls.push(unit.to_string());
            inner.units.entry(unit.to_string()).or_default().active = false;
            Ok(UnitJobResult::Done)
        }

        async fn reload_or_try_restart_unit(
            &self,
            unit: &str,
        ) -> Result<UnitJobResult, SupervisorError> {
            let mut inner = self.inner.lock();
            inner.reload_calls.push(unit.to_string());
            inner.units.entry(unit.to_string()).or_default().active = true;
            Ok(UnitJobResult::Done)
        }

        async fn daemon_reload(&self) -> Result<(), SupervisorError> {
            self.inner.lock().daemon_reloads += 1;
            Ok(())
        }

        async fn enable_unit(&self, unit: &str) -> Result<(), SupervisorError> {
            self.inner.lock().units.entry(unit.to_string()).or_default().enabled = true;
            Ok(())
        }

        async fn disable_unit(&self, unit: &str) -> Result<(), SupervisorError> {
            self.inner.lock().units.entry(unit.to_string()).or_default().enabled = false;
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSupervisor;

#[cfg(test)]
mod tests {
    use super::fake::FakeSupervisor;
    use mgmt_core::Supervisor;

    #[tokio::test]
    async fn start_unit_marks_it_active() {
        let sup = FakeSupervisor::new();
        sup.start_unit("nginx.service").await.unwrap();
        assert!(sup.is_active("nginx.service"));
    }

    #[tokio::test]
    async fn stop_unit_marks_it_inactive() {
        let sup = FakeSupervisor::new();
        sup.start_unit("nginx.service").await.unwrap();
        sup.stop_unit("nginx.service").await.unwrap();
        assert!(!sup.is_active("nginx.service"));
    }

    #[tokio::test]
    async fn daemon_reload_is_counted() {
        let sup = FakeSupervisor::new();
        sup.daemon_reload().await.unwrap();
        sup.daemon_reload().await.unwrap();
        assert_eq!(sup.daemon_reload_count(), 2);
    }

    #[tokio::test]
    async fn enable_then_disable_round_trips() {
        let sup = FakeSupervisor::new();
        sup.enable_unit("nightly.timer").await.unwrap();
        assert!(sup.is_enabled("nightly.timer"));
        sup.disable_unit("nightly.timer").await.unwrap();
        assert!(!sup.is_enabled("nightly.timer"));
    }
}
