// SPDX-License-Identifier: MIT

//! The supervisor RPC interface (systemd-DBus shaped). Resources that
//! manage systemd-style units (service, the cron/mount composites' owned
//! unit) talk to the local init system exclusively through this trait.

use async_trait::async_trait;
use thiserror::Error;

/// Terminal result of a supervisor job. Only `Done` is success;
/// everything else is surfaced to the caller so it can decide whether
/// the failure is a precondition, a transient condition, or an
/// inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitJobResult {
    Done,
    Canceled,
    Timeout,
    Failed,
    Dependency,
    Skipped,
}

impl UnitJobResult {
    pub fn is_success(self) -> bool {
        matches!(self, UnitJobResult::Done)
    }
}

crate::simple_display! {
    UnitJobResult {
        Done => "done",
        Canceled => "canceled",
        Timeout => "timeout",
        Failed => "failed",
        Dependency => "dependency",
        Skipped => "skipped",
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor connection failed: {0}")]
    ConnectionFailed(String),
    #[error("unit not found: {0}")]
    UnitNotFound(String),
    #[error("supervisor call failed: {0}")]
    CallFailed(String),
}

/// The local init/supervisor RPC surface (systemd-DBus shaped).
///
/// Implementations are expected to be cheap to clone (a thin handle
/// over a connection pool or a single shared bus connection), matching
/// the rest of the workspace's adapter-trait convention.
#[async_trait]
pub trait Supervisor: Send + Sync + 'static {
    /// Read a single string property off a unit (e.g. `ActiveState`).
    async fn get_unit_property(
        &self,
        unit: &str,
        property: &str,
    ) -> Result<Option<String>, SupervisorError>;

    async fn start_unit(&self, unit: &str) -> Result<UnitJobResult, SupervisorError>;

    async fn stop_unit(&self, unit: &str) -> Result<UnitJobResult, SupervisorError>;

    async fn reload_or_try_restart_unit(
        &self,
        unit: &str,
    ) -> Result<UnitJobResult, SupervisorError>;

    /// Re-read all unit files from disk (systemd's `daemon-reload`).
    /// Composite resources call this after rewriting an owned unit file,
    /// before starting or reloading it.
    async fn daemon_reload(&self) -> Result<(), SupervisorError>;

    /// Enable a unit so it starts on boot / is pulled in by its `WantedBy=` target.
    async fn enable_unit(&self, unit: &str) -> Result<(), SupervisorError>;

    /// Disable a unit.
    async fn disable_unit(&self, unit: &str) -> Result<(), SupervisorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_done_is_success() {
        assert!(UnitJobResult::Done.is_success());
        for r in [
            UnitJobResult::Canceled,
            UnitJobResult::Timeout,
            UnitJobResult::Failed,
            UnitJobResult::Dependency,
            UnitJobResult::Skipped,
        ] {
            assert!(!r.is_success());
        }
    }

    #[test]
    fn display_matches_closed_unit_result_set() {
        assert_eq!(UnitJobResult::Done.to_string(), "done");
        assert_eq!(UnitJobResult::Dependency.to_string(), "dependency");
    }
}
