// SPDX-License-Identifier: MIT

//! The error taxonomy every resource and adapter reports through:
//! validation, precondition, transient, inconsistency, and cancellation.
//! The engine uses the variant to decide whether to restart `Watch`,
//! defer `CheckApply`, or treat a failure as terminal.

use thiserror::Error;

/// A typed error from a resource or adapter operation.
///
/// Each variant wraps the deepest cause plus a short context phrase —
/// one level of wrapping per function boundary, matching the rest of
/// the workspace's `thiserror` style.
#[derive(Debug, Error)]
pub enum MgmtError {
    /// Raised by `Validate`; fatal to the resource's load.
    #[error("validation failed for {resource}: {reason}")]
    Validation { resource: String, reason: String },

    /// Raised by `Init`/`Watch`/`CheckApply` when the environment forbids
    /// progress (missing supervisor, missing permission). Retried per event.
    #[error("precondition not met for {resource}: {reason}")]
    Precondition { resource: String, reason: String },

    /// Surfaced from the underlying I/O or RPC call. Retried.
    #[error("transient error in {resource}: {source}")]
    Transient {
        resource: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The observed state contradicts an invariant (e.g. two resources
    /// claiming the same unique external name).
    #[error("inconsistent state for {resource}: {reason}")]
    Inconsistency { resource: String, reason: String },

    /// Operation was aborted because its context was cancelled.
    /// Distinguished from `Transient` so the engine does not log it as a failure.
    #[error("{resource} cancelled")]
    Cancelled { resource: String },
}

impl MgmtError {
    pub fn validation(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation { resource: resource.into(), reason: reason.into() }
    }

    pub fn precondition(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Precondition { resource: resource.into(), reason: reason.into() }
    }

    pub fn transient(
        resource: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transient { resource: resource.into(), source: Box::new(source) }
    }

    pub fn inconsistency(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Inconsistency { resource: resource.into(), reason: reason.into() }
    }

    pub fn cancelled(resource: impl Into<String>) -> Self {
        Self::Cancelled { resource: resource.into() }
    }

    /// True for errors the engine should retry without alarming the user
    /// (precondition / transient); false for validation, inconsistency,
    /// and cancellation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Precondition { .. } | Self::Transient { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn precondition_and_transient_are_retryable() {
        assert!(MgmtError::precondition("svc[x]", "systemd not running").is_retryable());
        assert!(MgmtError::transient("svc[x]", io::Error::other("eagain")).is_retryable());
    }

    #[test]
    fn validation_and_inconsistency_are_not_retryable() {
        assert!(!MgmtError::validation("svc[x]", "bad state").is_retryable());
        assert!(!MgmtError::inconsistency("svc[x]", "duplicate name").is_retryable());
        assert!(!MgmtError::cancelled("svc[x]").is_retryable());
    }

    #[test]
    fn cancelled_is_distinguishable() {
        let e = MgmtError::cancelled("file[/a]");
        assert!(e.is_cancelled());
        assert!(!MgmtError::validation("file[/a]", "x").is_cancelled());
    }
}
