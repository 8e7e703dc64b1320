// SPDX-License-Identifier: MIT

//! The `Handle` the engine hands to every resource at `Init`. Concrete
//! implementations live in `mgmt-engine`; this crate only defines the
//! contract so `mgmt-resources` can depend on `mgmt-core` alone.

use crate::adapters::World;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

/// A value carried over a send/recv port. Kept as JSON so ports stay
/// generic across resource kinds without a shared value enum every
/// resource would need to agree on.
pub type Value = serde_json::Value;

/// A single inbound port value plus whether it changed since the last
/// `CheckApply`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecvPort {
    pub value: Value,
    pub changed: bool,
}

/// The engine-supplied object threaded through a resource's lifecycle.
///
/// `running()` and `event()` are async because both may need to hand
/// off to the engine's scheduler; `event()` may block until the
/// scheduler accepts it.
#[async_trait]
pub trait Handle: Send + Sync {
    /// Arm signal. Must be called exactly once by `Watch`, after
    /// observers are established and before the first `event()`.
    async fn running(&self);

    /// Divergence notification. Safe to call any number of times after
    /// `running()`; the engine coalesces multiple calls between
    /// `CheckApply` invocations.
    async fn event(&self);

    /// True iff an upstream resource signalled a refresh not yet
    /// consumed. Consulted inside `CheckApply`; consuming it (by
    /// returning without error) clears the bit.
    fn refresh(&self) -> bool;

    /// Publish output values keyed by named output port.
    fn send(&self, values: HashMap<String, Value>);

    /// Read values bound from upstream via a send→recv edge.
    fn recv(&self) -> HashMap<String, RecvPort>;

    /// Persistent, resource-scoped directory for hashes, caches, and
    /// tombstones. The engine guarantees a unique directory per
    /// `(Kind, Name)`.
    fn var_dir(&self, sub: &str) -> PathBuf;

    /// Access to externally maintained filesystems/state snapshots.
    fn world(&self) -> &dyn World;

    /// Structured log line at the resource's own scope.
    fn logf(&self, message: &str);

    fn debug(&self) -> bool;

    fn program(&self) -> &str;
    fn version(&self) -> &str;
    fn hostname(&self) -> &str;
}
