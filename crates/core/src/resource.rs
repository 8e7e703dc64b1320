// SPDX-License-Identifier: MIT

//! The `Resource` trait: the minimal contract every resource satisfies,
//! plus the capability-accessor pattern used in place of downcasting.

use crate::capability::{Collectable, Edgeable, Groupable, Interruptible, Recvable, Refreshable, Reversible, Sendable};
use crate::error::MgmtError;
use crate::handle::Handle;
use crate::meta::ResourceMeta;
use crate::uid::Uid;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The closed set of common "desired state" axis values. `Unmanaged` is
/// the empty value: "don't manage this axis".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StateValue {
    #[default]
    Unmanaged,
    Exists,
    Absent,
    Running,
    Stopped,
}

crate::simple_display! {
    StateValue {
        Unmanaged => "",
        Exists => "exists",
        Absent => "absent",
        Running => "running",
        Stopped => "stopped",
    }
}

/// The minimal contract every resource satisfies.
///
/// `Init`/`Watch`/`CheckApply`/`Cleanup` take `&self`, not `&mut self`:
/// the engine runs a resource's `Watch` and its `CheckApply` loop on
/// separate, concurrently-scheduled tasks sharing one `Arc<dyn
/// Resource>`, so there is no single owner left to hand out an
/// exclusive `&mut self` to either side. A resource that needs mutable
/// state across these calls holds it behind its own interior
/// mutability (a `parking_lot::Mutex` field, an atomic), the same way
/// `Handle` itself does. The one-time setup methods that run before a
/// resource enters that concurrent phase — `Groupable::absorb`,
/// `Collectable::collect` — still take `&mut self`, since at that point
/// the engine is still the sole owner of a `Box<dyn Resource>`.
///
/// Capability mix-ins are discovered through the `as_*` accessors,
/// never through downcasting the `Resource` trait object itself — only
/// `Groupable::absorb` needs to recover the concrete type of an
/// absorbed peer, and it does so through `into_any`, which is a
/// deliberate, narrow exception documented there.
#[async_trait]
pub trait Resource: Send + Sync {
    fn meta(&self) -> &ResourceMeta;

    /// Pure; fails fast with a human-readable reason. Called once per load.
    fn validate(&self) -> Result<(), MgmtError>;

    /// Bind to the engine, allocate long-lived state, initialize nested resources.
    async fn init(&self, handle: Arc<dyn Handle>) -> Result<(), MgmtError>;

    /// Long-running. Calls `handle.running()` exactly once after arming
    /// observers, then `handle.event()` whenever a divergence is
    /// possible. Returns when `ctx` is cancelled.
    async fn watch(&self, ctx: CancellationToken) -> Result<(), MgmtError>;

    /// Called at least once at start (`apply=true`), after each event,
    /// and after incoming refresh. Returns `(converged, err)`.
    async fn check_apply(&self, ctx: &CancellationToken, apply: bool) -> Result<bool, MgmtError>;

    /// Release resources; must tolerate being called when `Init` failed.
    async fn cleanup(&self) -> Result<(), MgmtError>;

    /// Invoked when a reload delivers a new config value for the same
    /// `(Kind, Name)`. `Err` means destroy-and-rebuild; `Ok(())` means
    /// the instance is re-used.
    fn cmp(&self, other: &dyn Resource) -> Result<(), MgmtError>;

    /// Opaque dependency-matching identity. Stable across the
    /// resource's lifetime; must not depend on observed external state.
    fn uids(&self) -> Vec<Uid>;

    /// Narrow, documented exception to "no downcasting": lets
    /// `Groupable::absorb` recover an absorbed child's concrete type.
    /// Never used for capability discovery.
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn as_edgeable(&self) -> Option<&dyn Edgeable> {
        None
    }
    fn as_groupable(&self) -> Option<&dyn Groupable> {
        None
    }
    fn as_groupable_mut(&mut self) -> Option<&mut dyn Groupable> {
        None
    }
    fn as_refreshable(&self) -> Option<&dyn Refreshable> {
        None
    }
    fn as_recvable(&self) -> Option<&dyn Recvable> {
        None
    }
    fn as_sendable(&self) -> Option<&dyn Sendable> {
        None
    }
    fn as_reversible(&self) -> Option<&dyn Reversible> {
        None
    }
    fn as_collectable_mut(&mut self) -> Option<&mut dyn Collectable> {
        None
    }
    fn as_interruptible(&self) -> Option<&dyn Interruptible> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_value_default_is_unmanaged() {
        assert_eq!(StateValue::default(), StateValue::Unmanaged);
        assert_eq!(StateValue::Unmanaged.to_string(), "");
        assert_eq!(StateValue::Exists.to_string(), "exists");
    }
}
