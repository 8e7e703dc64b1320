// SPDX-License-Identifier: MIT

//! Capability traits — optional mix-ins a resource advertises by
//! overriding the matching `Resource::as_*` accessor. The engine
//! queries these purely through the accessor methods and never
//! attempts to recover a resource's concrete type from them.

use crate::error::MgmtError;
use crate::resource::Resource;
use crate::uid::{AutoEdgeCandidate, Uid};

/// Iterator over auto-edge candidates. Shaped as a `next`/`test` pair
/// rather than plain `Iterator` because the engine must feed back which
/// candidates matched before the resource decides whether to continue
/// (e.g. a file at `/a/b/c` stops walking up the tree once it hits the
/// nearest already-managed ancestor).
pub trait AutoEdgeIter: Send {
    fn next(&mut self) -> Option<AutoEdgeCandidate>;

    /// Called after each `next()` with the UIDs (if any) that matched
    /// the candidate just yielded. Returns `true` to keep iterating,
    /// `false` to stop early.
    fn test(&mut self, matched: &[Uid]) -> bool;
}

/// A resource that can propose dependency edges to other resources by UID.
pub trait Edgeable {
    fn auto_edges(&self) -> Box<dyn AutoEdgeIter + '_>;
}

/// A resource that can absorb a compatible peer into itself, folding it
/// out of the scheduler's DAG. Distinct from the narrower server-family
/// absorption in `mgmt-resources::http`, which absorbs a
/// specifically-typed child rather than an arbitrary `Resource`.
pub trait Groupable {
    /// May `other` be absorbed into `self`? Asymmetric by design:
    /// `A.group_cmp(B) == Ok(())` does not imply `B.group_cmp(A) == Ok(())`.
    fn group_cmp(&self, other: &dyn Resource) -> Result<(), MgmtError>;

    /// Take ownership of an absorbed peer. Called by the engine's
    /// auto-group pass exactly once per successful `group_cmp`, in
    /// discovery order.
    fn absorb(&mut self, child: Box<dyn Resource>) -> Result<(), MgmtError>;
}

/// A resource that reacts to upstream refresh pulses. The pulse itself
/// is read via `handle.refresh()`; this hook lets the resource
/// invalidate any cached state (e.g. a stored content hash) before
/// `CheckApply` runs. Takes `&self`, like the rest of the concurrent
/// lifecycle methods — the cached state it invalidates lives behind
/// the resource's own interior mutability.
pub trait Refreshable {
    fn on_refresh(&self);
}

/// A resource that consumes values from upstream send ports.
pub trait Recvable {
    /// Names of the input ports this resource declares.
    fn recv_ports(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// A resource that publishes values to downstream recv ports.
pub trait Sendable {
    /// Names of the output ports this resource declares.
    fn send_ports(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// A resource that can synthesize a counter-resource undoing its effect.
pub trait Reversible {
    fn reverse(&self) -> Result<Box<dyn Resource>, MgmtError>;
}

/// A resource that accepts a name-pattern at bind time, refining its
/// configuration before `Init`.
pub trait Collectable {
    fn collect(&mut self, pattern: &str) -> Result<(), MgmtError>;
}

/// A resource that can be asked to abandon in-flight work promptly,
/// stronger than context cancellation.
pub trait Interruptible {
    fn interrupt(&self);
}
