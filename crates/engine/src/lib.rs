// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The reconciliation engine: turns a set of boxed `Resource`s into a
//! running, self-healing graph. Builds the dependency DAG (explicit
//! UIDs plus auto-edge inference), runs the auto-group pass, then drives
//! each resource's `Watch`/`CheckApply` lifecycle with backoff and
//! cancellation.

pub mod backoff;
pub mod bus;
pub mod composite;
pub mod engine;
pub mod error;
pub mod graph;
pub mod handle;
pub mod reconcile;

pub use backoff::Backoff;
pub use composite::{Composite, NestedResource};
pub use engine::{resource_uid, Engine, EngineConfig, ResourceSpec};
pub use error::EngineError;
pub use graph::{auto_group, build_graph, resolve_auto_edges, DependencyGraph};
pub use handle::EngineHandle;
pub use reconcile::{DependencyBarrier, ReconcileOutcome};
