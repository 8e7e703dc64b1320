// SPDX-License-Identifier: MIT

//! Engine-level errors, distinct from `MgmtError` (which a resource
//! reports about itself) — these describe the engine's own bookkeeping
//! failing: a cycle in the dependency graph, a duplicate identity, or a
//! resource task panicking.

use mgmt_core::Uid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("dependency cycle detected among: {0:?}")]
    Cycle(Vec<String>),

    #[error("duplicate resource uid: {0:?}")]
    DuplicateUid(Uid),

    #[error("resource task panicked: {0}")]
    TaskPanicked(String),

    #[error("resource reported error: {0}")]
    Resource(#[from] mgmt_core::MgmtError),
}
