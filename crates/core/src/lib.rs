// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mgmt-core: the resource runtime contract.
//!
//! This crate defines the framework every concrete resource (file,
//! service, mount, timer, archive, firewall, HTTP server, ...) is built
//! against: resource identity, the `Resource` trait and its capability
//! mix-ins, the `Handle` the engine hands to a resource, the external
//! adapter interfaces (`Supervisor`/`World`/`Firewall`/`Container`), and
//! the error taxonomy. It has no knowledge of any concrete resource or
//! adapter implementation — those live in `mgmt-adapters`,
//! `mgmt-storage`, `mgmt-engine`, and `mgmt-resources`.

pub mod macros;

pub mod adapters;
pub mod capability;
pub mod error;
pub mod handle;
pub mod meta;
pub mod resource;
pub mod secure_join;
pub mod uid;

pub use adapters::{
    Container, ContainerError, Firewall, FirewallError, Port, Supervisor, SupervisorError,
    UnitJobResult, World, WorldError, WorldFs,
};
pub use capability::{
    Collectable, Edgeable, Groupable, Interruptible, Recvable, Refreshable, Reversible, Sendable,
};
pub use error::MgmtError;
pub use handle::{Handle, RecvPort, Value};
pub use meta::ResourceMeta;
pub use resource::{Resource, StateValue};
pub use secure_join::secure_join;
pub use uid::{AutoEdgeCandidate, Uid};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
