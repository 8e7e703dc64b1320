// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Concrete implementations of the `mgmt-core` adapter traits, plus their
//! `Fake*` test doubles. Every real adapter here shells out to a CLI
//! tool rather than linking a native client library, matching the
//! rest of the workspace's "spawn the platform tool, parse its output"
//! convention for talking to local system daemons.

pub mod container;
pub mod firewall;
pub mod supervisor;
pub mod world;

pub use container::DockerContainer;
pub use firewall::FirewalldFirewall;
pub use supervisor::SystemdSupervisor;
pub use world::LocalWorld;

#[cfg(any(test, feature = "test-support"))]
pub use container::FakeContainer;
#[cfg(any(test, feature = "test-support"))]
pub use firewall::FakeFirewall;
#[cfg(any(test, feature = "test-support"))]
pub use supervisor::FakeSupervisor;
#[cfg(any(test, feature = "test-support"))]
pub use world::FakeWorld;
