// SPDX-License-Identifier: MIT

//! External-RPC boundary interfaces. These are the only surfaces a
//! resource uses to reach the outside world; concrete implementations
//! (and `Fake*` test doubles) live in `mgmt-adapters`, never here.

mod container;
mod firewall;
mod supervisor;
mod world;

pub use container::{Container, ContainerError};
pub use firewall::{Firewall, FirewallError, Port};
pub use supervisor::{Supervisor, SupervisorError, UnitJobResult};
pub use world::{World, WorldError, WorldFs};
