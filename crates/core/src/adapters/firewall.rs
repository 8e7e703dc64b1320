// SPDX-License-Identifier: MIT

//! The firewall RPC interface (firewalld-DBus shaped), used by the
//! `firewall` resource.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("firewalld connection failed: {0}")]
    ConnectionFailed(String),
    #[error("zone not found: {0}")]
    ZoneNotFound(String),
    #[error("firewall call failed: {0}")]
    CallFailed(String),
}

/// A `port/proto` pair, e.g. `"4280/tcp"`.
pub type Port = String;

#[async_trait]
pub trait Firewall: Send + Sync + 'static {
    async fn get_ports(&self, zone: &str) -> Result<Vec<Port>, FirewallError>;
    async fn add_port(&self, zone: &str, port: &Port) -> Result<(), FirewallError>;
    async fn remove_port(&self, zone: &str, port: &Port) -> Result<(), FirewallError>;
    /// Make the running configuration permanent (firewalld's `--permanent` + reload).
    async fn reload(&self) -> Result<(), FirewallError>;
}
