// SPDX-License-Identifier: MIT

//! firewalld-backed `Firewall`, driven through the `firewall-cmd` CLI.

use async_trait::async_trait;
use mgmt_core::{Firewall, FirewallError, Port};
use tokio::process::Command;

#[derive(Clone, Copy, Debug, Default)]
pub struct FirewalldFirewall;

impl FirewalldFirewall {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<String, FirewallError> {
        let output = Command::new("firewall-cmd")
            .args(args)
            .output()
            .await
            .map_err(|e| FirewallError::ConnectionFailed(e.to_string()))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("INVALID_ZONE") {
                return Err(FirewallError::ZoneNotFound(stderr.trim().to_string()));
            }
            Err(FirewallError::CallFailed(stderr.trim().to_string()))
        }
    }
}

#[async_trait]
impl Firewall for FirewalldFirewall {
    async fn get_ports(&self, zone: &str) -> Result<Vec<Port>, FirewallError> {
        let out = self.run(&["--zone", zone, "--list-ports"]).await?;
        Ok(out.split_whitespace().map(String::from).collect())
    }

    async fn add_port(&self, zone: &str, port: &Port) -> Result<(), FirewallError> {
        self.run(&["--zone", zone, "--add-port", port, "--permanent"]).await.map(|_| ())
    }

    async fn remove_port(&self, zone: &str, port: &Port) -> Result<(), FirewallError> {
        self.run(&["--zone", zone, "--remove-port", port, "--permanent"]).await.map(|_| ())
    }

    async fn reload(&self) -> Result<(), FirewallError> {
        self.run(&["--reload"]).await.map(|_| ())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    #[derive(Default)]
    struct Inner {
        zones: HashMap<String, HashSet<Port>>,
        reload_count: u32,
    }

    /// In-memory `Firewall` double; zones spring into existence on first use.
    #[derive(Clone, Default)]
    pub struct FakeFirewall {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeFirewall {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reload_count(&self) -> u32 {
            self.inner.lock().reload_count
        }
    }

    #[async_trait]
    impl Firewall for FakeFirewall {
        async fn get_ports(&self, zone: &str) -> Result<Vec<Port>, FirewallError> {
            let mut ports: Vec<Port> =
                self.inner.lock().zones.get(zone).cloned().unwrap_or_default().into_iter().collect();
            ports.sort();
            Ok(ports)
        }

        async fn add_port(&self, zone: &str, port: &Port) -> Result<(), FirewallError> {
            self.inner.lock().zones.entry(zone.to_string()).or_default().insert(port.clone());
            Ok(())
        }

        async fn remove_port(&self, zone: &str, port: &Port) -> Result<(), FirewallError> {
            if let Some(ports) = self.inner.lock().zones.get_mut(zone) {
                ports.remove(port);
            }
            Ok(())
        }

        async fn reload(&self) -> Result<(), FirewallError> {
            self.inner.lock().reload_count += 1;
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeFirewall;

#[cfg(test)]
mod tests {
    use super::fake::FakeFirewall;
    use mgmt_core::Firewall;

    #[tokio::test]
    async fn add_port_is_visible_in_list() {
        let fw = FakeFirewall::new();
        fw.add_port("public", &"4280/tcp".to_string()).await.unwrap();
        assert_eq!(fw.get_ports("public").await.unwrap(), vec!["4280/tcp".to_string()]);
    }

    #[tokio::test]
    async fn remove_port_clears_it() {
        let fw = FakeFirewall::new();
        fw.add_port("public", &"4280/tcp".to_string()).await.unwrap();
        fw.remove_port("public", &"4280/tcp".to_string()).await.unwrap();
        assert!(fw.get_ports("public").await.unwrap().is_empty());
    }
}
