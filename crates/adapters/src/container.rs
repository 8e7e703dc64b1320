// SPDX-License-Identifier: MIT

//! Docker-backed `Container`, driven through the `docker` CLI — the same
//! "spawn the platform tool, parse its output" shape used for the other
//! local adapters, rather than linking the Docker HTTP API directly.

use async_trait::async_trait;
use mgmt_core::{Container, ContainerError, ContainerStatus};
use tokio::process::Command;

#[derive(Clone, Copy, Debug, Default)]
pub struct DockerContainer;

impl DockerContainer {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<String, ContainerError> {
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| ContainerError::ConnectionFailed(e.to_string()))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(ContainerError::CallFailed(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

#[async_trait]
impl Container for DockerContainer {
    async fn ensure_image(&self, image: &str) -> Result<(), ContainerError> {
        match self.run(&["image", "inspect", image]).await {
            Ok(_) => Ok(()),
            Err(_) => self.run(&["pull", image]).await.map(|_| ()).map_err(|e| match e {
                ContainerError::CallFailed(msg) => ContainerError::ImageNotFound(msg),
                other => other,
            }),
        }
    }

    async fn create(&self, name: &str, image: &str, networks: &[String]) -> Result<(), ContainerError> {
        let mut args = vec!["create".to_string(), "--name".to_string(), name.to_string()];
        for network in networks {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        args.push(image.to_string());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await.map(|_| ())
    }

    async fn start(&self, name: &str) -> Result<(), ContainerError> {
        self.run(&["start", name]).await.map(|_| ())
    }

    async fn stop(&self, name: &str) -> Result<(), ContainerError> {
        self.run(&["stop", name]).await.map(|_| ())
    }

    async fn inspect(&self, name: &str) -> Result<Option<ContainerStatus>, ContainerError> {
        let running = match self.run(&["inspect", "-f", "{{.State.Running}}", name]).await {
            Ok(out) => out == "true",
            Err(ContainerError::CallFailed(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let image = self.run(&["inspect", "-f", "{{.Config.Image}}", name]).await?;
        Ok(Some(ContainerStatus { running, image }))
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct Inner {
        images: Vec<String>,
        containers: HashMap<String, ContainerStatus>,
    }

    /// In-memory `Container` double. `create` must precede `start`/`stop`/`inspect`.
    #[derive(Clone, Default)]
    pub struct FakeContainer {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeContainer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn known_images(&self) -> Vec<String> {
            self.inner.lock().images.clone()
        }
    }

    #[async_trait]
    impl Container for FakeContainer {
        async fn ensure_image(&self, image: &str) -> Result<(), ContainerError> {
            let mut inner = self.inner.lock();
            if !inner.images.contains(&image.to_string()) {
                inner.images.push(image.to_string());
            }
            Ok(())
        }

        async fn create(&self, name: &str, image: &str, _networks: &[String]) -> Result<(), ContainerError> {
            self.inner
                .lock()
                .containers
                .insert(name.to_string(), ContainerStatus { running: false, image: image.to_string() });
            Ok(())
        }

        async fn start(&self, name: &str) -> Result<(), ContainerError> {
            let mut inner = self.inner.lock();
            let status = inner
                .containers
                .get_mut(name)
                .ok_or_else(|| ContainerError::CallFailed(format!("no such container: {name}")))?;
            status.running = true;
            Ok(())
        }

        async fn stop(&self, name: &str) -> Result<(), ContainerError> {
            let mut inner = self.inner.lock();
            let status = inner
                .containers
                .get_mut(name)
                .ok_or_else(|| ContainerError::CallFailed(format!("no such container: {name}")))?;
            status.running = false;
            Ok(())
        }

        async fn inspect(&self, name: &str) -> Result<Option<ContainerStatus>, ContainerError> {
            Ok(self.inner.lock().containers.get(name).cloned())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeContainer;

#[cfg(test)]
mod tests {
    use super::fake::FakeContainer;
    use mgmt_core::Container;

    #[tokio::test]
    async fn create_then_start_reports_running() {
        let c = FakeContainer::new();
        c.create("web", "nginx:latest", &[]).await.unwrap();
        c.start("web").await.unwrap();
        let status = c.inspect("web").await.unwrap().unwrap();
        assert!(status.running);
        assert_eq!(status.image, "nginx:latest");
    }

    #[tokio::test]
    async fn inspecting_unknown_container_is_none() {
        let c = FakeContainer::new();
        assert!(c.inspect("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_image_is_idempotent() {
        let c = FakeContainer::new();
        c.ensure_image("nginx:latest").await.unwrap();
        c.ensure_image("nginx:latest").await.unwrap();
        assert_eq!(c.known_images(), vec!["nginx:latest".to_string()]);
    }
}
