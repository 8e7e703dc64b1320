// SPDX-License-Identifier: MIT

//! The container-daemon RPC interface (docker-HTTP shaped), used by the
//! container resource to manage images, creation, and lifecycle state.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container daemon connection failed: {0}")]
    ConnectionFailed(String),
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("container call failed: {0}")]
    CallFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub running: bool,
    pub image: String,
}

#[async_trait]
pub trait Container: Send + Sync + 'static {
    async fn ensure_image(&self, image: &str) -> Result<(), ContainerError>;
    async fn create(&self, name: &str, image: &str, networks: &[String]) -> Result<(), ContainerError>;
    async fn start(&self, name: &str) -> Result<(), ContainerError>;
    async fn stop(&self, name: &str) -> Result<(), ContainerError>;
    async fn inspect(&self, name: &str) -> Result<Option<ContainerStatus>, ContainerError>;
}
