// SPDX-License-Identifier: MIT

//! Test doubles shared by every crate that tests against `Resource`/`Handle`.
//! Gated behind `test-support` so production builds never pull it in.

use crate::adapters::{World, WorldError, WorldFs};
use crate::handle::{Handle, RecvPort, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An in-memory `WorldFs` useful for archive/deploy-style resource tests.
#[derive(Default)]
pub struct FakeWorldFs {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

#[async_trait]
impl WorldFs for FakeWorldFs {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, WorldError> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| WorldError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), WorldError> {
        self.files.lock().insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool, WorldError> {
        Ok(self.files.lock().contains_key(path))
    }
}

pub struct FakeWorld {
    uri: String,
}

impl Default for FakeWorld {
    fn default() -> Self {
        Self { uri: "fake://".to_string() }
    }
}

#[async_trait]
impl World for FakeWorld {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn fs(&self, _uri: &str) -> Result<Box<dyn WorldFs>, WorldError> {
        Ok(Box::new(FakeWorldFs::default()))
    }
}

#[derive(Default)]
struct FakeHandleState {
    running_calls: u32,
    event_calls: u32,
    refresh_pending: bool,
    sent: HashMap<String, Value>,
    recv: HashMap<String, RecvPort>,
    log_lines: Vec<String>,
}

/// A fully in-memory `Handle`, with a real temp directory backing
/// `var_dir` so resources under test can exercise real file I/O.
pub struct FakeHandle {
    state: Mutex<FakeHandleState>,
    var_root: tempfile::TempDir,
    world: FakeWorld,
    debug: bool,
}

impl FakeHandle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeHandleState::default()),
            var_root: tempfile::tempdir().expect("tempdir"),
            world: FakeWorld::default(),
            debug: true,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn running_calls(&self) -> u32 {
        self.state.lock().running_calls
    }

    pub fn event_calls(&self) -> u32 {
        self.state.lock().event_calls
    }

    pub fn set_refresh_pending(&self, pending: bool) {
        self.state.lock().refresh_pending = pending;
    }

    pub fn sent(&self) -> HashMap<String, Value> {
        self.state.lock().sent.clone()
    }

    pub fn set_recv(&self, port: impl Into<String>, value: Value, changed: bool) {
        self.state.lock().recv.insert(port.into(), RecvPort { value, changed });
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.state.lock().log_lines.clone()
    }
}

impl Default for FakeHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handle for FakeHandle {
    async fn running(&self) {
        self.state.lock().running_calls += 1;
    }

    async fn event(&self) {
        self.state.lock().event_calls += 1;
    }

    fn refresh(&self) -> bool {
        let mut state = self.state.lock();
        let pending = state.refresh_pending;
        state.refresh_pending = false;
        pending
    }

    fn send(&self, values: HashMap<String, Value>) {
        self.state.lock().sent.extend(values);
    }

    fn recv(&self) -> HashMap<String, RecvPort> {
        self.state.lock().recv.clone()
    }

    fn var_dir(&self, sub: &str) -> PathBuf {
        let dir = self.var_root.path().join(sub);
        std::fs::create_dir_all(&dir).expect("create var_dir");
        dir
    }

    fn world(&self) -> &dyn World {
        &self.world
    }

    fn logf(&self, message: &str) {
        self.state.lock().log_lines.push(message.to_string());
    }

    fn debug(&self) -> bool {
        self.debug
    }

    fn program(&self) -> &str {
        "mgmt-test"
    }

    fn version(&self) -> &str {
        "0.0.0-test"
    }

    fn hostname(&self) -> &str {
        "test-host"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn running_then_event_are_counted() {
        let h = FakeHandle::new();
        h.running().await;
        h.event().await;
        h.event().await;
        assert_eq!(h.running_calls(), 1);
        assert_eq!(h.event_calls(), 2);
    }

    #[test]
    fn refresh_is_consumed_once() {
        let h = FakeHandle::new();
        h.set_refresh_pending(true);
        assert!(h.refresh());
        assert!(!h.refresh());
    }
}
