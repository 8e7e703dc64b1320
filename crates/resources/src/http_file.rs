// SPDX-License-Identifier: MIT

//! The `http:file` resource: a small, in-memory document served at a
//! fixed path by an absorbing `http:server` parent. Never run standalone
//! by the engine — `Groupable::absorb` folds it out of the DAG, and the
//! parent drives its `Init`/`Watch`/`CheckApply` directly.

use crate::http_proto::{content_type_for, HttpRequest, HttpResponse};
use async_trait::async_trait;
use mgmt_core::{Handle, MgmtError, Recvable, Resource, ResourceMeta, Sendable, Uid};
use parking_lot::Mutex;
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct HttpFileConfig {
    /// The absolute request path this child claims, e.g. `/hello`.
    pub filename: String,
    pub data: Vec<u8>,
    /// If set, only a parent `http:server` with this exact name may
    /// absorb this child; if empty, any compatible parent does.
    pub parent_name: Option<String>,
}

pub struct HttpFileResource {
    meta: ResourceMeta,
    config: Mutex<HttpFileConfig>,
    handle: Mutex<Option<Arc<dyn Handle>>>,
}

impl HttpFileResource {
    pub fn new(config: HttpFileConfig) -> Self {
        let meta = ResourceMeta::new("http:file", config.filename.clone());
        Self { meta, config: Mutex::new(config), handle: Mutex::new(None) }
    }

    pub fn parent_name(&self) -> Option<String> {
        self.config.lock().parent_name.clone()
    }

    pub fn filename(&self) -> String {
        self.config.lock().filename.clone()
    }

    /// Pure, deterministic: does this child claim `req`?
    pub fn accept(&self, req: &HttpRequest) -> bool {
        req.path == self.config.lock().filename
    }

    pub fn serve(&self, _req: &HttpRequest) -> HttpResponse {
        let config = self.config.lock();
        let content_type = content_type_for(Path::new(&config.filename));
        HttpResponse::ok(content_type, config.data.clone())
    }
}

#[async_trait]
impl Resource for HttpFileResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), MgmtError> {
        let config = self.config.lock();
        if !config.filename.starts_with('/') {
            return Err(MgmtError::validation(self.meta.to_string(), "filename must be an absolute request path"));
        }
        Ok(())
    }

    async fn init(&self, handle: Arc<dyn Handle>) -> Result<(), MgmtError> {
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    async fn watch(&self, ctx: CancellationToken) -> Result<(), MgmtError> {
        let handle = self
            .handle
            .lock()
            .clone()
            .ok_or_else(|| MgmtError::precondition(self.meta.to_string(), "not initialized"))?;
        handle.running().await;
        ctx.cancelled().await;
        Ok(())
    }

    async fn check_apply(&self, _ctx: &CancellationToken, _apply: bool) -> Result<bool, MgmtError> {
        let handle = self
            .handle
            .lock()
            .clone()
            .ok_or_else(|| MgmtError::precondition(self.meta.to_string(), "not initialized"))?;
        let recv = handle.recv();
        if let Some(port) = recv.get("data") {
            if port.changed {
                if let Some(data) = port.value.as_str() {
                    self.config.lock().data = data.as_bytes().to_vec();
                }
            }
        }
        Ok(true)
    }

    async fn cleanup(&self) -> Result<(), MgmtError> {
        Ok(())
    }

    fn cmp(&self, other: &dyn Resource) -> Result<(), MgmtError> {
        let Some(other) = other.as_any().downcast_ref::<HttpFileResource>() else {
            return Err(MgmtError::inconsistency(self.meta.to_string(), "cmp against a different kind"));
        };
        if self.config.lock().filename == other.config.lock().filename {
            Ok(())
        } else {
            Err(MgmtError::inconsistency(self.meta.to_string(), "filename changed"))
        }
    }

    fn uids(&self) -> Vec<Uid> {
        vec![Uid::name("http:file", self.config.lock().filename.clone())]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn as_recvable(&self) -> Option<&dyn Recvable> {
        Some(self)
    }

    fn as_sendable(&self) -> Option<&dyn Sendable> {
        Some(self)
    }
}

impl Recvable for HttpFileResource {
    fn recv_ports(&self) -> Vec<&'static str> {
        vec!["data"]
    }
}

impl Sendable for HttpFileResource {
    fn send_ports(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgmt_core::test_support::FakeHandle;

    fn child(filename: &str, data: &[u8]) -> HttpFileResource {
        HttpFileResource::new(HttpFileConfig { filename: filename.to_string(), data: data.to_vec(), parent_name: None })
    }

    #[test]
    fn accepts_only_its_own_path() {
        let c = child("/hello", b"hi");
        assert!(c.accept(&HttpRequest { method: "GET".to_string(), path: "/hello".to_string(), headers: Default::default() }));
        assert!(!c.accept(&HttpRequest { method: "GET".to_string(), path: "/other".to_string(), headers: Default::default() }));
    }

    #[test]
    fn serve_returns_its_data_with_a_guessed_content_type() {
        let c = child("/index.html", b"<p>hi</p>");
        let resp = c.serve(&HttpRequest { method: "GET".to_string(), path: "/index.html".to_string(), headers: Default::default() });
        assert_eq!(resp.body, b"<p>hi</p>");
        assert_eq!(resp.content_type, "text/html");
    }

    #[tokio::test]
    async fn check_apply_picks_up_a_changed_recv_value() {
        let c = child("/hello", b"stale");
        let handle = FakeHandle::arc();
        c.init(handle.clone()).await.unwrap();
        handle.set_recv("data", serde_json::json!("fresh"), true);
        let ctx = CancellationToken::new();
        assert!(c.check_apply(&ctx, true).await.unwrap());
        assert_eq!(c.config.lock().data, b"fresh");
    }

    #[test]
    fn validate_rejects_a_relative_filename() {
        let c = child("hello", b"hi");
        assert!(c.validate().is_err());
    }
}
