// SPDX-License-Identifier: MIT

//! The `http:server` resource: a `Groupable` parent that binds a TCP
//! listener, absorbs `http:file` children, and dispatches each request
//! to the first absorbed child that claims it, falling back to a root
//! directory served through `secure_join`.

use crate::http_file::HttpFileResource;
use crate::http_proto::{content_type_for, read_request, write_response, HttpProtoError, HttpRequest, HttpResponse};
use async_trait::async_trait;
use mgmt_core::{
    secure_join, Groupable, Handle, Interruptible, MgmtError, RecvPort, Resource, ResourceMeta, Uid,
    Value, World,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub name: String,
    /// If unset, `name` itself is used as the listen address, per §4.7
    /// ("name doubles as listen address unless an explicit address is
    /// given").
    pub address: Option<String>,
    pub root: Option<PathBuf>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
}

impl HttpServerConfig {
    pub fn listen_address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }
}

/// The per-child `Handle` the server constructs at absorption time:
/// forwards `event()` onto a shared multiplexed channel, scopes `logf`
/// with the child's own identifier, and otherwise delegates to the
/// parent's own engine-supplied handle.
struct ChildHandle {
    parent: Arc<dyn Handle>,
    event_tx: mpsc::Sender<()>,
    armed: Notify,
    log_prefix: String,
}

impl ChildHandle {
    async fn wait_armed(&self) {
        self.armed.notified().await;
    }
}

#[async_trait]
impl Handle for ChildHandle {
    async fn running(&self) {
        self.armed.notify_waiters();
    }

    async fn event(&self) {
        let _ = self.event_tx.send(()).await;
    }

    fn refresh(&self) -> bool {
        self.parent.refresh()
    }

    fn send(&self, values: HashMap<String, Value>) {
        self.parent.send(values);
    }

    fn recv(&self) -> HashMap<String, RecvPort> {
        self.parent.recv()
    }

    fn var_dir(&self, sub: &str) -> PathBuf {
        self.parent.var_dir(sub)
    }

    fn world(&self) -> &dyn World {
        self.parent.world()
    }

    fn logf(&self, message: &str) {
        self.parent.logf(&format!("{}: {}", self.log_prefix, message));
    }

    fn debug(&self) -> bool {
        self.parent.debug()
    }

    fn program(&self) -> &str {
        self.parent.program()
    }

    fn version(&self) -> &str {
        self.parent.version()
    }

    fn hostname(&self) -> &str {
        self.parent.hostname()
    }
}

/// Read-only view handed to the accept loop's per-connection tasks.
/// Holds no lock: children are absorbed once, before `Init`, and never
/// added or removed afterward.
struct Dispatcher {
    children: Vec<Arc<HttpFileResource>>,
    root: Option<PathBuf>,
}

impl Dispatcher {
    async fn dispatch(&self, req: &HttpRequest) -> HttpResponse {
        for child in &self.children {
            if child.accept(req) {
                return child.serve(req);
            }
        }
        let Some(root) = &self.root else {
            return HttpResponse::not_found();
        };
        match secure_join(root, &req.path) {
            Ok(resolved) => match tokio::fs::read(&resolved).await {
                Ok(bytes) => HttpResponse::ok(content_type_for(&resolved), bytes),
                Err(_) => HttpResponse::not_found(),
            },
            Err(_) => HttpResponse::not_found(),
        }
    }
}

pub struct HttpServerResource {
    meta: ResourceMeta,
    config: HttpServerConfig,
    children: Mutex<Vec<Arc<HttpFileResource>>>,
    handle: Mutex<Option<Arc<dyn Handle>>>,
    /// Tripped by `Interruptible::interrupt` to force the accept loop
    /// closed immediately, bypassing the graceful shutdown timeout.
    force_close: CancellationToken,
}

impl HttpServerResource {
    pub fn new(config: HttpServerConfig) -> Self {
        let meta = ResourceMeta::new("http:server", config.name.clone());
        Self {
            meta,
            config,
            children: Mutex::new(Vec::new()),
            handle: Mutex::new(None),
            force_close: CancellationToken::new(),
        }
    }

    fn handle(&self) -> Result<Arc<dyn Handle>, MgmtError> {
        self.handle
            .lock()
            .clone()
            .ok_or_else(|| MgmtError::precondition(self.meta.to_string(), "not initialized"))
    }
}

fn is_http_child_kind(kind: &str) -> bool {
    match kind.strip_prefix("http:") {
        Some(rest) => !rest.is_empty() && !rest.contains(':'),
        None => false,
    }
}

async fn serve_connection(
    stream: TcpStream,
    dispatcher: &Dispatcher,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
) -> Result<(), HttpProtoError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let req = match read_timeout {
        Some(d) => tokio::time::timeout(d, read_request(&mut reader))
            .await
            .map_err(|_| HttpProtoError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "read timeout")))??,
        None => read_request(&mut reader).await?,
    };

    let resp = if req.method != "GET" { HttpResponse::method_not_allowed() } else { dispatcher.dispatch(&req).await };

    match write_timeout {
        Some(d) => {
            tokio::time::timeout(d, write_response(&mut write_half, &resp))
                .await
                .map_err(|_| HttpProtoError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")))??
        }
        None => write_response(&mut write_half, &resp).await?,
    }
    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    stop: CancellationToken,
    force: CancellationToken,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
) -> Result<(), MgmtError> {
    loop {
        tokio::select! {
            _ = force.cancelled() => return Ok(()),
            _ = stop.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, &dispatcher, read_timeout, write_timeout).await {
                                tracing::debug!(error = %e, "http connection ended with an error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "http accept loop failed");
                        return Err(MgmtError::transient("http:server".to_string(), e));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Resource for HttpServerResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), MgmtError> {
        if self.config.name.is_empty() {
            return Err(MgmtError::validation(self.meta.to_string(), "name must not be empty"));
        }
        if self.config.listen_address().is_empty() {
            return Err(MgmtError::validation(self.meta.to_string(), "listen address must not be empty"));
        }
        if self.config.shutdown_timeout.is_zero() {
            return Err(MgmtError::validation(self.meta.to_string(), "shutdown_timeout must be positive"));
        }
        Ok(())
    }

    async fn init(&self, handle: Arc<dyn Handle>) -> Result<(), MgmtError> {
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    async fn watch(&self, ctx: CancellationToken) -> Result<(), MgmtError> {
        let handle = self.handle()?;
        let listener = TcpListener::bind(self.config.listen_address())
            .await
            .map_err(|e| MgmtError::precondition(self.meta.to_string(), format!("bind {}: {e}", self.config.listen_address())))?;

        let children = self.children.lock().clone();
        let (event_tx, mut event_rx) = mpsc::channel::<()>(64);

        let mut child_handles = Vec::with_capacity(children.len());
        let mut child_tasks = Vec::with_capacity(children.len());
        for child in &children {
            let child_handle = Arc::new(ChildHandle {
                parent: handle.clone(),
                event_tx: event_tx.clone(),
                armed: Notify::new(),
                log_prefix: child.meta().to_string(),
            });
            child.init(child_handle.clone() as Arc<dyn Handle>).await?;

            let child_clone = Arc::clone(child);
            let child_ctx = ctx.child_token();
            child_tasks.push(tokio::spawn(async move { child_clone.watch(child_ctx).await }));
            child_handles.push(child_handle);
        }

        // Spawned above, raced here: the spawn only enqueues the task, so
        // the waiter each `wait_armed` registers is in place before any
        // child's `watch` gets its first poll on the runtime, matching
        // the same ordering the reconciliation loop itself relies on.
        let armed_futures: Vec<_> = child_handles.iter().map(|h| h.wait_armed()).collect();
        futures::future::join_all(armed_futures).await;

        let dispatcher = Arc::new(Dispatcher { children: children.clone(), root: self.config.root.clone() });
        let accept_stop = CancellationToken::new();
        let accept_handle = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            accept_stop.clone(),
            self.force_close.clone(),
            self.config.read_timeout,
            self.config.write_timeout,
        ));
        let abort_handle = accept_handle.abort_handle();

        handle.running().await;

        loop {
            tokio::select! {
                _ = event_rx.recv() => {
                    handle.event().await;
                }
                _ = ctx.cancelled() => break,
                _ = self.force_close.cancelled() => break,
            }
        }

        accept_stop.cancel();
        let result = match tokio::time::timeout(self.config.shutdown_timeout, accept_handle).await {
            Ok(Ok(inner)) => inner,
            Ok(Err(_join_err)) => Ok(()),
            Err(_elapsed) => {
                abort_handle.abort();
                Ok(())
            }
        };

        for task in child_tasks {
            let _ = task.await;
        }

        result
    }

    async fn check_apply(&self, ctx: &CancellationToken, apply: bool) -> Result<bool, MgmtError> {
        if let Some(root) = &self.config.root {
            let metadata = tokio::fs::metadata(root)
                .await
                .map_err(|e| MgmtError::precondition(self.meta.to_string(), format!("root {}: {e}", root.display())))?;
            if !metadata.is_dir() {
                return Err(MgmtError::validation(self.meta.to_string(), format!("root {} is not a directory", root.display())));
            }
        }

        let children = self.children.lock().clone();
        let mut all_converged = true;
        for child in &children {
            all_converged &= child.check_apply(ctx, apply).await?;
        }
        Ok(all_converged)
    }

    async fn cleanup(&self) -> Result<(), MgmtError> {
        Ok(())
    }

    fn cmp(&self, other: &dyn Resource) -> Result<(), MgmtError> {
        let Some(other) = other.as_any().downcast_ref::<HttpServerResource>() else {
            return Err(MgmtError::inconsistency(self.meta.to_string(), "cmp against a different kind"));
        };
        if self.config.listen_address() == other.config.listen_address() && self.config.root == other.config.root {
            Ok(())
        } else {
            Err(MgmtError::inconsistency(self.meta.to_string(), "address or root changed"))
        }
    }

    fn uids(&self) -> Vec<Uid> {
        vec![Uid::name("http:server", self.meta.name.clone())]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn as_groupable(&self) -> Option<&dyn Groupable> {
        Some(self)
    }

    fn as_groupable_mut(&mut self) -> Option<&mut dyn Groupable> {
        Some(self)
    }

    fn as_interruptible(&self) -> Option<&dyn Interruptible> {
        Some(self)
    }
}

impl Groupable for HttpServerResource {
    fn group_cmp(&self, other: &dyn Resource) -> Result<(), MgmtError> {
        if !is_http_child_kind(other.meta().kind) {
            return Err(MgmtError::inconsistency(
                self.meta.to_string(),
                format!("{} cannot group into an http server", other.meta().kind),
            ));
        }
        // `HttpFileResource::parent_name` is read through the same
        // narrow, documented `as_any` exception this crate's `cmp`
        // implementations already use to compare a peer of known
        // concrete type, extended here to the sibling `Groupable`
        // contract rather than introducing a second mechanism.
        let Some(child) = other.as_any().downcast_ref::<HttpFileResource>() else {
            return Err(MgmtError::inconsistency(self.meta.to_string(), "unrecognized http child type"));
        };
        if let Some(wanted) = child.parent_name() {
            if wanted != self.meta.name {
                return Err(MgmtError::inconsistency(self.meta.to_string(), "child declares a different parent"));
            }
        }
        Ok(())
    }

    fn absorb(&mut self, child: Box<dyn Resource>) -> Result<(), MgmtError> {
        let child = child
            .into_any()
            .downcast::<HttpFileResource>()
            .map_err(|_| MgmtError::inconsistency(self.meta.to_string(), "absorb of a non-http:file child"))?;
        self.children.get_mut().push(Arc::from(child));
        Ok(())
    }
}

impl Interruptible for HttpServerResource {
    fn interrupt(&self) {
        self.force_close.cancel();
    }
}
