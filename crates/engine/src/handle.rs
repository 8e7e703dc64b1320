// SPDX-License-Identifier: MIT

//! The real `Handle` implementation threaded into every resource at
//! `Init`. One `EngineHandle` per `(Kind, Name)`, backed by the shared
//! value bus, a per-resource var directory, and a `tokio::sync::Notify`
//! pair wired to the reconciliation loop.

use crate::bus::{Binding, Bus};
use async_trait::async_trait;
use mgmt_core::{Handle, RecvPort, Uid, Value, World};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Program-wide identity every `EngineHandle` shares, split out so
/// constructing one per resource doesn't repeat these lookups.
pub struct ProgramInfo {
    pub program: String,
    pub version: String,
    pub hostname: String,
    pub debug: bool,
}

pub struct EngineHandle {
    uid: Uid,
    var_dir_root: PathBuf,
    bus: Bus,
    bindings: Vec<Binding>,
    world: Arc<dyn World>,
    program: Arc<ProgramInfo>,
    armed: Notify,
    event: Notify,
    refresh_pending: AtomicBool,
    log_prefix: String,
    log_sink: Mutex<Vec<String>>,
    watch_generation: std::sync::atomic::AtomicU64,
}

impl EngineHandle {
    pub fn new(
        uid: Uid,
        log_prefix: impl Into<String>,
        var_dir_root: PathBuf,
        bus: Bus,
        bindings: Vec<Binding>,
        world: Arc<dyn World>,
        program: Arc<ProgramInfo>,
    ) -> Self {
        Self {
            uid,
            var_dir_root,
            bus,
            bindings,
            world,
            program,
            armed: Notify::new(),
            event: Notify::new(),
            refresh_pending: AtomicBool::new(false),
            log_prefix: log_prefix.into(),
            log_sink: Mutex::new(Vec::new()),
            watch_generation: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Issue a fresh watch token, one per `Init` (including re-`Init` on
    /// restart after a failed `Watch`). `One watcher per resource` is
    /// enforced structurally by the reconciliation loop never spawning a
    /// second `Watch` before the first has fully returned, so this token
    /// is a diagnostic correlation id rather than a guard the loop
    /// itself consults — log lines tag the generation they belong to so
    /// a straggling event from a watch that has already been superseded
    /// is recognizable after the fact.
    pub fn new_watch_token(&self) -> u64 {
        self.watch_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_watch_token(&self) -> u64 {
        self.watch_generation.load(Ordering::SeqCst)
    }

    /// Block until `Watch` has called `handle.running()`. Used by the
    /// reconciliation loop to know when it's safe to start waiting on
    /// `event()` notifications.
    pub async fn wait_armed(&self) {
        self.armed.notified().await;
    }

    /// Block until the next `handle.event()` call.
    pub async fn wait_event(&self) {
        self.event.notified().await;
    }

    /// Signal a refresh pulse from an upstream resource. Consumed the
    /// next time the resource's `CheckApply` calls `handle.refresh()`.
    pub fn signal_refresh(&self) {
        self.refresh_pending.store(true, Ordering::SeqCst);
    }

    /// Lines the resource logged via `handle.logf`, newest last. Exposed
    /// for the daemon's own structured logging of a resource's activity,
    /// not consulted by the reconciliation loop itself.
    pub fn drain_log(&self) -> Vec<String> {
        std::mem::take(&mut self.log_sink.lock())
    }
}

#[async_trait]
impl Handle for EngineHandle {
    async fn running(&self) {
        self.armed.notify_waiters();
    }

    async fn event(&self) {
        self.event.notify_waiters();
    }

    fn refresh(&self) -> bool {
        self.refresh_pending.swap(false, Ordering::SeqCst)
    }

    fn send(&self, values: HashMap<String, Value>) {
        self.bus.publish(&self.uid, values);
    }

    fn recv(&self) -> HashMap<String, RecvPort> {
        self.bus.recv(&self.uid, &self.bindings)
    }

    fn var_dir(&self, sub: &str) -> PathBuf {
        self.var_dir_root.join(sub)
    }

    fn world(&self) -> &dyn World {
        self.world.as_ref()
    }

    fn logf(&self, message: &str) {
        tracing::info!(resource = %self.log_prefix, "{}", message);
        self.log_sink.lock().push(message.to_string());
    }

    fn debug(&self) -> bool {
        self.program.debug
    }

    fn program(&self) -> &str {
        &self.program.program
    }

    fn version(&self) -> &str {
        &self.program.version
    }

    fn hostname(&self) -> &str {
        &self.program.hostname
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgmt_adapters::FakeWorld;
    use serde_json::json;

    fn handle(uid: Uid) -> EngineHandle {
        EngineHandle::new(
            uid,
            "test[x]",
            PathBuf::from("/var/lib/mgmt/test/x"),
            Bus::new(),
            Vec::new(),
            Arc::new(FakeWorld::new()),
            Arc::new(ProgramInfo {
                program: "mgmt".to_string(),
                version: "0.1.0".to_string(),
                hostname: "host".to_string(),
                debug: false,
            }),
        )
    }

    #[tokio::test]
    async fn running_unblocks_wait_armed() {
        let h = handle(Uid::name("test", "a"));
        tokio::join!(h.running(), h.wait_armed());
    }

    #[test]
    fn refresh_is_consumed_once() {
        let h = handle(Uid::name("test", "a"));
        assert!(!h.refresh());
        h.signal_refresh();
        assert!(h.refresh());
        assert!(!h.refresh());
    }

    #[test]
    fn watch_token_is_fresh_per_issue() {
        let h = handle(Uid::name("test", "a"));
        assert_eq!(h.current_watch_token(), 0);
        assert_eq!(h.new_watch_token(), 1);
        assert_eq!(h.new_watch_token(), 2);
        assert_eq!(h.current_watch_token(), 2);
    }

    #[test]
    fn var_dir_is_scoped_under_root() {
        let h = handle(Uid::name("test", "a"));
        assert_eq!(h.var_dir("hash"), PathBuf::from("/var/lib/mgmt/test/x/hash"));
    }

    #[test]
    fn send_then_recv_round_trips_through_the_bus() {
        let bus = Bus::new();
        let source = Uid::name("test", "producer");
        let consumer_uid = Uid::name("test", "consumer");
        let program = Arc::new(ProgramInfo {
            program: "mgmt".to_string(),
            version: "0.1.0".to_string(),
            hostname: "host".to_string(),
            debug: false,
        });

        let producer = EngineHandle::new(
            source.clone(),
            "test[producer]",
            PathBuf::from("/var/lib/mgmt/test/producer"),
            bus.clone(),
            Vec::new(),
            Arc::new(FakeWorld::new()),
            program.clone(),
        );
        producer.send(HashMap::from([("out".to_string(), json!(42))]));

        let consumer = EngineHandle::new(
            consumer_uid,
            "test[consumer]",
            PathBuf::from("/var/lib/mgmt/test/consumer"),
            bus,
            vec![Binding { port: "in".to_string(), source, source_port: "out".to_string() }],
            Arc::new(FakeWorld::new()),
            program,
        );
        let recv = consumer.recv();
        assert_eq!(recv["in"].value, json!(42));
        assert!(recv["in"].changed);
    }
}
