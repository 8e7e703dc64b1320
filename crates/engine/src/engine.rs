// SPDX-License-Identifier: MIT

//! The top-level engine: turns a flat list of boxed resources into a
//! running, self-healing graph. Runs the auto-group pass, builds the
//! dependency DAG from auto-edge inference, wires one `EngineHandle`
//! and one reconciliation task per surviving resource, and drives every
//! task to completion on shutdown.

use crate::bus::{Binding, Bus};
use crate::error::EngineError;
use crate::graph::{auto_group, build_graph};
use crate::handle::{EngineHandle, ProgramInfo};
use crate::reconcile::{self, DependencyBarrier, ReconcileOutcome};
use mgmt_core::{Resource, World};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Process-wide configuration shared by every `EngineHandle` the engine builds.
pub struct EngineConfig {
    /// Root directory under which each resource gets its own `(Kind, Name)`-scoped subdirectory.
    pub var_dir_root: PathBuf,
    pub program: Arc<ProgramInfo>,
    pub world: Arc<dyn World>,
}

/// One resource as supplied to [`Engine::run`]: the boxed resource plus
/// the explicit send→recv bindings the caller (the daemon's config
/// loader) has declared for it. Auto-edges are inferred by the engine;
/// port bindings are not, per spec.md §4.6 ("the engine wires named
/// ports via declared edges").
pub struct ResourceSpec {
    pub resource: Box<dyn Resource>,
    pub bindings: Vec<Binding>,
}

pub struct Engine {
    config: EngineConfig,
    bus: Bus,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, bus: Bus::new() }
    }

    /// Run every resource to convergence and keep reconciling until `ctx`
    /// is cancelled. Returns once every resource's task has unwound
    /// (cleanly cancelled or failed at `Validate`/`Init`).
    pub async fn run(&self, specs: Vec<ResourceSpec>, ctx: CancellationToken) -> Result<(), EngineError> {
        // Bindings travel keyed by the resource's own `(Kind, Name)`
        // identity rather than its position: `auto_group` can remove and
        // reorder entries (an absorbed child drops out entirely, the
        // parent drives it through its own per-child handle instead), so
        // a list position from before that pass means nothing afterwards.
        let mut bindings_by_identity: std::collections::HashMap<String, Vec<Binding>> =
            std::collections::HashMap::with_capacity(specs.len());
        let resources: Vec<Box<dyn Resource>> = specs
            .into_iter()
            .map(|spec| {
                bindings_by_identity.insert(spec.resource.meta().to_string(), spec.bindings);
                spec.resource
            })
            .collect();

        let resources = auto_group(resources)?;
        let graph = build_graph(&resources)?;

        // One watch channel per surviving resource: `false` until its
        // first CheckApply has been attempted, flipped to `true` exactly
        // once so its dependents' DependencyBarrier::wait can proceed.
        let channels: Vec<(watch::Sender<bool>, watch::Receiver<bool>)> =
            (0..resources.len()).map(|_| watch::channel(false)).collect();

        let mut tasks = Vec::with_capacity(resources.len());
        for (i, resource) in resources.into_iter().enumerate() {
            let meta = resource.meta().to_string();
            let resource_bindings = bindings_by_identity.remove(&meta).unwrap_or_default();
            let resource: Arc<dyn Resource> = Arc::from(resource);
            let uid = stable_uid(i, &meta);
            let handle = Arc::new(EngineHandle::new(
                uid,
                meta.clone(),
                self.config.var_dir_root.join(sanitize_for_path(&meta)),
                self.bus.clone(),
                resource_bindings,
                self.config.world.clone(),
                self.config.program.clone(),
            ));

            let wait_on: Vec<watch::Receiver<bool>> =
                graph.depends_on[i].iter().map(|&dep| channels[dep].1.clone()).collect();
            let ready = channels[i].0.clone();
            let barrier = DependencyBarrier::new(wait_on, ready);

            let task_ctx = ctx.child_token();
            tasks.push(tokio::spawn(async move {
                let outcome = reconcile::run(resource, handle, task_ctx, Some(barrier)).await;
                (meta, outcome)
            }));
        }

        let mut first_failure = None;
        for task in tasks {
            match task.await {
                Ok((meta, ReconcileOutcome::Failed(e))) => {
                    tracing::error!(resource = %meta, error = %e, "resource never started");
                    if first_failure.is_none() {
                        first_failure = Some(EngineError::Resource(e));
                    }
                }
                Ok((_, ReconcileOutcome::Cancelled)) => {}
                Err(join_err) => {
                    tracing::error!(error = %join_err, "resource task panicked");
                    if first_failure.is_none() {
                        first_failure = Some(EngineError::TaskPanicked(join_err.to_string()));
                    }
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Resources are identified to the bus/var-dir by their own `meta()`
/// rather than a synthesized index, so restarts and reloads address the
/// same bus slot and the same on-disk directory across runs.
fn stable_uid(_index: usize, meta: &str) -> mgmt_core::Uid {
    resource_uid(meta)
}

/// The bus identity a resource's own `EngineHandle` publishes under and
/// consumes recv bindings as. Exposed so a config loader can build
/// [`Binding`](crate::bus::Binding)s for a resource before `Engine::run`
/// has had a chance to construct its handle.
pub fn resource_uid(meta: &str) -> mgmt_core::Uid {
    mgmt_core::Uid::name("engine", meta)
}

/// `ResourceMeta::to_string()` is `kind[name]`; `name` may itself be a
/// filesystem path (e.g. a `file` resource), so the var-dir segment is
/// derived rather than used verbatim as a path component.
fn sanitize_for_path(meta: &str) -> String {
    meta.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mgmt_adapters::FakeWorld;
    use mgmt_core::{Handle, MgmtError, ResourceMeta, Uid};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{timeout, Duration};

    struct Counting {
        meta: ResourceMeta,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Resource for Counting {
        fn meta(&self) -> &ResourceMeta {
            &self.meta
        }
        fn validate(&self) -> Result<(), MgmtError> {
            Ok(())
        }
        async fn init(&self, _handle: Arc<dyn Handle>) -> Result<(), MgmtError> {
            Ok(())
        }
        async fn watch(&self, ctx: CancellationToken) -> Result<(), MgmtError> {
            ctx.cancelled().await;
            Ok(())
        }
        async fn check_apply(&self, _ctx: &CancellationToken, _apply: bool) -> Result<bool, MgmtError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        async fn cleanup(&self) -> Result<(), MgmtError> {
            Ok(())
        }
        fn cmp(&self, _other: &dyn Resource) -> Result<(), MgmtError> {
            Ok(())
        }
        fn uids(&self) -> Vec<Uid> {
            vec![Uid::name("counting", &self.meta.name)]
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn into_any(self: Box<Self>) -> Box<dyn Any> {
            self
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            var_dir_root: PathBuf::from("/tmp/mgmt-engine-test"),
            program: Arc::new(ProgramInfo {
                program: "mgmt".to_string(),
                version: "0.1.0".to_string(),
                hostname: "host".to_string(),
                debug: false,
            }),
            world: Arc::new(FakeWorld::new()),
        }
    }

    #[tokio::test]
    async fn independent_resources_both_run_and_cancel_cleanly() {
        let calls = Arc::new(AtomicUsize::new(0));
        let a = Counting { meta: ResourceMeta::new("counting", "a"), calls: calls.clone() };
        let b = Counting { meta: ResourceMeta::new("counting", "b"), calls: calls.clone() };

        let engine = Engine::new(config());
        let ctx = CancellationToken::new();
        let ctx_for_run = ctx.clone();
        let specs = vec![
            ResourceSpec { resource: Box::new(a), bindings: Vec::new() },
            ResourceSpec { resource: Box::new(b), bindings: Vec::new() },
        ];
        let task = tokio::spawn(async move { engine.run(specs, ctx_for_run).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        ctx.cancel();
        let result = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn a_failed_validate_surfaces_as_a_resource_error() {
        struct AlwaysInvalid(ResourceMeta);

        #[async_trait]
        impl Resource for AlwaysInvalid {
            fn meta(&self) -> &ResourceMeta {
                &self.0
            }
            fn validate(&self) -> Result<(), MgmtError> {
                Err(MgmtError::validation(self.0.to_string(), "always invalid"))
            }
            async fn init(&self, _handle: Arc<dyn Handle>) -> Result<(), MgmtError> {
                Ok(())
            }
            async fn watch(&self, _ctx: CancellationToken) -> Result<(), MgmtError> {
                Ok(())
            }
            async fn check_apply(&self, _ctx: &CancellationToken, _apply: bool) -> Result<bool, MgmtError> {
                Ok(true)
            }
            async fn cleanup(&self) -> Result<(), MgmtError> {
                Ok(())
            }
            fn cmp(&self, _other: &dyn Resource) -> Result<(), MgmtError> {
                Ok(())
            }
            fn uids(&self) -> Vec<Uid> {
                Vec::new()
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn into_any(self: Box<Self>) -> Box<dyn Any> {
                self
            }
        }

        let engine = Engine::new(config());
        let specs = vec![ResourceSpec {
            resource: Box::new(AlwaysInvalid(ResourceMeta::new("counting", "bad"))),
            bindings: Vec::new(),
        }];
        let result = timeout(Duration::from_secs(1), engine.run(specs, CancellationToken::new())).await.unwrap();
        assert!(matches!(result, Err(EngineError::Resource(_))));
    }
}
