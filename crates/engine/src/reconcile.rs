// SPDX-License-Identifier: MIT

//! The per-resource reconciliation loop: validate once, init, start
//! `Watch` on its own task, then converge with `CheckApply` on every
//! `event()`, upstream refresh, or upstream send/recv delivery — with
//! backoff-governed restarts of a `Watch` that returns an error — until
//! the resource's cancellation token fires, at which point `Watch` is
//! cancelled (any in-flight `CheckApply` is allowed to finish, since
//! this loop never aborts one mid-`.await`) and `Cleanup` runs.
//!
//! `Watch` and `CheckApply` run on genuinely separate tasks sharing one
//! `Arc<dyn Resource>` — see that trait's own doc comment for why its
//! lifecycle methods take `&self` rather than `&mut self`.

use crate::backoff::Backoff;
use crate::handle::EngineHandle;
use mgmt_core::{MgmtError, Resource};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Outcome of running one resource to completion.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// `ctx` was cancelled; `Cleanup` ran.
    Cancelled,
    /// `Validate` or `Init` failed; the resource never reached `Watch`.
    Failed(MgmtError),
}

/// Gates a resource's first `CheckApply` on its upstream auto-edge
/// dependencies having attempted theirs, and in turn lets its own
/// downstream dependents proceed once it has. Built by the top-level
/// engine from the dependency graph; resources with no dependencies get
/// one with an empty `wait_on`, so they proceed immediately.
pub struct DependencyBarrier {
    wait_on: Vec<watch::Receiver<bool>>,
    ready: watch::Sender<bool>,
}

impl DependencyBarrier {
    pub fn new(wait_on: Vec<watch::Receiver<bool>>, ready: watch::Sender<bool>) -> Self {
        Self { wait_on, ready }
    }

    async fn wait(&mut self) {
        for rx in &mut self.wait_on {
            let _ = rx.wait_for(|attempted| *attempted).await;
        }
    }

    fn signal(&self) {
        let _ = self.ready.send(true);
    }
}

/// Drive a single resource's full lifecycle until `ctx` is cancelled.
///
/// `Init` runs again before every re-entry into `Watch`, not only the
/// first time: "one watcher per resource" means re-entry after a
/// failed `Watch` requires a fresh `Init`, not a bare respawn.
pub async fn run(
    resource: Arc<dyn Resource>,
    handle: Arc<EngineHandle>,
    ctx: CancellationToken,
    mut barrier: Option<DependencyBarrier>,
) -> ReconcileOutcome {
    let name = handle.program().to_string();

    if let Err(e) = resource.validate() {
        tracing::error!(resource = %name, error = %e, "validate failed");
        return ReconcileOutcome::Failed(e);
    }

    let mut backoff = Backoff::new();

    'restart: loop {
        if ctx.is_cancelled() {
            break 'restart;
        }

        let token = handle.new_watch_token();
        if let Err(e) = resource.init(handle.clone() as Arc<dyn mgmt_core::Handle>).await {
            tracing::error!(resource = %name, watch_token = token, error = %e, "init failed");
            return ReconcileOutcome::Failed(e);
        }

        let watch_ctx = ctx.child_token();
        let watch_resource = resource.clone();
        let mut watch_task = tokio::spawn(async move { watch_resource.watch(watch_ctx).await });

        tokio::select! {
            _ = handle.wait_armed() => {}
            result = &mut watch_task => {
                log_watch_ended(&name, token, result);
                if ctx.is_cancelled() {
                    break 'restart;
                }
                tokio::time::sleep(backoff.next_delay()).await;
                continue 'restart;
            }
        }

        if let Some(b) = barrier.as_mut() {
            b.wait().await;
        }
        let _ = check_apply_once(&resource, &ctx, true, &name, &mut backoff).await;
        if let Some(b) = barrier.take() {
            b.signal();
        }

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break 'restart,
                _ = handle.wait_event() => {
                    let _ = check_apply_once(&resource, &ctx, true, &name, &mut backoff).await;
                }
                result = &mut watch_task => {
                    log_watch_ended(&name, token, result);
                    if ctx.is_cancelled() {
                        break 'restart;
                    }
                    tokio::time::sleep(backoff.next_delay()).await;
                    continue 'restart;
                }
            }
        }
    }

    if let Err(e) = resource.cleanup().await {
        tracing::error!(resource = %name, error = %e, "cleanup failed");
    }
    ReconcileOutcome::Cancelled
}

fn log_watch_ended(name: &str, token: u64, result: Result<Result<(), MgmtError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => tracing::debug!(resource = %name, watch_token = token, "watch ended"),
        Ok(Err(e)) => {
            tracing::warn!(resource = %name, watch_token = token, error = %e, "watch exited with error, restarting after backoff")
        }
        Err(join_err) => {
            tracing::error!(resource = %name, watch_token = token, error = %join_err, "watch task panicked, restarting after backoff")
        }
    }
}

async fn check_apply_once(
    resource: &Arc<dyn Resource>,
    ctx: &CancellationToken,
    apply: bool,
    name: &str,
    backoff: &mut Backoff,
) -> Result<(), MgmtError> {
    match resource.check_apply(ctx, apply).await {
        Ok(_converged) => {
            backoff.record_success(tokio::time::Instant::now());
            Ok(())
        }
        Err(e) => {
            if !e.is_cancelled() {
                tracing::warn!(resource = %name, error = %e, "check_apply failed");
            }
            Err(e)
        }
    }
}
