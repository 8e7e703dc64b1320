// SPDX-License-Identifier: MIT

//! The composite wrapper: drives a privately owned, ordered sequence of
//! nested resources through `Validate`/`Init`/`Watch`/`CheckApply`/
//! `Cleanup`, optionally running a side effect (e.g. a supervisor
//! daemon-reload) after a step that changed something before moving on
//! to the next. Concrete composite resources (a timer made of a unit
//! file plus a service, a mount made of a unit file plus a service)
//! embed a `Composite` and delegate their own lifecycle methods to it
//! rather than re-implementing the sequencing rule themselves.

use async_trait::async_trait;
use mgmt_core::{Handle, MgmtError, Resource};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs after a nested resource's `CheckApply` step returns `false`
/// (i.e. the step made a change), before the next nested resource runs.
/// Used for "regenerate the unit file, then tell the supervisor to
/// reload before starting the unit".
#[async_trait]
pub trait CompositeSideEffect: Send + Sync {
    async fn run(&self, ctx: &CancellationToken) -> Result<(), MgmtError>;
}

/// One step in a composite's sequence: a nested resource plus the side
/// effect to run if that step changed something.
pub struct NestedResource {
    pub resource: Box<dyn Resource>,
    pub on_changed: Option<Box<dyn CompositeSideEffect>>,
}

impl NestedResource {
    pub fn new(resource: Box<dyn Resource>) -> Self {
        Self { resource, on_changed: None }
    }

    pub fn with_side_effect(resource: Box<dyn Resource>, effect: Box<dyn CompositeSideEffect>) -> Self {
        Self { resource, on_changed: Some(effect) }
    }
}

/// An ordered sequence of nested resources, all sharing the owning
/// resource's own handle — composite inheritance means refresh/send/recv
/// pulses propagate straight through without a per-child forwarding
/// handle (unlike the server-family absorb pattern in `mgmt-resources`).
#[derive(Default)]
pub struct Composite {
    steps: Vec<NestedResource>,
}

impl Composite {
    pub fn new(steps: Vec<NestedResource>) -> Self {
        Self { steps }
    }

    pub fn push(&mut self, step: NestedResource) {
        self.steps.push(step);
    }

    pub fn validate(&self) -> Result<(), MgmtError> {
        for step in &self.steps {
            step.resource.validate()?;
        }
        Ok(())
    }

    pub async fn init(&self, handle: Arc<dyn Handle>) -> Result<(), MgmtError> {
        for step in &self.steps {
            step.resource.init(handle.clone()).await?;
        }
        Ok(())
    }

    /// Run every nested resource's long-running `Watch` concurrently
    /// under the same cancellation token, returning once all have
    /// returned (normally only on cancellation) or the first one errors.
    pub async fn watch(&self, ctx: CancellationToken) -> Result<(), MgmtError> {
        let mut futures = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            futures.push(step.resource.watch(ctx.clone()));
        }
        let results = futures::future::join_all(futures).await;
        for result in results {
            result?;
        }
        Ok(())
    }

    /// Drive each nested resource's `CheckApply` in declared order.
    /// Aborts on the first error or the first step that does not
    /// converge, matching "a failure at any step aborts and is
    /// returned" — a later step never masks an earlier one's non-convergence.
    pub async fn check_apply(&self, ctx: &CancellationToken, apply: bool) -> Result<bool, MgmtError> {
        for step in &self.steps {
            let converged = step.resource.check_apply(ctx, apply).await?;
            if !converged {
                if let Some(effect) = &step.on_changed {
                    effect.run(ctx).await?;
                }
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn cleanup(&self) -> Result<(), MgmtError> {
        for step in &self.steps {
            step.resource.cleanup().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgmt_core::{MgmtError, ResourceMeta};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Step {
        meta: ResourceMeta,
        converges_after: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Resource for Step {
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
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(n + 1 >= self.converges_after)
        }
        async fn cleanup(&self) -> Result<(), MgmtError> {
            Ok(())
        }
        fn cmp(&self, _other: &dyn Resource) -> Result<(), MgmtError> {
            Ok(())
        }
        fn uids(&self) -> Vec<mgmt_core::Uid> {
            Vec::new()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn into_any(self: Box<Self>) -> Box<dyn Any> {
            self
        }
    }

    struct CountingSideEffect(Arc<AtomicUsize>);

    #[async_trait]
    impl CompositeSideEffect for CountingSideEffect {
        async fn run(&self, _ctx: &CancellationToken) -> Result<(), MgmtError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn step(name: &str, converges_after: usize) -> (NestedResource, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resource = Box::new(Step { meta: ResourceMeta::new("step", name), converges_after, calls: calls.clone() });
        (NestedResource::new(resource), calls)
    }

    #[tokio::test]
    async fn all_steps_converged_returns_true() {
        let (s1, _) = step("a", 1);
        let (s2, _) = step("b", 1);
        let composite = Composite::new(vec![s1, s2]);
        let ctx = CancellationToken::new();
        assert!(composite.check_apply(&ctx, true).await.unwrap());
    }

    #[tokio::test]
    async fn a_non_converged_step_stops_the_sequence() {
        let (s1, calls1) = step("a", 2);
        let (s2, calls2) = step("b", 1);
        let composite = Composite::new(vec![s1, s2]);
        let ctx = CancellationToken::new();
        let converged = composite.check_apply(&ctx, true).await.unwrap();
        assert!(!converged);
        assert_eq!(calls1.load(Ordering::SeqCst), 1);
        assert_eq!(calls2.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn side_effect_runs_only_when_its_step_changed() {
        let effect_calls = Arc::new(AtomicUsize::new(0));
        let (mut s1, calls1) = step("unit-file", 2);
        s1.on_changed = Some(Box::new(CountingSideEffect(effect_calls.clone())));
        let (s2, _) = step("service", 1);
        let composite = Composite::new(vec![s1, s2]);
        let ctx = CancellationToken::new();

        composite.check_apply(&ctx, true).await.unwrap();
        assert_eq!(effect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(calls1.load(Ordering::SeqCst), 1);

        let converged = composite.check_apply(&ctx, true).await.unwrap();
        assert!(converged);
        assert_eq!(effect_calls.load(Ordering::SeqCst), 1);
    }
}
