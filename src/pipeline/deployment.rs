// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Deployment pipeline
//!
//! Dispatches one directive to a deployment handler, with the
//! `before:<directive>` hooks run first and the `after:<directive>` hooks
//! run last. Hooks are tasks and go through the task pipeline.

use async_trait::async_trait;
use std::sync::Arc;

use super::middleware::{Middleware, Next, Pipeline};
use super::sequence::SequencePipeline;
use super::stages::{ResolveState, UnitFrame, UnitGate, UnitRun, UnitRunner, ValidateInputs};
use super::{Deployment, Directive, TaskPipeline, UnitKind};
use crate::errors::{RexError, RexResult};
use crate::runtime::{ExecutionContext, Status, UnitContext};

/// Looks up the deployment handler and records the directive
pub struct ResolveDeploymentHandler {
    directive: Directive,
}

#[async_trait]
impl Middleware<UnitFrame<Deployment>> for ResolveDeploymentHandler {
    async fn handle(
        &self,
        frame: &mut UnitFrame<Deployment>,
        next: Next<'_, UnitFrame<Deployment>>,
    ) -> RexResult<()> {
        let key = &frame.unit.uses;
        let handler = frame
            .parent
            .handlers
            .deployment(key)
            .ok_or_else(|| RexError::HandlerNotFound { key: key.clone() })?;
        frame.deployment = Some(handler);
        frame.directive = self.directive;

        next.run(frame).await
    }
}

/// Runs before-hooks, the directive and after-hooks under the unit's scope
pub struct InvokeDirective {
    hooks: Arc<TaskPipeline>,
}

#[async_trait]
impl Middleware<UnitFrame<Deployment>> for InvokeDirective {
    async fn handle(
        &self,
        frame: &mut UnitFrame<Deployment>,
        _next: Next<'_, UnitFrame<Deployment>>,
    ) -> RexResult<()> {
        let handler = frame
            .deployment
            .clone()
            .ok_or_else(|| RexError::HandlerNotFound {
                key: frame.unit.uses.clone(),
            })?;
        let directive = frame.directive;
        let unit = Arc::clone(&frame.unit);
        let scope = frame.scope();

        frame.start()?;
        let baseline = frame.ctx.exec.clone();
        let ctx = &mut frame.ctx;
        let hooks = &self.hooks;
        let outcome = scope
            .guard(async move {
                run_hooks(hooks, &unit, &directive.before_hook(), ctx).await?;
                let outputs = handler.run_directive(directive, ctx).await?;
                run_hooks(hooks, &unit, &directive.after_hook(), ctx).await?;
                Ok(outputs)
            })
            .await;
        frame.capture_delta(&baseline);

        frame.result.succeed(outcome?)
    }
}

/// Run the hook tasks registered under `key`, in order. Each hook's changes
/// propagate to the next one and to the directive.
async fn run_hooks(
    hooks: &TaskPipeline,
    deployment: &Deployment,
    key: &str,
    ctx: &mut UnitContext,
) -> RexResult<()> {
    for task in deployment.hook(key) {
        tracing::debug!(deployment = %ctx.id(), hook = key, task = %task.spec.id, "running hook");

        let run = hooks
            .run(Arc::new(task.clone()), &ctx.exec, Status::Success)
            .await;
        ctx.exec.absorb(UnitKind::Task, &run.result, &run.delta);

        match run.result.status() {
            Status::Success | Status::Skipped => {}
            Status::Cancelled => {
                return Err(ctx.exec.token.error().unwrap_or_else(|| RexError::Cancelled {
                    reason: run.result.error.unwrap_or_else(|| "hook cancelled".into()),
                }));
            }
            _ => {
                return Err(RexError::HookFailed {
                    unit: ctx.id().to_string(),
                    hook: key.to_string(),
                    message: run
                        .result
                        .error
                        .unwrap_or_else(|| format!("hook task '{}' did not succeed", task.spec.id)),
                });
            }
        }
    }

    Ok(())
}

/// Pipeline running one directive against a single deployment
pub struct DeploymentPipeline {
    directive: Directive,
    pipeline: Pipeline<UnitFrame<Deployment>>,
}

impl DeploymentPipeline {
    pub fn new(directive: Directive) -> Self {
        let pipeline = Pipeline::new()
            .with(ResolveState)
            .with(UnitGate)
            .with(ResolveDeploymentHandler { directive })
            .with(ValidateInputs)
            .with(InvokeDirective {
                hooks: Arc::new(TaskPipeline::new()),
            });

        Self {
            directive,
            pipeline,
        }
    }

    pub fn directive(&self) -> Directive {
        self.directive
    }

    /// Sequential pipeline over a graph of deployments, all running
    /// `directive`
    pub fn sequence(directive: Directive) -> DeploymentsPipeline {
        SequencePipeline::new(Self::new(directive))
    }

    pub async fn run(
        &self,
        deployment: Arc<Deployment>,
        parent: &ExecutionContext,
        aggregate: Status,
    ) -> UnitRun {
        let mut frame = UnitFrame::new(deployment, parent, aggregate);

        if let Err(err) = self.pipeline.pipe(&mut frame).await {
            frame.settle(&err);
        }

        frame.finish()
    }
}

#[async_trait]
impl UnitRunner<Deployment> for DeploymentPipeline {
    async fn run_unit(
        &self,
        unit: Arc<Deployment>,
        parent: &ExecutionContext,
        aggregate: Status,
    ) -> UnitRun {
        self.run(unit, parent, aggregate).await
    }
}

/// Sequential pipeline over deployments for one directive
pub type DeploymentsPipeline = SequencePipeline<Deployment>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{DeploymentHandler, Handler, HandlerRegistry, InputSpec, Outputs};
    use crate::output::MemorySink;
    use crate::pipeline::{DependencyGraph, Task, Unit};
    use serde_json::Value;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Appends `<unit id>` to the journal
    struct Note(Journal);

    #[async_trait]
    impl Handler for Note {
        async fn run(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
            self.0.lock().unwrap().push(ctx.id().to_string());
            ctx.set_env("LAST_HOOK", ctx.id().to_string());
            Ok(Outputs::new())
        }
    }

    struct Refuse;

    #[async_trait]
    impl Handler for Refuse {
        async fn run(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
            Err(RexError::handler(ctx.id(), "not allowed"))
        }
    }

    /// Journals `<directive>:<id>` and sees the last hook's env
    struct Site(Journal);

    #[async_trait]
    impl DeploymentHandler for Site {
        fn inputs(&self) -> Vec<InputSpec> {
            vec![InputSpec::optional("region", "eu")]
        }

        async fn deploy(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
            let hook = ctx.exec.env.get("LAST_HOOK").cloned().unwrap_or_default();
            self.0
                .lock()
                .unwrap()
                .push(format!("deploy:{} after {}", ctx.id(), hook));
            let mut out = Outputs::new();
            out.insert(
                "region".into(),
                Value::from(ctx.exec.env["INPUT_REGION"].clone()),
            );
            Ok(out)
        }

        async fn rollback(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
            self.0.lock().unwrap().push(format!("rollback:{}", ctx.id()));
            Ok(Outputs::new())
        }
    }

    fn context(journal: &Journal) -> ExecutionContext {
        let mut registry = HandlerRegistry::new();
        registry
            .register_task("note", Note(journal.clone()))
            .register_task("refuse", Refuse)
            .register_deployment("site", Site(journal.clone()));
        ExecutionContext::new(Arc::new(registry), Arc::new(MemorySink::new()))
    }

    fn site() -> Deployment {
        Deployment::new("web", "site")
            .with_hook("before:deploy", Task::new("migrate", "note"))
            .with_hook("before:deploy", Task::new("warm", "note"))
            .with_hook("after:deploy", Task::new("notify", "note"))
            .with_hook("before:rollback", Task::new("snapshot", "note"))
    }

    #[tokio::test]
    async fn test_deploy_runs_hooks_around_directive() {
        let journal = Journal::default();
        let ctx = context(&journal);

        let run = DeploymentPipeline::new(Directive::Deploy)
            .run(Arc::new(site()), &ctx, Status::Pending)
            .await;

        assert_eq!(run.result.status(), Status::Success);
        assert_eq!(run.result.outputs["region"], "eu");
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["migrate", "warm", "deploy:web after warm", "notify"]
        );
        assert_eq!(run.delta.env["LAST_HOOK"], "notify");
    }

    #[tokio::test]
    async fn test_rollback_uses_its_own_hooks() {
        let journal = Journal::default();
        let ctx = context(&journal);

        let run = DeploymentPipeline::new(Directive::Rollback)
            .run(Arc::new(site()), &ctx, Status::Pending)
            .await;

        assert_eq!(run.result.status(), Status::Success);
        assert_eq!(*journal.lock().unwrap(), vec!["snapshot", "rollback:web"]);
    }

    #[tokio::test]
    async fn test_unsupported_directive_fails() {
        let journal = Journal::default();
        let ctx = context(&journal);

        let run = DeploymentPipeline::new(Directive::Destroy)
            .run(Arc::new(site()), &ctx, Status::Pending)
            .await;

        assert_eq!(run.result.status(), Status::Failure);
        assert_eq!(
            run.result.error.as_deref(),
            Some("Directive 'destroy' is not supported by 'web'")
        );
    }

    #[tokio::test]
    async fn test_gate_runs_before_handler_lookup() {
        let journal = Journal::default();
        let ctx = context(&journal);
        let unknown = Arc::new(Deployment::new("docs", "missing"));

        let skipped = DeploymentPipeline::new(Directive::Deploy)
            .run(unknown.clone(), &ctx, Status::Failure)
            .await;
        assert_eq!(skipped.result.status(), Status::Skipped);

        ctx.token.cancel_with("shutdown");
        let cancelled = DeploymentPipeline::new(Directive::Deploy)
            .run(unknown, &ctx, Status::Pending)
            .await;
        assert_eq!(cancelled.result.status(), Status::Cancelled);
        assert_eq!(cancelled.result.error.as_deref(), Some("Cancelled: shutdown"));
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_hook_aborts_directive() {
        let journal = Journal::default();
        let ctx = context(&journal);
        let deployment = Deployment::new("web", "site")
            .with_hook("before:deploy", Task::new("guard", "refuse"))
            .with_hook("before:deploy", Task::new("never", "note"));

        let run = DeploymentPipeline::new(Directive::Deploy)
            .run(Arc::new(deployment), &ctx, Status::Pending)
            .await;

        assert_eq!(run.result.status(), Status::Failure);
        assert_eq!(
            run.result.error.as_deref(),
            Some("Hook 'before:deploy' of 'web' did not succeed: 'guard' failed: not allowed")
        );
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_hook_does_not_abort() {
        let journal = Journal::default();
        let ctx = context(&journal);
        let deployment = Deployment::new("web", "site").with_hook(
            "before:deploy",
            Task::new("optional", "refuse").with_condition(false),
        );

        let run = DeploymentPipeline::new(Directive::Deploy)
            .run(Arc::new(deployment), &ctx, Status::Pending)
            .await;

        assert_eq!(run.result.status(), Status::Success);
        assert_eq!(*journal.lock().unwrap(), vec!["deploy:web after "]);
    }

    #[tokio::test]
    async fn test_deployments_sequence() {
        let journal = Journal::default();
        let ctx = context(&journal);
        let graph = Arc::new(
            DependencyGraph::from_nodes(vec![
                Deployment::new("api", "site").with_needs(["db"]),
                Deployment::new("db", "site"),
                Deployment::new("docs", "missing"),
            ])
            .unwrap(),
        );

        let summary = DeploymentPipeline::sequence(Directive::Deploy)
            .run(graph, &["api".to_string()], &ctx)
            .await;

        assert!(summary.is_success());
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["deploy:db after ", "deploy:api after "]
        );
    }
}
