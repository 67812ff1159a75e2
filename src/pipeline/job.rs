// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Job pipeline
//!
//! A job runs its tasks as a nested sequence under the job's own scope.
//! The job's outputs are the `tasks.*` outputs of that nested run, and its
//! status mirrors the nested aggregate.

use async_trait::async_trait;
use std::sync::Arc;

use super::middleware::{Middleware, Next, Pipeline};
use super::sequence::{RunSummary, SequencePipeline};
use super::stages::{ResolveState, UnitFrame, UnitGate, UnitRun, UnitRunner};
use super::{Job, JobsPipeline, Task, TaskPipeline, UnitKind};
use crate::errors::{RexError, RexResult};
use crate::handlers::Outputs;
use crate::runtime::{ExecutionContext, Status};

/// Runs the job's tasks and mirrors their aggregate
pub struct RunJobTasks {
    tasks: SequencePipeline<Task>,
}

#[async_trait]
impl Middleware<UnitFrame<Job>> for RunJobTasks {
    async fn handle(&self, frame: &mut UnitFrame<Job>, _next: Next<'_, UnitFrame<Job>>) -> RexResult<()> {
        let graph = Arc::new(frame.unit.task_graph()?);
        let scope = frame.scope();

        frame.start()?;
        let baseline = frame.ctx.exec.clone();
        let exec = &mut frame.ctx.exec;
        let tasks = &self.tasks;
        let outcome = scope
            .guard(async move { Ok(tasks.run_with_context(graph, &[], exec).await) })
            .await;
        frame.capture_delta(&baseline);

        let summary = outcome?;
        let id = frame.id().to_string();
        match summary.status {
            Status::Cancelled => frame.result.cancel(cancel_reason(&summary)),
            Status::Failure => frame.result.fail(&failure(&id, &summary)),
            _ => frame
                .result
                .succeed(task_outputs(&baseline.outputs, &frame.ctx.exec.outputs)),
        }
    }
}

/// `tasks.*` outputs the nested run added or changed
fn task_outputs(before: &Outputs, after: &Outputs) -> Outputs {
    let prefix = format!("{}.", UnitKind::Task.plural());
    after
        .iter()
        .filter(|(key, value)| key.starts_with(&prefix) && before.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn cancel_reason(summary: &RunSummary) -> String {
    summary
        .results
        .iter()
        .find(|r| r.status() == Status::Cancelled)
        .and_then(|r| r.error.clone())
        .unwrap_or_else(|| "cancelled".to_string())
}

fn failure(job: &str, summary: &RunSummary) -> RexError {
    if let Some(error) = &summary.error {
        return error.clone();
    }

    let message = summary
        .results
        .iter()
        .find(|r| r.status() == Status::Failure)
        .map(|r| {
            format!(
                "task '{}' failed: {}",
                r.id,
                r.error.as_deref().unwrap_or("unknown error")
            )
        })
        .unwrap_or_else(|| "a task failed".to_string());
    RexError::handler(job, message)
}

/// Pipeline running a single job
pub struct JobPipeline {
    pipeline: Pipeline<UnitFrame<Job>>,
}

impl Default for JobPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl JobPipeline {
    pub fn new() -> Self {
        let pipeline = Pipeline::new()
            .with(ResolveState)
            .with(UnitGate)
            .with(RunJobTasks {
                tasks: TaskPipeline::sequence(),
            });

        Self { pipeline }
    }

    /// Sequential pipeline over a graph of jobs
    pub fn sequence() -> JobsPipeline {
        SequencePipeline::new(Self::new())
    }

    pub async fn run(&self, job: Arc<Job>, parent: &ExecutionContext, aggregate: Status) -> UnitRun {
        let mut frame = UnitFrame::new(job, parent, aggregate);

        if let Err(err) = self.pipeline.pipe(&mut frame).await {
            frame.settle(&err);
        }

        frame.finish()
    }
}

#[async_trait]
impl UnitRunner<Job> for JobPipeline {
    async fn run_unit(&self, unit: Arc<Job>, parent: &ExecutionContext, aggregate: Status) -> UnitRun {
        self.run(unit, parent, aggregate).await
    }
}
