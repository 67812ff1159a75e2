// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Task pipeline
//!
//! Runs one task: resolve its state, look up its handler, validate inputs,
//! pass the gate, then call the handler under the unit's scope.

use async_trait::async_trait;
use std::sync::Arc;

use super::middleware::{Middleware, Next, Pipeline};
use super::sequence::SequencePipeline;
use super::stages::{ResolveState, UnitFrame, UnitGate, UnitRun, UnitRunner, ValidateInputs};
use super::{Task, TasksPipeline};
use crate::errors::{RexError, RexResult};
use crate::runtime::{ExecutionContext, Status};

/// Looks up the task's handler in the run's registry
pub struct ResolveHandler;

#[async_trait]
impl Middleware<UnitFrame<Task>> for ResolveHandler {
    async fn handle(&self, frame: &mut UnitFrame<Task>, next: Next<'_, UnitFrame<Task>>) -> RexResult<()> {
        let key = &frame.unit.uses;
        let handler = frame
            .parent
            .handlers
            .task(key)
            .ok_or_else(|| RexError::HandlerNotFound { key: key.clone() })?;
        frame.handler = Some(handler);

        next.run(frame).await
    }
}

/// Calls the handler under the unit's timeout and cancellation scope
pub struct InvokeHandler;

#[async_trait]
impl Middleware<UnitFrame<Task>> for InvokeHandler {
    async fn handle(&self, frame: &mut UnitFrame<Task>, _next: Next<'_, UnitFrame<Task>>) -> RexResult<()> {
        let handler = frame
            .handler
            .clone()
            .ok_or_else(|| RexError::HandlerNotFound {
                key: frame.unit.uses.clone(),
            })?;
        let scope = frame.scope();

        frame.start()?;
        let baseline = frame.ctx.exec.clone();
        let outcome = scope.guard(handler.run(&mut frame.ctx)).await;
        frame.capture_delta(&baseline);

        let outputs = outcome?;
        frame.result.succeed(outputs)
    }
}

/// Pipeline running a single task
pub struct TaskPipeline {
    pipeline: Pipeline<UnitFrame<Task>>,
}

impl Default for TaskPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskPipeline {
    pub fn new() -> Self {
        let pipeline = Pipeline::new()
            .with(ResolveState)
            .with(UnitGate)
            .with(ResolveHandler)
            .with(ValidateInputs)
            .with(InvokeHandler);

        Self { pipeline }
    }

    /// Sequential pipeline over a graph of tasks
    pub fn sequence() -> TasksPipeline {
        SequencePipeline::new(Self::new())
    }

    /// Run one task. Errors never escape: they become the task's result
    /// and an `error` message on the bus.
    pub async fn run(&self, task: Arc<Task>, parent: &ExecutionContext, aggregate: Status) -> UnitRun {
        let mut frame = UnitFrame::new(task, parent, aggregate);

        if let Err(err) = self.pipeline.pipe(&mut frame).await {
            frame.settle(&err);
        }

        frame.finish()
    }
}

#[async_trait]
impl UnitRunner<Task> for TaskPipeline {
    async fn run_unit(&self, unit: Arc<Task>, parent: &ExecutionContext, aggregate: Status) -> UnitRun {
        self.run(unit, parent, aggregate).await
    }
}
