// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Per-unit frame and the stages shared by the unit pipelines
//!
//! A [`UnitFrame`] is the context one unit's middleware chain works on.
//! The stages here are reused by the task, job and deployment pipelines.

use async_trait::async_trait;
use std::sync::Arc;

use super::middleware::{Middleware, Next};
use super::{Directive, Unit};
use crate::errors::{RexError, RexResult};
use crate::events::Message;
use crate::handlers::{apply_input_specs, DeploymentHandler, Handler, InputSpec};
use crate::runtime::{
    input_env_name, value_to_string, ContextDelta, ExecutionContext, Status, UnitContext,
    UnitResult, UnitScope,
};

/// Outcome of running one unit: its result and what it changed
#[derive(Debug, Clone)]
pub struct UnitRun {
    pub result: UnitResult,
    pub delta: ContextDelta,
}

/// Runs single units; implemented by the task, job and deployment pipelines
#[async_trait]
pub trait UnitRunner<U: Unit>: Send + Sync {
    /// Run `unit` under `parent`. `aggregate` is the status of the run so
    /// far and decides whether non-forced units are skipped.
    async fn run_unit(&self, unit: Arc<U>, parent: &ExecutionContext, aggregate: Status) -> UnitRun;
}

/// State threaded through one unit's middleware chain
pub struct UnitFrame<U> {
    pub unit: Arc<U>,
    /// Aggregate status of the enclosing run
    pub aggregate: Status,
    /// Context the unit was started from
    pub parent: ExecutionContext,
    /// Resolved state and derived context, once `ResolveState` ran
    pub ctx: UnitContext,
    pub scope: Option<UnitScope>,
    pub handler: Option<Arc<dyn Handler>>,
    pub deployment: Option<Arc<dyn DeploymentHandler>>,
    pub directive: Directive,
    pub result: UnitResult,
    pub delta: ContextDelta,
}

impl<U: Unit> UnitFrame<U> {
    pub fn new(unit: Arc<U>, parent: &ExecutionContext, aggregate: Status) -> Self {
        let id = unit.spec().id.clone();
        let mut ctx = UnitContext {
            kind: U::KIND,
            state: Default::default(),
            exec: parent.clone(),
        };
        ctx.state.id = id.clone();
        ctx.state.name = unit.spec().display_name().to_string();

        Self {
            unit,
            aggregate,
            parent: parent.clone(),
            ctx,
            scope: None,
            handler: None,
            deployment: None,
            directive: Directive::default(),
            result: UnitResult::new(id),
            delta: ContextDelta::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.result.id
    }

    /// The unit's scope; a fresh one if `ResolveState` has not run
    pub fn scope(&self) -> UnitScope {
        self.scope.clone().unwrap_or_else(|| {
            self.parent
                .coordinator
                .scope(&self.parent.token, self.ctx.state.timeout)
        })
    }

    /// Mark the unit running and announce it
    pub fn start(&mut self) -> RexResult<()> {
        self.result.start()?;
        tracing::info!(kind = %U::KIND, id = %self.id(), "starting");
        self.parent.bus.send(&Message::Started {
            unit: U::KIND,
            id: self.ctx.state.id.clone(),
            name: self.ctx.state.name.clone(),
        });
        Ok(())
    }

    /// Record the changes the unit made against `baseline`
    pub fn capture_delta(&mut self, baseline: &ExecutionContext) {
        self.delta = ContextDelta::between(baseline, &self.ctx.exec);
    }

    fn input_specs(&self) -> Vec<InputSpec> {
        match (&self.handler, &self.deployment) {
            (Some(handler), _) => handler.inputs(),
            (None, Some(deployment)) => deployment.inputs(),
            (None, None) => Vec::new(),
        }
    }

    /// Turn an error that escaped the chain into the unit's outcome
    pub fn settle(&mut self, error: &RexError) {
        if self.result.status().is_terminal() {
            tracing::warn!(id = %self.id(), error = %error, "error after unit finished");
            return;
        }

        if let Err(e) = self.result.settle(error) {
            tracing::warn!(id = %self.id(), error = %e, "could not record unit outcome");
        }

        if !error.is_cancellation() {
            self.parent
                .bus
                .error_with(error, format!("{} '{}' failed", U::KIND, self.id()));
        }
    }

    /// Close the frame: a unit the chain left unfinished counts as skipped,
    /// and the finished message goes out
    pub fn finish(mut self) -> UnitRun {
        if !self.result.status().is_terminal() {
            let _ = match self.result.status() {
                Status::Running => self.result.fail(&RexError::handler(
                    &self.result.id.clone(),
                    "unit did not report an outcome",
                )),
                _ => self.result.skip("not run"),
            };
        }

        tracing::info!(
            kind = %U::KIND,
            id = %self.result.id,
            status = %self.result.status(),
            "finished"
        );
        self.parent
            .bus
            .send(&Message::finished(U::KIND, self.result.clone()));

        UnitRun {
            result: self.result,
            delta: self.delta,
        }
    }
}

/// Resolves the unit's dynamic fields and derives its scope and context
pub struct ResolveState;

#[async_trait]
impl<U: Unit> Middleware<UnitFrame<U>> for ResolveState {
    async fn handle(&self, frame: &mut UnitFrame<U>, next: Next<'_, UnitFrame<U>>) -> RexResult<()> {
        let state = frame.unit.spec().resolve(&frame.parent);
        let scope = frame
            .parent
            .coordinator
            .scope(&frame.parent.token, state.timeout);

        frame.ctx.exec = frame.parent.derive(&state, scope.token().clone());
        frame.ctx.state = state;
        frame.scope = Some(scope);

        next.run(frame).await
    }
}

/// Applies input defaults, checks required inputs and projects every input
/// into env as `INPUT_<NAME>`
pub struct ValidateInputs;

#[async_trait]
impl<U: Unit> Middleware<UnitFrame<U>> for ValidateInputs {
    async fn handle(&self, frame: &mut UnitFrame<U>, next: Next<'_, UnitFrame<U>>) -> RexResult<()> {
        let specs = frame.input_specs();
        let id = frame.ctx.state.id.clone();
        apply_input_specs(&id, &specs, &mut frame.ctx.state.inputs)?;

        if let Some(handler) = &frame.handler {
            handler.validate(&id, &frame.ctx.state.inputs)?;
        }
        if let Some(deployment) = &frame.deployment {
            deployment.validate(&id, &frame.ctx.state.inputs)?;
        }

        for (name, value) in &frame.ctx.state.inputs {
            frame
                .ctx
                .exec
                .env
                .insert(input_env_name(name), value_to_string(value));
        }

        next.run(frame).await
    }
}

/// Decides whether the unit runs at all
///
/// A cancelled parent token cancels the unit. A failed or cancelled run
/// skips it unless it is forced, and a false `if` skips it.
pub struct UnitGate;

#[async_trait]
impl<U: Unit> Middleware<UnitFrame<U>> for UnitGate {
    async fn handle(&self, frame: &mut UnitFrame<U>, next: Next<'_, UnitFrame<U>>) -> RexResult<()> {
        if let Some(reason) = frame.parent.token.reason() {
            tracing::debug!(id = %frame.id(), %reason, "parent cancelled");
            return frame.result.cancel(reason.to_string());
        }

        if frame.aggregate.blocks_followers() && !frame.ctx.state.force {
            return frame
                .result
                .skip(format!("skipped: run is already {}", frame.aggregate));
        }

        if !frame.ctx.state.condition {
            return frame.result.skip("skipped: condition is false");
        }

        next.run(frame).await
    }
}
