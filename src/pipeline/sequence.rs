// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Sequential multi-unit pipeline
//!
//! Validates a graph, flattens the requested targets and runs the units one
//! at a time, propagating each unit's outputs and context changes forward.

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::sync::Arc;

use super::middleware::{Middleware, Next, Pipeline};
use super::stages::UnitRunner;
use super::{DependencyGraph, GraphNode, Unit};
use crate::errors::{RexError, RexResult};
use crate::events::Message;
use crate::runtime::{ExecutionContext, Status, UnitResult};

/// Outcome of a sequential run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Results in execution order
    pub results: Vec<UnitResult>,
    /// Aggregate status
    pub status: Status,
    /// Error that aborted the run, if any
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<RexError>,
}

fn serialize_error<S: Serializer>(error: &Option<RexError>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn result(&self, id: &str) -> Option<&UnitResult> {
        self.results.iter().find(|r| r.id == id)
    }

    /// Number of results with the given status
    pub fn count(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }
}

/// State of one sequential run
pub struct SequenceContext<U> {
    pub graph: Arc<DependencyGraph<U>>,
    /// Requested targets; empty means every unit
    pub targets: Vec<String>,
    /// Context units are derived from; absorbs each finished unit
    pub exec: ExecutionContext,
    /// Flattened run order
    pub order: Vec<Arc<U>>,
    pub results: Vec<UnitResult>,
    pub status: Status,
}

impl<U> SequenceContext<U> {
    pub fn new(graph: Arc<DependencyGraph<U>>, targets: Vec<String>, exec: ExecutionContext) -> Self {
        Self {
            graph,
            targets,
            exec,
            order: Vec::new(),
            results: Vec::new(),
            status: Status::Pending,
        }
    }
}

/// Rejects graphs with cycles or missing dependencies
pub struct ValidateGraph;

#[async_trait]
impl<U: Unit> Middleware<SequenceContext<U>> for ValidateGraph {
    async fn handle(&self, ctx: &mut SequenceContext<U>, next: Next<'_, SequenceContext<U>>) -> RexResult<()> {
        let cyclic: Vec<String> = ctx
            .graph
            .find_cyclical_references()
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        if !cyclic.is_empty() {
            ctx.exec.bus.send(&Message::CyclicalReferences {
                unit: U::KIND,
                ids: cyclic.clone(),
            });
            return Err(RexError::CircularDependency { ids: cyclic });
        }

        let missing = ctx.graph.missing_dependencies();
        if let Some(first) = missing.first() {
            let error = RexError::UnknownDependency {
                unit: first.id.clone(),
                dependency: first.missing.first().cloned().unwrap_or_default(),
            };
            ctx.exec.bus.send(&Message::MissingDependencies {
                unit: U::KIND,
                missing,
            });
            return Err(error);
        }

        next.run(ctx).await
    }
}

/// Resolves the run order for the requested targets
pub struct FlattenTargets;

#[async_trait]
impl<U: Unit> Middleware<SequenceContext<U>> for FlattenTargets {
    async fn handle(&self, ctx: &mut SequenceContext<U>, next: Next<'_, SequenceContext<U>>) -> RexResult<()> {
        ctx.order = if ctx.targets.is_empty() {
            ctx.graph.flatten_all()?
        } else {
            ctx.graph.flatten(&ctx.targets)?
        };

        tracing::debug!(
            kind = %U::KIND,
            order = ?ctx.order.iter().map(|u| u.id().to_string()).collect::<Vec<_>>(),
            "resolved run order"
        );

        next.run(ctx).await
    }
}

/// Runs every unit in order and folds the results into the aggregate
pub struct RunUnits<U: Unit> {
    runner: Arc<dyn UnitRunner<U>>,
}

#[async_trait]
impl<U: Unit> Middleware<SequenceContext<U>> for RunUnits<U> {
    async fn handle(&self, ctx: &mut SequenceContext<U>, next: Next<'_, SequenceContext<U>>) -> RexResult<()> {
        let order = std::mem::take(&mut ctx.order);

        for unit in &order {
            let run = self
                .runner
                .run_unit(Arc::clone(unit), &ctx.exec, ctx.status)
                .await;

            ctx.exec.absorb(U::KIND, &run.result, &run.delta);

            if !ctx.status.blocks_followers() && run.result.status().blocks_followers() {
                ctx.status = run.result.status();
            }
            ctx.results.push(run.result);
        }

        ctx.order = order;
        if !ctx.status.blocks_followers() {
            ctx.status = Status::Success;
        }

        next.run(ctx).await
    }
}

/// Sequential pipeline over a graph of units of one kind
pub struct SequencePipeline<U: Unit> {
    pipeline: Pipeline<SequenceContext<U>>,
}

impl<U: Unit> SequencePipeline<U> {
    pub fn new(runner: impl UnitRunner<U> + 'static) -> Self {
        let runner: Arc<dyn UnitRunner<U>> = Arc::new(runner);
        let pipeline = Pipeline::new()
            .with(ValidateGraph)
            .with(FlattenTargets)
            .with(RunUnits { runner });

        Self { pipeline }
    }

    /// Run `targets` (every unit when empty) from a copy of `parent`
    pub async fn run(
        &self,
        graph: Arc<DependencyGraph<U>>,
        targets: &[String],
        parent: &ExecutionContext,
    ) -> RunSummary {
        let mut exec = parent.clone();
        self.run_with_context(graph, targets, &mut exec).await
    }

    /// Like [`SequencePipeline::run`], leaving the propagated state of every
    /// unit in `exec`
    pub async fn run_with_context(
        &self,
        graph: Arc<DependencyGraph<U>>,
        targets: &[String],
        exec: &mut ExecutionContext,
    ) -> RunSummary {
        let mut ctx = SequenceContext::new(graph, targets.to_vec(), exec.clone());

        let error = match self.pipeline.pipe(&mut ctx).await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(kind = %U::KIND, error = %err, "run aborted");
                ctx.exec
                    .bus
                    .error_with(&err, format!("{} run aborted", U::KIND));
                ctx.status = Status::Failure;
                Some(err)
            }
        };

        *exec = ctx.exec;
        RunSummary {
            results: ctx.results,
            status: ctx.status,
            error,
        }
    }
}
