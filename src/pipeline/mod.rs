// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Units, graphs and the pipelines that run them
//!
//! Every run is an onion of [`Middleware`] around a context. Single units
//! go through a [`TaskPipeline`], [`JobPipeline`] or [`DeploymentPipeline`];
//! graphs of units go through a [`SequencePipeline`] built on top of one.

mod dag;
mod definition;
mod deployment;
mod job;
mod middleware;
mod options;
mod sequence;
mod stages;
mod task;
mod validation;

pub use dag::{DependencyGraph, GraphNode, MissingDependency, NodeEdges};
pub use definition::*;
pub use deployment::{
    DeploymentPipeline, DeploymentsPipeline, InvokeDirective, ResolveDeploymentHandler,
};
pub use job::{JobPipeline, RunJobTasks};
pub use middleware::{Middleware, Next, Pipeline};
pub use options::RunOptions;
pub use sequence::{
    FlattenTargets, RunSummary, RunUnits, SequenceContext, SequencePipeline, ValidateGraph,
};
pub use stages::{ResolveState, UnitFrame, UnitGate, UnitRun, UnitRunner, ValidateInputs};
pub use task::{InvokeHandler, ResolveHandler, TaskPipeline};
pub use validation::{RexfileValidator, ValidationResult};

/// Sequential pipeline over a graph of tasks
pub type TasksPipeline = SequencePipeline<Task>;

/// Sequential pipeline over a graph of jobs
pub type JobsPipeline = SequencePipeline<Job>;
