// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! # rexflow - Execution Engine for Tasks, Jobs and Deployments
//!
//! `rexflow` runs dependency-ordered units of work through composable
//! middleware pipelines.
//!
//! ## Features
//!
//! - **Dependency graphs** - Cycle and missing-dependency detection, target flattening
//! - **Middleware pipelines** - Onion-style stages around every unit and every run
//! - **Context propagation** - Outputs, env, secrets and variables flow downstream
//! - **Cancellation** - Hierarchical tokens with per-unit and global timeouts
//! - **Events** - Lifecycle and log messages on a broadcast bus
//! - **Secret masking** - Registered secrets never reach the output sink
//!
//! ## Quick Start
//!
//! ```bash
//! # Run every task in rexfile.yaml
//! rexflow task
//!
//! # Run one job and what it needs
//! rexflow job release
//!
//! # Deploy to production with a 10 minute ceiling
//! rexflow deploy --env prod --timeout 600
//! ```

pub mod cli;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod output;
pub mod pipeline;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use errors::{RexError, RexResult};
pub use events::{EventBus, LogLevel, Message};
pub use handlers::{DeploymentHandler, Handler, HandlerRegistry, Outputs};
pub use pipeline::{
    DependencyGraph, Deployment, DeploymentPipeline, Directive, Job, JobPipeline, Rexfile,
    RunOptions, RunSummary, Task, TaskPipeline,
};
pub use runtime::{CancelToken, ExecutionContext, Status, UnitContext, UnitResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
