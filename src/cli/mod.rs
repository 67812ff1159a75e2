// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for rexflow.

pub mod graph;
pub mod list;
pub mod report;
pub mod run;
pub mod validate;

use clap::{Args, Parser, Subcommand};
use miette::Result;
use std::path::{Path, PathBuf};

use crate::errors::RexError;
use crate::pipeline::{Directive, Rexfile, UnitKind};

/// Default rexfile name
pub const DEFAULT_REXFILE: &str = "rexfile.yaml";

/// Execution engine for tasks, jobs and deployments
#[derive(Parser, Debug)]
#[clap(
    name = "rexflow",
    version,
    about = "Run dependency-ordered tasks, jobs and deployments",
    long_about = None,
    after_help = "Examples:\n\
        rexflow task                    Run every task\n\
        rexflow task test lint          Run two tasks and what they need\n\
        rexflow job release             Run a job\n\
        rexflow deploy --env prod       Deploy every deployment to prod\n\
        rexflow graph --kind jobs       Show the job graph\n\n\
        See 'rexflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Rexfile to load
    #[clap(short, long, global = true, default_value = DEFAULT_REXFILE, value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run tasks
    Task(RunArgs),

    /// Run jobs
    Job(RunArgs),

    /// Deploy
    Deploy(RunArgs),

    /// Roll deployments back
    Rollback(RunArgs),

    /// Tear deployments down
    Destroy(RunArgs),

    /// Validate the rexfile
    Validate,

    /// Show a dependency graph
    Graph {
        /// Which units to draw
        #[clap(short, long, default_value = "tasks")]
        kind: GraphKind,

        /// Output format
        #[clap(short = 'o', long, default_value = "text")]
        format: GraphFormat,
    },

    /// List tasks, jobs and deployments
    List,
}

impl Commands {
    /// What a run command runs
    pub fn run_kind(&self) -> Option<RunKind> {
        match self {
            Self::Task(_) => Some(RunKind::Tasks),
            Self::Job(_) => Some(RunKind::Jobs),
            Self::Deploy(_) => Some(RunKind::Deployments(Directive::Deploy)),
            Self::Rollback(_) => Some(RunKind::Deployments(Directive::Rollback)),
            Self::Destroy(_) => Some(RunKind::Deployments(Directive::Destroy)),
            _ => None,
        }
    }
}

/// Arguments shared by the run commands
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Units to run, with everything they need (default: all)
    pub targets: Vec<String>,

    /// Timeout ceiling for every unit, in seconds
    #[clap(short, long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Target environment
    #[clap(short, long, default_value = "default")]
    pub env: String,

    /// Print the run summary as JSON
    #[clap(long)]
    pub json: bool,

    /// Extra arguments passed through to handlers
    #[clap(last = true)]
    pub args: Vec<String>,
}

/// What a run command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Tasks,
    Jobs,
    Deployments(Directive),
}

impl RunKind {
    pub fn unit(self) -> UnitKind {
        match self {
            Self::Tasks => UnitKind::Task,
            Self::Jobs => UnitKind::Job,
            Self::Deployments(_) => UnitKind::Deployment,
        }
    }
}

/// Unit kind for the graph command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphKind(pub UnitKind);

impl std::str::FromStr for GraphKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" | "tasks" => Ok(Self(UnitKind::Task)),
            "job" | "jobs" => Ok(Self(UnitKind::Job)),
            "deployment" | "deployments" => Ok(Self(UnitKind::Deployment)),
            _ => Err(format!("Unknown unit kind: {}", s)),
        }
    }
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

/// Load a rexfile, turning a missing file into a diagnostic
pub fn load_rexfile(path: &Path) -> Result<Rexfile> {
    if !path.exists() {
        return Err(RexError::RexfileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    Ok(Rexfile::from_file(path)?)
}
