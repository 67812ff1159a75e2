// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Run commands - execute tasks, jobs or a deployment directive

use colored::Colorize;
use miette::Result;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use super::report::{console_listener, print_summary};
use super::{load_rexfile, RunArgs, RunKind};
use crate::events::{tracing_listener, LogLevel};
use crate::handlers::HandlerRegistry;
use crate::output::{ConsoleSink, OutputSink};
use crate::pipeline::{
    DeploymentPipeline, JobPipeline, Rexfile, RexfileValidator, RunOptions, RunSummary,
    TaskPipeline,
};
use crate::runtime::{ExecutionContext, Status};

/// Run a command against the rexfile at `rexfile_path`
pub async fn run(rexfile_path: &Path, kind: RunKind, args: RunArgs, verbose: bool) -> Result<()> {
    let rexfile = load_rexfile(rexfile_path)?;
    let handlers = Arc::new(HandlerRegistry::with_builtins());

    let validation = RexfileValidator::validate(&rexfile, &handlers);

    if !validation.is_valid() {
        eprintln!("{}", "Rexfile validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Rexfile configuration is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Rexfile warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let options = RunOptions {
        targets: args.targets,
        timeout: args.timeout,
        environment: args.env,
        args: args.args,
        log_level: if verbose { LogLevel::Debug } else { LogLevel::Info },
        cwd: Some(std::env::current_dir().map_err(|e| {
            miette::miette!("Failed to get current directory: {}", e)
        })?),
    };

    let sink = Arc::new(ConsoleSink::new().quiet(args.json));
    let ctx = options.root_context(&rexfile, handlers, sink.clone());

    if !args.json {
        ctx.bus.subscribe(console_listener(sink.clone()));
    }
    if verbose {
        ctx.bus.subscribe(tracing_listener());
    }

    let token = ctx.token.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling run");
            token.cancel_with("Interrupted");
        }
    });

    let summary = execute(&rexfile, kind, &options.targets, &ctx).await?;
    interrupt.abort();

    if args.json {
        println!("{}", summary_json(&summary, sink.as_ref())?);
    } else {
        print_summary(&summary);
    }

    match summary.status {
        Status::Success => Ok(()),
        status => Err(miette::miette!(
            "{} run finished with status '{}'",
            kind.unit(),
            status
        )),
    }
}

/// Run the graph for `kind` from the root context
pub async fn execute(
    rexfile: &Rexfile,
    kind: RunKind,
    targets: &[String],
    ctx: &ExecutionContext,
) -> Result<RunSummary> {
    let summary = match kind {
        RunKind::Tasks => {
            let graph = Arc::new(rexfile.task_graph()?);
            TaskPipeline::sequence().run(graph, targets, ctx).await
        }
        RunKind::Jobs => {
            let graph = Arc::new(rexfile.job_graph()?);
            JobPipeline::sequence().run(graph, targets, ctx).await
        }
        RunKind::Deployments(directive) => {
            let graph = Arc::new(rexfile.deployment_graph()?);
            DeploymentPipeline::sequence(directive)
                .run(graph, targets, ctx)
                .await
        }
    };

    Ok(summary)
}

/// The summary as pretty JSON, with every string passed through the sink's
/// secret masking
pub fn summary_json(summary: &RunSummary, sink: &dyn OutputSink) -> Result<String> {
    let mut value = serde_json::to_value(summary)
        .map_err(|e| miette::miette!("Failed to serialize summary: {}", e))?;
    redact_strings(&mut value, sink);

    serde_json::to_string_pretty(&value)
        .map_err(|e| miette::miette!("Failed to serialize summary: {}", e))
}

fn redact_strings(value: &mut Value, sink: &dyn OutputSink) {
    match value {
        Value::String(text) => *text = sink.redact(text),
        Value::Array(items) => items.iter_mut().for_each(|v| redact_strings(v, sink)),
        Value::Object(map) => map.values_mut().for_each(|v| redact_strings(v, sink)),
        _ => {}
    }
}
