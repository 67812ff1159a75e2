// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! rexflow - Execution engine for tasks, jobs and deployments

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rexflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rexflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let kind = cli.command.run_kind();

    // Dispatch to command handlers
    match cli.command {
        Commands::Task(args)
        | Commands::Job(args)
        | Commands::Deploy(args)
        | Commands::Rollback(args)
        | Commands::Destroy(args) => match kind {
            Some(kind) => rexflow::cli::run::run(&cli.file, kind, args, cli.verbose).await,
            None => Err(miette::miette!("Not a run command")),
        },
        Commands::Validate => rexflow::cli::validate::run(&cli.file, cli.verbose).await,
        Commands::Graph { kind, format } => {
            rexflow::cli::graph::run(&cli.file, kind, format, cli.verbose).await
        }
        Commands::List => rexflow::cli::list::run(&cli.file, cli.verbose).await,
    }
}
