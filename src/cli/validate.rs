// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Validate command - check rexfile configuration

use colored::Colorize;
use miette::Result;
use std::path::Path;

use crate::handlers::HandlerRegistry;
use crate::pipeline::{Rexfile, RexfileValidator};

/// Run the validate command
pub async fn run(rexfile_path: &Path, verbose: bool) -> Result<()> {
    println!("{}", "Validating rexfile...".bold());
    println!();

    if !rexfile_path.exists() {
        return Err(miette::miette!(
            "Rexfile not found: {}\n\n\
             Pass one with --file or create rexfile.yaml.",
            rexfile_path.display()
        ));
    }

    let rexfile = match Rexfile::from_file(rexfile_path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("  {} Failed to parse rexfile", "✗".red());
            eprintln!();
            return Err(miette::miette!("Parse error: {}", e));
        }
    };

    println!("  {} Rexfile is valid YAML", "✓".green());

    let handlers = HandlerRegistry::with_builtins();
    let validation = RexfileValidator::validate(&rexfile, &handlers);
    let missing_secrets = RexfileValidator::missing_secrets(&rexfile);

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    if !missing_secrets.is_empty() {
        println!();
        println!("{}:", "Unset secrets".yellow().bold());
        for name in &missing_secrets {
            println!("  {} {}", "⚠".yellow(), name);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    if verbose {
        println!();
        println!("{}:", "Rexfile summary".bold());
        if let Some(name) = &rexfile.name {
            println!("  Name: {}", name);
        }
        println!("  Tasks: {}", rexfile.tasks.len());
        println!("  Jobs: {}", rexfile.jobs.len());
        println!("  Deployments: {}", rexfile.deployments.len());
        println!("  Handlers: {}", handlers.task_keys().join(", "));
    }

    println!();

    if !validation.is_valid() {
        Err(miette::miette!("Rexfile validation failed"))
    } else if validation.has_warnings() || !missing_secrets.is_empty() {
        println!("{}", "Rexfile is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Rexfile is valid!".green().bold());
        Ok(())
    }
}
