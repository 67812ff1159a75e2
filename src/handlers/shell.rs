// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Shell handlers
//!
//! Run the `run` input through a shell. The unit's env and working
//! directory apply. Stdout lines of the form `::<command> name=<key>::<value>`
//! are workflow commands rather than output:
//!
//! - `::set-output name=version::1.2.3` adds an output
//! - `::set-env name=REGION::eu` sets an env var for later units
//! - `::add-secret name=TOKEN::abc` registers a secret
//!
//! Stdout and stderr are forwarded to the unit's sink line by line while the
//! command runs.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{unsupported, DeploymentHandler, Handler, InputSpec, Outputs};
use crate::errors::{RexError, RexResult};
use crate::pipeline::Directive;
use crate::runtime::UnitContext;

const DEFAULT_SHELL: &str = "sh";

/// Task handler running a shell command
#[derive(Debug, Clone)]
pub struct ShellHandler {
    shell: String,
}

impl ShellHandler {
    pub fn new() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    /// Use a different default shell (e.g. `bash`)
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for ShellHandler {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("run"),
            InputSpec::optional("shell", self.shell.clone()),
        ]
    }

    fn validate(&self, unit: &str, inputs: &Outputs) -> RexResult<()> {
        match inputs.get("run") {
            Some(Value::String(command)) if !command.trim().is_empty() => Ok(()),
            _ => Err(RexError::handler(unit, "Shell command is empty")),
        }
    }

    async fn run(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
        let command = ctx.input_str("run").unwrap_or_default();
        let shell = ctx
            .input_str("shell")
            .unwrap_or_else(|| self.shell.clone());
        run_script(ctx, &shell, &command).await
    }
}

/// Deployment handler with one shell command per directive
///
/// Inputs `deploy`, `rollback` and `destroy` hold the commands; a directive
/// without a command is unsupported.
#[derive(Debug, Clone, Default)]
pub struct ShellDeployment {
    inner: ShellHandler,
}

impl ShellDeployment {
    pub fn new() -> Self {
        Self::default()
    }

    async fn directive(&self, ctx: &mut UnitContext, directive: Directive) -> RexResult<Outputs> {
        let Some(command) = ctx.input_str(&directive.to_string()) else {
            return Err(unsupported(ctx, directive));
        };

        let shell = ctx
            .input_str("shell")
            .unwrap_or_else(|| self.inner.shell.clone());
        run_script(ctx, &shell, &command).await
    }
}

#[async_trait]
impl DeploymentHandler for ShellDeployment {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("deploy"),
            InputSpec::optional("shell", self.inner.shell.clone()),
        ]
    }

    async fn deploy(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
        self.directive(ctx, Directive::Deploy).await
    }

    async fn rollback(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
        self.directive(ctx, Directive::Rollback).await
    }

    async fn destroy(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
        self.directive(ctx, Directive::Destroy).await
    }
}

/// A `::command name=key::value` line
#[derive(Debug, PartialEq)]
enum WorkflowCommand<'a> {
    SetOutput(&'a str, &'a str),
    SetEnv(&'a str, &'a str),
    AddSecret(&'a str, &'a str),
}

fn parse_command(line: &str) -> Option<WorkflowCommand<'_>> {
    let rest = line.strip_prefix("::")?;
    let (head, value) = rest.split_once("::")?;
    let (command, name) = head.split_once(' ')?;
    let name = name.strip_prefix("name=")?.trim();
    if name.is_empty() {
        return None;
    }

    match command {
        "set-output" => Some(WorkflowCommand::SetOutput(name, value)),
        "set-env" => Some(WorkflowCommand::SetEnv(name, value)),
        "add-secret" => Some(WorkflowCommand::AddSecret(name, value)),
        _ => None,
    }
}

async fn run_script(ctx: &mut UnitContext, shell: &str, command: &str) -> RexResult<Outputs> {
    let unit = ctx.id().to_string();
    let io_error = |e: std::io::Error| RexError::handler(&unit, e.to_string());

    which::which(shell)
        .map_err(|e| RexError::handler(&unit, format!("Shell '{}' is not available: {}", shell, e)))?;

    tracing::debug!(%unit, %shell, "running shell command");

    // Killed if the unit's timeout or cancellation drops this future
    let mut child = Command::new(shell)
        .arg("-c")
        .arg(command)
        .current_dir(&ctx.exec.cwd)
        .envs(&ctx.exec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(io_error)?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(RexError::handler(&unit, "command output was not captured"));
    };
    let mut stdout = BufReader::new(stdout).lines();
    let mut stderr = BufReader::new(stderr).lines();
    let (mut stdout_open, mut stderr_open) = (true, true);

    let mut outputs = Outputs::new();
    let mut printed = Vec::new();
    let mut last_error = String::new();

    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout.next_line(), if stdout_open => match line.map_err(io_error)? {
                Some(line) => match parse_command(&line) {
                    Some(WorkflowCommand::SetOutput(name, value)) => {
                        outputs.insert(name.to_string(), Value::String(value.to_string()));
                    }
                    Some(WorkflowCommand::SetEnv(name, value)) => ctx.set_env(name, value),
                    Some(WorkflowCommand::AddSecret(name, value)) => ctx.set_secret(name, value),
                    None => {
                        ctx.exec.writer.write_line(&line);
                        printed.push(line);
                    }
                },
                None => stdout_open = false,
            },
            line = stderr.next_line(), if stderr_open => match line.map_err(io_error)? {
                Some(line) => {
                    ctx.exec.writer.error(&line);
                    last_error = line;
                }
                None => stderr_open = false,
            },
        }
    }

    let status = child.wait().await.map_err(io_error)?;

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        let detail = ctx.exec.writer.redact(&last_error);
        return Err(RexError::handler(
            &unit,
            format!("Exit code {}{}{}", code, if detail.is_empty() { "" } else { ": " }, detail),
        ));
    }

    let stdout = ctx.exec.writer.redact(&printed.join("\n"));
    outputs.insert("stdout".into(), Value::String(stdout));
    outputs.insert("exit_code".into(), Value::from(0));
    Ok(outputs)
}
