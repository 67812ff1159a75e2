// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Run options
//!
//! Everything a caller decides about a run before it starts, and the root
//! [`ExecutionContext`] built from it.

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::events::LogLevel;
use crate::handlers::HandlerRegistry;
use crate::output::OutputSink;
use crate::pipeline::Rexfile;
use crate::runtime::ExecutionContext;

/// Run options
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Units to run with their dependencies; empty runs everything
    pub targets: Vec<String>,
    /// Global timeout ceiling in seconds
    pub timeout: Option<f64>,
    /// Target environment name
    pub environment: String,
    /// Extra arguments passed through to handlers
    pub args: Vec<String>,
    /// Minimum level of log messages put on the bus
    pub log_level: LogLevel,
    /// Working directory units resolve `cwd` against
    pub cwd: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            timeout: None,
            environment: "default".to_string(),
            args: Vec::new(),
            log_level: LogLevel::default(),
            cwd: None,
        }
    }
}

impl RunOptions {
    /// Build the root context for a run, importing declared secrets from
    /// the process environment
    pub fn root_context(
        &self,
        rexfile: &Rexfile,
        handlers: Arc<HandlerRegistry>,
        writer: Arc<dyn OutputSink>,
    ) -> ExecutionContext {
        self.root_context_with(rexfile, handlers, writer, |name| std::env::var(name).ok())
    }

    /// Like [`RunOptions::root_context`], reading secrets through
    /// `lookup`
    pub fn root_context_with(
        &self,
        rexfile: &Rexfile,
        handlers: Arc<HandlerRegistry>,
        writer: Arc<dyn OutputSink>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(handlers, writer)
            .with_timeout_ceiling(self.timeout)
            .with_environment(self.environment.clone())
            .with_args(self.args.clone())
            .with_env(rexfile.env.clone());

        if let Some(cwd) = &self.cwd {
            ctx = ctx.with_cwd(cwd.clone());
        }

        ctx.bus.set_level(self.log_level);

        for name in &rexfile.secrets {
            match lookup(name) {
                Some(value) => {
                    ctx.set_secret(name.clone(), value.clone());
                    ctx.env.insert(name.clone(), value.clone());
                    ctx.variables
                        .insert(format!("secrets.{}", name), Value::String(value));
                }
                None => {
                    tracing::warn!(secret = %name, "declared secret is not set");
                }
            }
        }

        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;

    #[test]
    fn test_root_context() {
        let rexfile = Rexfile::from_yaml(
            r#"
env:
  REGION: eu-west-1
secrets: [API_TOKEN, MISSING_TOKEN]
tasks:
  - id: noop
    uses: shell
    with: { run: "true" }
"#,
        )
        .unwrap();
        let options = RunOptions {
            timeout: Some(30.0),
            environment: "prod".into(),
            args: vec!["--fast".into()],
            log_level: LogLevel::Debug,
            ..RunOptions::default()
        };
        let sink = Arc::new(MemorySink::new());

        let ctx = options.root_context_with(
            &rexfile,
            Arc::new(HandlerRegistry::with_builtins()),
            sink.clone(),
            |name| (name == "API_TOKEN").then(|| "tok-999".to_string()),
        );

        assert_eq!(ctx.environment, "prod");
        assert_eq!(ctx.args, vec!["--fast"]);
        assert_eq!(ctx.coordinator.ceiling(), Some(30.0));
        assert_eq!(ctx.bus.level(), LogLevel::Debug);
        assert_eq!(ctx.env["REGION"], "eu-west-1");
        assert_eq!(ctx.env["API_TOKEN"], "tok-999");
        assert_eq!(ctx.secrets.len(), 1);
        assert_eq!(ctx.variables["secrets.API_TOKEN"], "tok-999");

        ctx.writer.write_line("token is tok-999");
        assert_eq!(sink.lines(), vec!["token is ***"]);
    }

    #[test]
    fn test_defaults() {
        let options = RunOptions::default();
        let ctx = options.root_context_with(
            &Rexfile::default(),
            Arc::new(HandlerRegistry::new()),
            Arc::new(MemorySink::new()),
            |_| None,
        );

        assert_eq!(ctx.environment, "default");
        assert_eq!(ctx.coordinator.ceiling(), None);
        assert!(ctx.secrets.is_empty());
        assert!(options.targets.is_empty());
    }
}
