// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Handlers
//!
//! A handler does the actual work of a task or deployment. Units refer to
//! handlers by key (`uses: shell`); the per-run [`HandlerRegistry`] maps
//! keys to implementations.

mod shell;

pub use shell::{ShellDeployment, ShellHandler};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{RexError, RexResult};
use crate::pipeline::Directive;
use crate::runtime::UnitContext;

/// Values produced by a handler, and the inputs handed to one
pub type Outputs = serde_json::Map<String, Value>;

/// Declared handler input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl InputSpec {
    /// Input that must be provided
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
        }
    }

    /// Input that falls back to `default`
    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: Some(default.into()),
        }
    }
}

/// Apply declared defaults to `inputs` and check required ones are present.
/// A `null` value counts as absent.
pub fn apply_input_specs(unit: &str, specs: &[InputSpec], inputs: &mut Outputs) -> RexResult<()> {
    for spec in specs {
        let present = inputs.get(&spec.name).is_some_and(|v| !v.is_null());
        if present {
            continue;
        }

        match &spec.default {
            Some(default) => {
                inputs.insert(spec.name.clone(), default.clone());
            }
            None if spec.required => {
                return Err(RexError::MissingInput {
                    unit: unit.to_string(),
                    input: spec.name.clone(),
                });
            }
            None => {}
        }
    }

    Ok(())
}

/// Task handler
#[async_trait]
pub trait Handler: Send + Sync {
    /// Inputs the handler accepts
    fn inputs(&self) -> Vec<InputSpec> {
        Vec::new()
    }

    /// Extra validation after defaults are applied
    fn validate(&self, _unit: &str, _inputs: &Outputs) -> RexResult<()> {
        Ok(())
    }

    async fn run(&self, ctx: &mut UnitContext) -> RexResult<Outputs>;
}

/// Deployment handler; only `deploy` is mandatory
#[async_trait]
pub trait DeploymentHandler: Send + Sync {
    fn inputs(&self) -> Vec<InputSpec> {
        Vec::new()
    }

    fn validate(&self, _unit: &str, _inputs: &Outputs) -> RexResult<()> {
        Ok(())
    }

    async fn deploy(&self, ctx: &mut UnitContext) -> RexResult<Outputs>;

    async fn rollback(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
        Err(unsupported(ctx, Directive::Rollback))
    }

    async fn destroy(&self, ctx: &mut UnitContext) -> RexResult<Outputs> {
        Err(unsupported(ctx, Directive::Destroy))
    }

    /// Dispatch a directive to the matching method
    async fn run_directive(
        &self,
        directive: Directive,
        ctx: &mut UnitContext,
    ) -> RexResult<Outputs> {
        match directive {
            Directive::Deploy => self.deploy(ctx).await,
            Directive::Rollback => self.rollback(ctx).await,
            Directive::Destroy => self.destroy(ctx).await,
        }
    }
}

/// The deployment unit `ctx` runs for has no action for `directive`
pub(crate) fn unsupported(ctx: &UnitContext, directive: Directive) -> RexError {
    RexError::DirectiveUnsupported {
        unit: ctx.id().to_string(),
        directive: directive.to_string(),
    }
}

/// Handlers available to a run
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    tasks: HashMap<String, Arc<dyn Handler>>,
    deployments: HashMap<String, Arc<dyn DeploymentHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tasks", &self.task_keys())
            .field("deployments", &self.deployment_keys())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `shell` handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register_task("shell", ShellHandler::new())
            .register_deployment("shell", ShellDeployment::new());
        registry
    }

    /// Register a task handler, replacing any handler with the same key
    pub fn register_task(&mut self, key: impl Into<String>, handler: impl Handler + 'static) -> &mut Self {
        self.tasks.insert(key.into(), Arc::new(handler));
        self
    }

    pub fn register_deployment(
        &mut self,
        key: impl Into<String>,
        handler: impl DeploymentHandler + 'static,
    ) -> &mut Self {
        self.deployments.insert(key.into(), Arc::new(handler));
        self
    }

    pub fn task(&self, key: &str) -> Option<Arc<dyn Handler>> {
        self.tasks.get(key).cloned()
    }

    pub fn deployment(&self, key: &str) -> Option<Arc<dyn DeploymentHandler>> {
        self.deployments.get(key).cloned()
    }

    pub fn has_task(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn has_deployment(&self, key: &str) -> bool {
        self.deployments.contains_key(key)
    }

    /// Task handler keys, sorted
    pub fn task_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.tasks.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Deployment handler keys, sorted
    pub fn deployment_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.deployments.keys().cloned().collect();
        keys.sort();
        keys
    }
}
