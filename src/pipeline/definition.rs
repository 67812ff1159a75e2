// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Unit definitions
//!
//! Defines tasks, jobs and deployments, the values that may be computed from
//! the execution context, and the rexfile schema that groups them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{RexError, RexResult};
use crate::handlers::Outputs;
use crate::pipeline::{DependencyGraph, GraphNode};
use crate::runtime::ExecutionContext;

/// The three kinds of schedulable units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Task,
    Job,
    Deployment,
}

impl UnitKind {
    /// Singular name, used in per-unit message kinds (`task:started`)
    pub fn singular(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Job => "job",
            Self::Deployment => "deployment",
        }
    }

    /// Plural name, used for graph-level messages and output namespaces
    pub fn plural(self) -> &'static str {
        match self {
            Self::Task => "tasks",
            Self::Job => "jobs",
            Self::Deployment => "deployments",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.singular())
    }
}

/// Function computing a value from the execution context
pub type Resolver<T> = Arc<dyn Fn(&ExecutionContext) -> T + Send + Sync>;

/// A configuration value that is either fixed or computed per run
#[derive(Clone)]
pub enum Dynamic<T> {
    Static(T),
    Computed(Resolver<T>),
}

impl<T: Clone> Dynamic<T> {
    /// Build a value computed from the context at resolve time
    pub fn computed(f: impl Fn(&ExecutionContext) -> T + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    /// Resolve against a context
    pub fn resolve(&self, ctx: &ExecutionContext) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Computed(f) => f(ctx),
        }
    }
}

impl<T> From<T> for Dynamic<T> {
    fn from(value: T) -> Self {
        Self::Static(value)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Dynamic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(value) => value.fmt(f),
            Self::Computed(_) => write!(f, "<computed>"),
        }
    }
}

impl<T: Serialize> Serialize for Dynamic<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Static(value) => value.serialize(serializer),
            Self::Computed(_) => Err(serde::ser::Error::custom(
                "computed values cannot be serialized",
            )),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Dynamic<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self::Static)
    }
}

/// Fields shared by every unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Unit id (must be unique within its graph)
    pub id: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ids of units that must run first
    #[serde(default)]
    pub needs: Vec<String>,

    /// Working directory, relative to the parent's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<Dynamic<String>>,

    /// Timeout in seconds; zero or negative disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Dynamic<f64>>,

    /// Run even when an earlier unit failed or was cancelled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<Dynamic<bool>>,

    /// Run only when this evaluates to true
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<Dynamic<bool>>,

    /// Environment overlay for this unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Dynamic<HashMap<String, String>>>,

    /// Handler inputs
    #[serde(default, rename = "with", skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Dynamic<Outputs>>,
}

impl UnitSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Materialize the dynamic fields against a context
    pub fn resolve(&self, ctx: &ExecutionContext) -> UnitState {
        UnitState {
            id: self.id.clone(),
            name: self.display_name().to_string(),
            cwd: self.cwd.as_ref().map(|c| PathBuf::from(c.resolve(ctx))),
            timeout: self.timeout.as_ref().map(|t| t.resolve(ctx)),
            force: self.force.as_ref().map(|f| f.resolve(ctx)).unwrap_or(false),
            condition: self
                .condition
                .as_ref()
                .map(|c| c.resolve(ctx))
                .unwrap_or(true),
            env: self.env.as_ref().map(|e| e.resolve(ctx)).unwrap_or_default(),
            inputs: self
                .inputs
                .as_ref()
                .map(|i| i.resolve(ctx))
                .unwrap_or_default(),
        }
    }
}

/// Per-run snapshot of a unit's dynamic fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitState {
    pub id: String,
    pub name: String,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<f64>,
    pub force: bool,
    pub condition: bool,
    pub env: HashMap<String, String>,
    pub inputs: Outputs,
}

/// Behaviour common to tasks, jobs and deployments
pub trait Unit: GraphNode + Send + Sync + 'static {
    const KIND: UnitKind;

    fn spec(&self) -> &UnitSpec;

    fn spec_mut(&mut self) -> &mut UnitSpec;

    fn with_name(mut self, name: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.spec_mut().name = Some(name.into());
        self
    }

    fn with_needs<I, S>(mut self, needs: I) -> Self
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec_mut().needs = needs.into_iter().map(Into::into).collect();
        self
    }

    fn with_timeout(mut self, secs: impl Into<Dynamic<f64>>) -> Self
    where
        Self: Sized,
    {
        self.spec_mut().timeout = Some(secs.into());
        self
    }

    fn with_force(mut self, force: impl Into<Dynamic<bool>>) -> Self
    where
        Self: Sized,
    {
        self.spec_mut().force = Some(force.into());
        self
    }

    fn with_condition(mut self, condition: impl Into<Dynamic<bool>>) -> Self
    where
        Self: Sized,
    {
        self.spec_mut().condition = Some(condition.into());
        self
    }

    fn with_cwd(mut self, cwd: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.spec_mut().cwd = Some(Dynamic::Static(cwd.into()));
        self
    }

    fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        let spec = self.spec_mut();
        let mut env = match spec.env.take() {
            Some(Dynamic::Static(env)) => env,
            _ => HashMap::new(),
        };
        env.insert(key.into(), value.into());
        spec.env = Some(Dynamic::Static(env));
        self
    }

    fn with_input(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self
    where
        Self: Sized,
    {
        let spec = self.spec_mut();
        let mut inputs = match spec.inputs.take() {
            Some(Dynamic::Static(inputs)) => inputs,
            _ => Outputs::new(),
        };
        inputs.insert(key.into(), value.into());
        spec.inputs = Some(Dynamic::Static(inputs));
        self
    }
}

/// A single handler invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub spec: UnitSpec,

    /// Handler key
    pub uses: String,
}

impl Task {
    pub fn new(id: impl Into<String>, uses: impl Into<String>) -> Self {
        Self {
            spec: UnitSpec::new(id),
            uses: uses.into(),
        }
    }
}

/// A group of tasks run as one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(flatten)]
    pub spec: UnitSpec,

    /// Tasks run in dependency order when the job runs
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Job {
    pub fn new(id: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            spec: UnitSpec::new(id),
            tasks,
        }
    }

    /// Dependency graph over the job's tasks
    pub fn task_graph(&self) -> RexResult<DependencyGraph<Task>> {
        DependencyGraph::from_nodes(self.tasks.iter().cloned())
    }
}

/// Deployment directives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Directive {
    #[default]
    Deploy,
    Rollback,
    Destroy,
}

impl Directive {
    /// Hook key run before the directive's main action
    pub fn before_hook(self) -> String {
        format!("before:{}", self)
    }

    /// Hook key run after the directive's main action
    pub fn after_hook(self) -> String {
        format!("after:{}", self)
    }
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deploy => write!(f, "deploy"),
            Self::Rollback => write!(f, "rollback"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

impl std::str::FromStr for Directive {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deploy" => Ok(Self::Deploy),
            "rollback" => Ok(Self::Rollback),
            "destroy" => Ok(Self::Destroy),
            _ => Err(format!("Unknown directive: {}", s)),
        }
    }
}

/// A deployment with before/after hooks per directive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(flatten)]
    pub spec: UnitSpec,

    /// Deployment handler key
    pub uses: String,

    /// Hook tasks keyed by `before:<directive>` / `after:<directive>`
    #[serde(default)]
    pub hooks: BTreeMap<String, Vec<Task>>,
}

impl Deployment {
    pub fn new(id: impl Into<String>, uses: impl Into<String>) -> Self {
        Self {
            spec: UnitSpec::new(id),
            uses: uses.into(),
            hooks: BTreeMap::new(),
        }
    }

    /// Add a hook task
    pub fn with_hook(mut self, hook: impl Into<String>, task: Task) -> Self {
        self.hooks.entry(hook.into()).or_default().push(task);
        self
    }

    /// Hook tasks registered under a key, in declaration order
    pub fn hook(&self, key: &str) -> &[Task] {
        self.hooks.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

impl GraphNode for Task {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn needs(&self) -> &[String] {
        &self.spec.needs
    }
}

impl GraphNode for Job {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn needs(&self) -> &[String] {
        &self.spec.needs
    }
}

impl GraphNode for Deployment {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn needs(&self) -> &[String] {
        &self.spec.needs
    }
}

impl Unit for Task {
    const KIND: UnitKind = UnitKind::Task;

    fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut UnitSpec {
        &mut self.spec
    }
}

impl Unit for Job {
    const KIND: UnitKind = UnitKind::Job;

    fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut UnitSpec {
        &mut self.spec
    }
}

impl Unit for Deployment {
    const KIND: UnitKind = UnitKind::Deployment;

    fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut UnitSpec {
        &mut self.spec
    }
}

/// Rexfile definition (`rexfile.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rexfile {
    /// Project name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Global environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Names of process environment variables imported as secrets
    #[serde(default)]
    pub secrets: Vec<String>,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default)]
    pub jobs: Vec<Job>,

    #[serde(default)]
    pub deployments: Vec<Deployment>,
}

impl Rexfile {
    /// Load a rexfile from disk
    pub fn from_file(path: &std::path::Path) -> RexResult<Self> {
        if !path.exists() {
            return Err(RexError::RexfileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a rexfile from YAML
    pub fn from_yaml(yaml: &str) -> RexResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> RexResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    pub fn task_graph(&self) -> RexResult<DependencyGraph<Task>> {
        DependencyGraph::from_nodes(self.tasks.iter().cloned())
    }

    pub fn job_graph(&self) -> RexResult<DependencyGraph<Job>> {
        DependencyGraph::from_nodes(self.jobs.iter().cloned())
    }

    pub fn deployment_graph(&self) -> RexResult<DependencyGraph<Deployment>> {
        DependencyGraph::from_nodes(self.deployments.iter().cloned())
    }
}
