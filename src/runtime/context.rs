// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Execution context and propagation between units
//!
//! The root [`ExecutionContext`] lives for the whole run. Each unit works on
//! a derived copy; when it finishes, the changes it made travel back into
//! the parent through an explicit [`ContextDelta`].

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::events::EventBus;
use crate::handlers::{HandlerRegistry, Outputs};
use crate::output::{MemorySink, OutputSink};
use crate::pipeline::{UnitKind, UnitState};
use crate::runtime::{CancelToken, Coordinator, UnitResult};

/// State shared by every unit of a run
#[derive(Clone)]
pub struct ExecutionContext {
    /// Environment variables visible to handlers
    pub env: HashMap<String, String>,
    /// Secret values, masked in all output
    pub secrets: HashMap<String, String>,
    /// Outputs of finished units, keyed `<kind>.<normalized id>`
    pub outputs: Outputs,
    /// Run variables
    pub variables: HashMap<String, Value>,
    /// Handlers units can `use`
    pub handlers: Arc<HandlerRegistry>,
    /// Cancellation token for this level of the run
    pub token: CancelToken,
    /// Where handlers write their output
    pub writer: Arc<dyn OutputSink>,
    /// Lifecycle event bus
    pub bus: EventBus,
    /// Timeout ceiling applied to every unit
    pub coordinator: Coordinator,
    /// Target environment name (e.g. `prod`)
    pub environment: String,
    /// Extra command-line arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(
            Arc::new(HandlerRegistry::new()),
            Arc::new(MemorySink::new()),
        )
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("env", &self.env.len())
            .field("secrets", &self.secrets.len())
            .field("outputs", &self.outputs.len())
            .field("variables", &self.variables.len())
            .field("cancelled", &self.token.is_cancelled())
            .field("environment", &self.environment)
            .field("cwd", &self.cwd)
            .finish()
    }
}

impl ExecutionContext {
    /// Create a root context
    pub fn new(handlers: Arc<HandlerRegistry>, writer: Arc<dyn OutputSink>) -> Self {
        Self {
            env: HashMap::new(),
            secrets: HashMap::new(),
            outputs: Outputs::new(),
            variables: HashMap::new(),
            handlers,
            token: CancelToken::new(),
            writer,
            bus: EventBus::new(),
            coordinator: Coordinator::default(),
            environment: "default".to_string(),
            args: Vec::new(),
            cwd: PathBuf::from("."),
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }

    /// Set the global timeout ceiling in seconds
    pub fn with_timeout_ceiling(mut self, secs: Option<f64>) -> Self {
        self.coordinator = Coordinator::new(secs);
        self
    }

    pub fn with_environment(mut self, name: impl Into<String>) -> Self {
        self.environment = name.into();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Register a secret: masked in the sink first, then stored
    pub fn set_secret(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        self.writer.mask(&value);
        self.secrets.insert(name.into(), value);
    }

    /// Context a unit runs in: the parent's maps overlaid with the unit's
    /// resolved env and working directory, under the unit's own token
    pub fn derive(&self, state: &UnitState, token: CancelToken) -> Self {
        let mut ctx = self.clone();
        ctx.env
            .extend(state.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(cwd) = &state.cwd {
            ctx.cwd = self.cwd.join(cwd);
        }
        ctx.token = token;
        ctx
    }

    /// Merge a finished unit back into this context
    ///
    /// Outputs land under `<kind>.<normalized id>`. New or changed secrets
    /// are masked and mirrored into env before anything else can see
    /// them, and exported as `secrets.<name>` variables.
    pub fn absorb(&mut self, kind: UnitKind, result: &UnitResult, delta: &ContextDelta) {
        if !result.outputs.is_empty() {
            self.outputs.insert(
                output_key(kind, &result.id),
                Value::Object(result.outputs.clone()),
            );
        }

        for (name, value) in &delta.secrets {
            self.writer.mask(value);
            self.secrets.insert(name.clone(), value.clone());
            self.env.insert(name.clone(), value.clone());
            self.variables
                .insert(format!("secrets.{}", name), Value::String(value.clone()));
        }

        for (name, value) in &delta.env {
            self.env.insert(name.clone(), value.clone());
        }

        for (name, value) in &delta.variables {
            self.variables.insert(name.clone(), value.clone());
        }
    }
}

/// Entries a unit added or changed while it ran
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextDelta {
    pub env: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    pub variables: BTreeMap<String, Value>,
}

impl ContextDelta {
    /// Compare a unit's context before and after it ran. Removed entries
    /// are not propagated.
    pub fn between(before: &ExecutionContext, after: &ExecutionContext) -> Self {
        Self {
            env: changed(&before.env, &after.env),
            secrets: changed(&before.secrets, &after.secrets),
            variables: changed(&before.variables, &after.variables),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.env.is_empty() && self.secrets.is_empty() && self.variables.is_empty()
    }
}

fn changed<V: PartialEq + Clone>(
    before: &HashMap<String, V>,
    after: &HashMap<String, V>,
) -> BTreeMap<String, V> {
    after
        .iter()
        .filter(|(k, v)| before.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Lowercase an id and replace anything but ASCII letters and digits with `_`
pub fn normalize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Env name an input is projected to (`INPUT_<NAME>`)
pub fn input_env_name(input: &str) -> String {
    format!("INPUT_{}", normalize_id(input).to_ascii_uppercase())
}

/// Key a unit's outputs are stored under in the parent context
pub fn output_key(kind: UnitKind, id: &str) -> String {
    format!("{}.{}", kind.plural(), normalize_id(id))
}

/// Context handed to a handler
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub kind: UnitKind,
    /// Resolved unit fields
    pub state: UnitState,
    /// The unit's derived execution context
    pub exec: ExecutionContext,
}

impl UnitContext {
    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.state.inputs.get(name)
    }

    /// String input; non-string scalars are rendered as JSON
    pub fn input_str(&self, name: &str) -> Option<String> {
        self.input(name).map(value_to_string)
    }

    pub fn token(&self) -> &CancelToken {
        &self.exec.token
    }

    pub fn set_env(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.exec.env.insert(name.into(), value.into());
    }

    pub fn set_secret(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.exec.set_secret(name, value);
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.exec.variables.insert(name.into(), value.into());
    }
}

/// Render a JSON value the way it should appear in an env var
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Task, Unit};

    fn context_with_sink() -> (ExecutionContext, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let ctx = ExecutionContext::new(Arc::new(HandlerRegistry::new()), sink.clone());
        (ctx, sink)
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("Build-App"), "build_app");
        assert_eq!(normalize_id("deploy.web v2"), "deploy_web_v2");
        assert_eq!(input_env_name("node-version"), "INPUT_NODE_VERSION");
        assert_eq!(output_key(UnitKind::Job, "ci-main"), "jobs.ci_main");
    }

    #[test]
    fn test_derive_overlays_unit_state() {
        let (mut parent, _) = context_with_sink();
        parent.env.insert("SHARED".into(), "parent".into());
        parent.env.insert("KEEP".into(), "yes".into());
        parent.cwd = PathBuf::from("/work");

        let task = Task::new("t", "shell")
            .with_env("SHARED", "unit")
            .with_cwd("sub");
        let state = task.spec.resolve(&parent);
        let child = parent.derive(&state, parent.token.child());

        assert_eq!(child.env["SHARED"], "unit");
        assert_eq!(child.env["KEEP"], "yes");
        assert_eq!(child.cwd, PathBuf::from("/work/sub"));
        // the parent is untouched
        assert_eq!(parent.env["SHARED"], "parent");
    }

    #[test]
    fn test_delta_only_contains_changes() {
        let (mut before, _) = context_with_sink();
        before.env.insert("A".into(), "1".into());
        before.secrets.insert("TOKEN".into(), "old".into());
        before.secrets.insert("STABLE".into(), "same".into());

        let mut after = before.clone();
        after.env.insert("A".into(), "1".into());
        after.env.insert("B".into(), "2".into());
        after.secrets.insert("TOKEN".into(), "new".into());
        after.variables.insert("version".into(), Value::from("1.2.3"));

        let delta = ContextDelta::between(&before, &after);
        assert_eq!(delta.env.len(), 1);
        assert_eq!(delta.env["B"], "2");
        assert_eq!(delta.secrets.len(), 1);
        assert_eq!(delta.secrets["TOKEN"], "new");
        assert_eq!(delta.variables["version"], "1.2.3");

        assert!(ContextDelta::between(&after, &after).is_empty());
    }

    #[test]
    fn test_absorb_masks_and_mirrors_secrets() {
        let (mut parent, sink) = context_with_sink();

        let mut result = UnitResult::new("Fetch-Token");
        result.start().unwrap();
        let mut outputs = Outputs::new();
        outputs.insert("status".into(), Value::from("ok"));
        result.succeed(outputs).unwrap();

        let mut delta = ContextDelta::default();
        delta
            .secrets
            .insert("API_TOKEN".into(), "s3cr3t-value".into());
        delta.env.insert("REGION".into(), "eu".into());

        parent.writer.write_line("before: s3cr3t-value");
        parent.absorb(UnitKind::Task, &result, &delta);
        parent.writer.write_line("after: s3cr3t-value");

        assert_eq!(parent.env["API_TOKEN"], "s3cr3t-value");
        assert_eq!(parent.env["REGION"], "eu");
        assert_eq!(parent.secrets["API_TOKEN"], "s3cr3t-value");
        assert_eq!(parent.variables["secrets.API_TOKEN"], "s3cr3t-value");
        assert_eq!(parent.outputs["tasks.fetch_token"]["status"], "ok");

        let lines = sink.lines();
        assert_eq!(lines[0], "before: s3cr3t-value");
        assert_eq!(lines[1], "after: ***");
    }

    #[test]
    fn test_absorb_skips_empty_outputs() {
        let (mut parent, _) = context_with_sink();
        let mut result = UnitResult::new("noop");
        result.skip("condition is false").unwrap();

        parent.absorb(UnitKind::Task, &result, &ContextDelta::default());
        assert!(parent.outputs.is_empty());
    }

    #[test]
    fn test_unit_context_inputs() {
        let (ctx, _) = context_with_sink();
        let task = Task::new("t", "shell")
            .with_input("run", "echo hi")
            .with_input("retries", 3);
        let unit = UnitContext {
            kind: UnitKind::Task,
            state: task.spec.resolve(&ctx),
            exec: ctx,
        };

        assert_eq!(unit.input_str("run").as_deref(), Some("echo hi"));
        assert_eq!(unit.input_str("retries").as_deref(), Some("3"));
        assert!(unit.input("missing").is_none());
    }
}
