// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Rexfile validation
//!
//! Static checks run before anything executes.

use serde::Serialize;
use std::collections::HashSet;

use crate::handlers::{apply_input_specs, HandlerRegistry, InputSpec, Outputs};
use crate::pipeline::{
    DependencyGraph, Deployment, Directive, Dynamic, GraphNode, Rexfile, Task, Unit, UnitKind,
};

/// Rexfile validator
pub struct RexfileValidator;

impl RexfileValidator {
    /// Validate a rexfile against the handlers available to the run
    pub fn validate(rexfile: &Rexfile, handlers: &HandlerRegistry) -> ValidationResult {
        let mut result = ValidationResult::new();

        if rexfile.tasks.is_empty() && rexfile.jobs.is_empty() && rexfile.deployments.is_empty() {
            result.add_error("Rexfile defines no tasks, jobs or deployments");
        }

        Self::validate_graph(UnitKind::Task, "", &rexfile.tasks, &mut result);
        Self::validate_graph(UnitKind::Job, "", &rexfile.jobs, &mut result);
        Self::validate_graph(UnitKind::Deployment, "", &rexfile.deployments, &mut result);

        for task in &rexfile.tasks {
            Self::validate_task(task, "", handlers, &mut result);
        }

        for job in &rexfile.jobs {
            let scope = format!("Job '{}': ", job.spec.id);
            if job.tasks.is_empty() {
                result.add_warning(&format!("{}No tasks defined", scope));
            }
            Self::validate_graph(UnitKind::Task, &scope, &job.tasks, &mut result);
            for task in &job.tasks {
                Self::validate_task(task, &scope, handlers, &mut result);
            }
        }

        for deployment in &rexfile.deployments {
            Self::validate_deployment(deployment, handlers, &mut result);
        }

        result
    }

    /// Duplicate ids, cycles and missing dependencies in one graph
    fn validate_graph<N: GraphNode + Clone>(
        kind: UnitKind,
        scope: &str,
        nodes: &[N],
        result: &mut ValidationResult,
    ) {
        let mut seen = HashSet::new();
        let mut graph = DependencyGraph::new();

        for node in nodes {
            if !seen.insert(node.id()) {
                result.add_error(&format!(
                    "{}Duplicate {} id: '{}'",
                    scope,
                    kind.singular(),
                    node.id()
                ));
            }
            graph.insert(node.clone());
        }

        let cyclic: Vec<String> = graph
            .find_cyclical_references()
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        if !cyclic.is_empty() {
            result.add_error(&format!(
                "{}Circular dependency between {}: {}",
                scope,
                kind.plural(),
                cyclic.join(" → ")
            ));
        }

        for entry in graph.missing_dependencies() {
            for missing in entry.missing {
                result.add_error(&format!(
                    "{}{} '{}' needs unknown {} '{}'",
                    scope,
                    capitalize(kind.singular()),
                    entry.id,
                    kind.singular(),
                    missing
                ));
            }
        }
    }

    fn validate_task(task: &Task, scope: &str, handlers: &HandlerRegistry, result: &mut ValidationResult) {
        let id = &task.spec.id;
        let Some(handler) = handlers.task(&task.uses) else {
            result.add_error(&format!(
                "{}Task '{}': Unknown handler '{}'",
                scope, id, task.uses
            ));
            return;
        };

        if let Some(mut inputs) = static_inputs(task) {
            match apply_input_specs(id, &handler.inputs(), &mut inputs)
                .and_then(|_| handler.validate(id, &inputs))
            {
                Ok(()) => {}
                Err(e) => result.add_error(&format!("{}Task '{}': {}", scope, id, e)),
            }
            Self::warn_unknown_inputs(scope, id, &handler.inputs(), &inputs, result);
        }
    }

    fn validate_deployment(
        deployment: &Deployment,
        handlers: &HandlerRegistry,
        result: &mut ValidationResult,
    ) {
        let id = &deployment.spec.id;
        match handlers.deployment(&deployment.uses) {
            None => result.add_error(&format!(
                "Deployment '{}': Unknown handler '{}'",
                id, deployment.uses
            )),
            Some(handler) => {
                if let Some(mut inputs) = static_inputs(deployment) {
                    if let Err(e) = apply_input_specs(id, &handler.inputs(), &mut inputs)
                        .and_then(|_| handler.validate(id, &inputs))
                    {
                        result.add_error(&format!("Deployment '{}': {}", id, e));
                    }
                }
            }
        }

        let known: Vec<String> = [Directive::Deploy, Directive::Rollback, Directive::Destroy]
            .iter()
            .flat_map(|d| [d.before_hook(), d.after_hook()])
            .collect();

        for (key, tasks) in &deployment.hooks {
            if !known.contains(key) {
                result.add_warning(&format!(
                    "Deployment '{}': Hook '{}' never runs (expected before:<directive> or after:<directive>)",
                    id, key
                ));
            }

            let scope = format!("Deployment '{}' hook '{}': ", id, key);
            for task in tasks {
                Self::validate_task(task, &scope, handlers, result);
            }
        }
    }

    /// Inputs the handler does not declare are still passed through, but
    /// usually point at a typo
    fn warn_unknown_inputs(
        scope: &str,
        id: &str,
        specs: &[InputSpec],
        inputs: &Outputs,
        result: &mut ValidationResult,
    ) {
        if specs.is_empty() {
            return;
        }

        for name in inputs.keys() {
            if !specs.iter().any(|s| &s.name == name) {
                result.add_warning(&format!(
                    "{}Task '{}': Input '{}' is not declared by its handler",
                    scope, id, name
                ));
            }
        }
    }

    /// Names in `secrets` that are not set in the process environment
    pub fn missing_secrets(rexfile: &Rexfile) -> Vec<String> {
        rexfile
            .secrets
            .iter()
            .filter(|name| std::env::var(name).is_err())
            .cloned()
            .collect()
    }
}

/// Inputs known before the run starts; computed inputs can't be checked
fn static_inputs<U: Unit>(unit: &U) -> Option<Outputs> {
    match &unit.spec().inputs {
        None => Some(Outputs::new()),
        Some(Dynamic::Static(inputs)) => Some(inputs.clone()),
        Some(Dynamic::Computed(_)) => None,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Result of rexfile validation
#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Job;

    fn validate(yaml: &str) -> ValidationResult {
        let rexfile = Rexfile::from_yaml(yaml).unwrap();
        RexfileValidator::validate(&rexfile, &HandlerRegistry::with_builtins())
    }

    #[test]
    fn test_validate_empty_rexfile() {
        let result = validate("name: empty\n");
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no tasks"));
    }

    #[test]
    fn test_validate_valid_rexfile() {
        let result = validate(
            r#"
tasks:
  - id: build
    uses: shell
    with:
      run: cargo build
  - id: test
    uses: shell
    needs: [build]
    with:
      run: cargo test
"#,
        );
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let result = validate(
            r#"
tasks:
  - id: dup
    uses: shell
    with: { run: "true" }
  - id: dup
    uses: shell
    with: { run: "false" }
"#,
        );
        assert!(result.errors.iter().any(|e| e.contains("Duplicate task id: 'dup'")));
    }

    #[test]
    fn test_validate_graph_problems() {
        let result = validate(
            r#"
tasks:
  - id: a
    uses: shell
    needs: [b]
    with: { run: "true" }
  - id: b
    uses: shell
    needs: [a]
    with: { run: "true" }
  - id: c
    uses: shell
    needs: [ghost]
    with: { run: "true" }
"#,
        );
        assert!(result
            .errors
            .iter()
            .any(|e| e.starts_with("Circular dependency between tasks: ")
                && e.contains('a')
                && e.contains('b')));
        assert!(result
            .errors
            .iter()
            .any(|e| e == "Task 'c' needs unknown task 'ghost'"));
    }

    #[test]
    fn test_validate_handlers_and_inputs() {
        let result = validate(
            r#"
tasks:
  - id: no-run
    uses: shell
  - id: typo
    uses: shel
  - id: extra
    uses: shell
    with:
      run: ls
      rnu: ls
"#,
        );
        assert!(result
            .errors
            .iter()
            .any(|e| e == "Task 'no-run': 'no-run' is missing required input 'run'"));
        assert!(result
            .errors
            .iter()
            .any(|e| e == "Task 'typo': Unknown handler 'shel'"));
        assert!(result.warnings.iter().any(|w| w.contains("'rnu'")));
    }

    #[test]
    fn test_validate_jobs_and_deployments() {
        let mut rexfile = Rexfile::default();
        rexfile.jobs.push(Job::new("empty", vec![]));
        rexfile.deployments.push(
            Deployment::new("site", "shell")
                .with_input("deploy", "./deploy.sh")
                .with_hook("before:deplyo", Task::new("check", "shell").with_input("run", "true")),
        );

        let result = RexfileValidator::validate(&rexfile, &HandlerRegistry::with_builtins());

        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.iter().any(|w| w == "Job 'empty': No tasks defined"));
        assert!(result.warnings.iter().any(|w| w.contains("'before:deplyo' never runs")));
    }

    #[test]
    fn test_missing_secrets() {
        let rexfile = Rexfile {
            secrets: vec!["REXFLOW_TEST_SURELY_UNSET_SECRET".into(), "PATH".into()],
            ..Rexfile::default()
        };
        assert_eq!(
            RexfileValidator::missing_secrets(&rexfile),
            vec!["REXFLOW_TEST_SURELY_UNSET_SECRET"]
        );
    }
}
