// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

use super::RexError;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Pick a suggestion for an error, if one applies
    pub fn for_error(error: &RexError) -> Option<Self> {
        match error {
            RexError::CircularDependency { ids } => Some(Self::fix_circular_dependency(ids)),
            RexError::UnknownDependency { unit, dependency } => {
                Some(Self::fix_unknown_dependency(unit, dependency))
            }
            RexError::TargetNotFound { target } => Some(Self::fix_unknown_target(target)),
            RexError::HandlerNotFound { key } => Some(Self::register_handler(key)),
            RexError::MissingInput { unit, input } => Some(Self::provide_input(unit, input)),
            RexError::RexfileNotFound { .. } => Some(Self::create_rexfile()),
            _ => None,
        }
    }

    /// Suggest fixing a circular dependency
    pub fn fix_circular_dependency(ids: &[String]) -> Self {
        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", ids.join(" → ")),
                "Review the `needs` lists of these units".into(),
                "Units must form a directed acyclic graph".into(),
            ],
            commands: vec![
                "# Visualize the dependency graph:".into(),
                "rexflow graph --format mermaid".into(),
            ],
        }
    }

    /// Suggest fixing a reference to a unit that does not exist
    pub fn fix_unknown_dependency(unit: &str, dependency: &str) -> Self {
        Self {
            action: format!("Define '{}' or remove it from '{}'", dependency, unit),
            steps: vec![
                format!("'{}' lists '{}' in `needs`", unit, dependency),
                "Ids are matched exactly and are case sensitive".into(),
            ],
            commands: vec!["rexflow list".into()],
        }
    }

    /// Suggest listing available targets
    pub fn fix_unknown_target(target: &str) -> Self {
        Self {
            action: format!("Pick an existing target instead of '{}'", target),
            steps: vec!["Run one of the ids defined in your rexfile".into()],
            commands: vec!["rexflow list".into()],
        }
    }

    /// Suggest registering a handler
    pub fn register_handler(key: &str) -> Self {
        Self {
            action: format!("Register a handler for '{}'", key),
            steps: vec![
                format!("No handler is registered under '{}'", key),
                "Use a built-in handler (shell) or register one with HandlerRegistry".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest providing a required input
    pub fn provide_input(unit: &str, input: &str) -> Self {
        Self {
            action: format!("Provide input '{}' for '{}'", input, unit),
            steps: vec![format!("Add `{}` under the `with` section of '{}'", input, unit)],
            commands: vec![],
        }
    }

    /// Suggest creating a rexfile
    pub fn create_rexfile() -> Self {
        Self {
            action: "Create a rexfile".into(),
            steps: vec![
                "No rexfile.yaml found in current directory".into(),
                "Create one or point at an existing file".into(),
            ],
            commands: vec!["rexflow --file path/to/rexfile.yaml list".into()],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
