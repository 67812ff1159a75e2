// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Error types with helpful diagnostics
//!
//! Every failure the engine can produce is a [`RexError`]. The variants are
//! grouped by how the pipelines treat them: graph errors abort a whole run,
//! validation errors fail a single unit, timeout and cancellation turn a unit
//! into `cancelled`, and handler errors fail a unit while letting the
//! surrounding sequence continue.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::runtime::Status;

/// Result type for rexflow operations
pub type RexResult<T> = Result<T, RexError>;

/// Main error type for rexflow
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum RexError {
    // ─────────────────────────────────────────────────────────────────────────
    // Graph Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Circular dependency detected: {}", .ids.join(" → "))]
    #[diagnostic(
        code(rexflow::circular_dependency),
        help("Review the `needs` lists of these units to remove the cycle")
    )]
    CircularDependency { ids: Vec<String> },

    #[error("'{unit}' needs unknown unit '{dependency}'")]
    #[diagnostic(
        code(rexflow::unknown_dependency),
        help("Check that '{dependency}' is defined in your rexfile")
    )]
    UnknownDependency { unit: String, dependency: String },

    #[error("Target '{target}' not found")]
    #[diagnostic(code(rexflow::target_not_found))]
    TargetNotFound { target: String },

    #[error("Duplicate unit id '{id}'")]
    #[diagnostic(
        code(rexflow::duplicate_id),
        help("Unit ids must be unique within a tasks, jobs or deployments section")
    )]
    DuplicateId { id: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("No handler registered for '{key}'")]
    #[diagnostic(
        code(rexflow::handler_not_found),
        help("Built-in handlers: shell")
    )]
    HandlerNotFound { key: String },

    #[error("'{unit}' is missing required input '{input}'")]
    #[diagnostic(code(rexflow::missing_input))]
    MissingInput { unit: String, input: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Cancellation
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Timed out after {}", format_duration(.after))]
    #[diagnostic(code(rexflow::timeout))]
    Timeout { after: Duration },

    #[error("Cancelled: {reason}")]
    #[diagnostic(code(rexflow::cancelled))]
    Cancelled { reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("'{unit}' failed: {message}")]
    #[diagnostic(code(rexflow::handler_failed))]
    Handler { unit: String, message: String },

    #[error("Directive '{directive}' is not supported by '{unit}'")]
    #[diagnostic(code(rexflow::directive_unsupported))]
    DirectiveUnsupported { unit: String, directive: String },

    #[error("Hook '{hook}' of '{unit}' did not succeed: {message}")]
    #[diagnostic(code(rexflow::hook_failed))]
    HookFailed {
        unit: String,
        hook: String,
        message: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Contract Violations
    // ─────────────────────────────────────────────────────────────────────────
    #[error("next() called more than once by the middleware at position {position}")]
    #[diagnostic(code(rexflow::next_called_twice))]
    NextCalledTwice { position: usize },

    #[error("Invalid status transition from {from} to {to}")]
    #[diagnostic(code(rexflow::invalid_transition))]
    InvalidTransition { from: Status, to: Status },

    // ─────────────────────────────────────────────────────────────────────────
    // Rexfile Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Rexfile not found: {path}")]
    #[diagnostic(
        code(rexflow::rexfile_not_found),
        help("Create a rexfile.yaml or pass one with --file")
    )]
    RexfileNotFound { path: PathBuf },

    #[error("Invalid rexfile: {reason}")]
    #[diagnostic(code(rexflow::invalid_rexfile))]
    InvalidRexfile {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(rexflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(rexflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(rexflow::json_error))]
    Json { message: String },
}

impl From<std::io::Error> for RexError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for RexError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for RexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl RexError {
    /// Create a handler failure for a unit
    pub fn handler(unit: &str, message: impl Into<String>) -> Self {
        Self::Handler {
            unit: unit.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error aborts a whole run rather than a single unit
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            Self::CircularDependency { .. }
                | Self::UnknownDependency { .. }
                | Self::TargetNotFound { .. }
                | Self::DuplicateId { .. }
        )
    }

    /// Whether this error fails the offending unit before its handler runs
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::HandlerNotFound { .. } | Self::MissingInput { .. })
    }

    /// Whether this error converts the unit's outcome into `cancelled`
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled { .. })
    }
}

fn format_duration(d: &Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{:.3}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RexError::TargetNotFound { target: "x".into() }.is_graph_error());
        assert!(RexError::HandlerNotFound { key: "x".into() }.is_validation_error());
        assert!(RexError::Timeout {
            after: Duration::from_secs(1)
        }
        .is_cancellation());
        assert!(!RexError::handler("build", "exit 1").is_cancellation());
    }

    #[test]
    fn test_timeout_display() {
        let err = RexError::Timeout {
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "Timed out after 1.500s");

        let err = RexError::Timeout {
            after: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "Timed out after 2s");
    }

    #[test]
    fn test_cycle_display() {
        let err = RexError::CircularDependency {
            ids: vec!["a".into(), "b".into(), "a".into()],
        };
        assert!(err.to_string().contains("a → b → a"));
    }
}
