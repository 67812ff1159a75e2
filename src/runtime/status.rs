// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Unit results and their status state machine
//!
//! A [`UnitResult`] starts `pending`, may move to `running`, and ends in one
//! of four terminal states. Once terminal it never changes again.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::errors::{RexError, RexResult};
use crate::handlers::Outputs;

/// Lifecycle status of a unit or of a whole run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
    Cancelled,
}

impl Status {
    /// Terminal states accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failure | Self::Skipped | Self::Cancelled
        )
    }

    /// Whether a run in this aggregate status gates later units
    pub fn blocks_followers(self) -> bool {
        matches!(self, Self::Failure | Self::Cancelled)
    }

    fn can_become(self, next: Status) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending | Self::Running, to) => to.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of running one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitResult {
    /// Id of the unit this result belongs to
    pub id: String,
    status: Status,
    /// When the unit started running
    pub started_at: Option<SystemTime>,
    /// When the unit reached a terminal status
    pub finished_at: Option<SystemTime>,
    /// Error or cancellation reason text
    pub error: Option<String>,
    /// Outputs produced by the handler
    #[serde(default)]
    pub outputs: Outputs,
}

impl UnitResult {
    /// Create a pending result for a unit
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: Status::Pending,
            started_at: None,
            finished_at: None,
            error: None,
            outputs: Outputs::new(),
        }
    }

    /// Mark the unit as running
    pub fn start(&mut self) -> RexResult<()> {
        self.transition(Status::Running)?;
        self.started_at = Some(SystemTime::now());
        Ok(())
    }

    /// Mark the unit as succeeded, storing its outputs
    pub fn succeed(&mut self, outputs: Outputs) -> RexResult<()> {
        self.transition(Status::Success)?;
        self.outputs = outputs;
        self.finish();
        Ok(())
    }

    /// Mark the unit as failed
    pub fn fail(&mut self, error: &RexError) -> RexResult<()> {
        self.transition(Status::Failure)?;
        self.error = Some(error.to_string());
        self.finish();
        Ok(())
    }

    /// Mark the unit as skipped
    pub fn skip(&mut self, reason: impl Into<String>) -> RexResult<()> {
        self.transition(Status::Skipped)?;
        self.error = Some(reason.into());
        self.finish();
        Ok(())
    }

    /// Mark the unit as cancelled with the triggering reason
    pub fn cancel(&mut self, reason: impl Into<String>) -> RexResult<()> {
        self.transition(Status::Cancelled)?;
        self.error = Some(reason.into());
        self.finish();
        Ok(())
    }

    /// Record an error as the unit's outcome: cancellations become
    /// `cancelled`, everything else `failure`
    pub fn settle(&mut self, error: &RexError) -> RexResult<()> {
        if error.is_cancellation() {
            self.cancel(error.to_string())
        } else {
            self.fail(error)
        }
    }

    /// Current status; it only moves through the transition methods
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether a terminal status has been reached
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: Status) -> RexResult<()> {
        if !self.status.can_become(to) {
            return Err(RexError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    fn finish(&mut self) {
        self.finished_at = Some(SystemTime::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut result = UnitResult::new("build");
        assert_eq!(result.status(), Status::Pending);

        result.start().unwrap();
        assert_eq!(result.status(), Status::Running);
        assert!(result.started_at.is_some());

        let mut outputs = Outputs::new();
        outputs.insert("artifact".into(), "app.tar".into());
        result.succeed(outputs).unwrap();

        assert_eq!(result.status(), Status::Success);
        assert!(result.finished_at.is_some());
        assert_eq!(result.outputs["artifact"], "app.tar");
    }

    #[test]
    fn test_terminal_status_is_immutable() {
        let mut result = UnitResult::new("build");
        result.start().unwrap();
        result.cancel("Timed out after 1s").unwrap();

        let err = result.succeed(Outputs::new()).unwrap_err();
        assert!(matches!(
            err,
            RexError::InvalidTransition {
                from: Status::Cancelled,
                to: Status::Success
            }
        ));
        assert_eq!(result.status(), Status::Cancelled);
        assert_eq!(result.error.as_deref(), Some("Timed out after 1s"));
    }

    #[test]
    fn test_skip_from_pending() {
        let mut result = UnitResult::new("lint");
        result.skip("condition is false").unwrap();
        assert_eq!(result.status(), Status::Skipped);
        assert!(result.start().is_err());
    }

    #[test]
    fn test_running_twice_rejected() {
        let mut result = UnitResult::new("lint");
        result.start().unwrap();
        assert!(result.start().is_err());
    }

    #[test]
    fn test_settle_routes_cancellation() {
        let mut cancelled = UnitResult::new("a");
        cancelled
            .settle(&RexError::Cancelled {
                reason: "ctrl-c".into(),
            })
            .unwrap();
        assert_eq!(cancelled.status(), Status::Cancelled);

        let mut failed = UnitResult::new("b");
        failed.settle(&RexError::handler("b", "boom")).unwrap();
        assert_eq!(failed.status(), Status::Failure);
    }

    #[test]
    fn test_status_survives_serde_and_stays_guarded() {
        let mut result = UnitResult::new("deploy");
        result.start().unwrap();
        result.fail(&RexError::handler("deploy", "boom")).unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failure");

        let mut restored: UnitResult = serde_json::from_value(json).unwrap();
        assert_eq!(restored.status(), Status::Failure);
        assert!(restored.is_finished());
        assert!(restored.skip("late").is_err());
        assert_eq!(restored.status(), Status::Failure);
    }

    #[test]
    fn test_blocking_statuses() {
        assert!(Status::Failure.blocks_followers());
        assert!(Status::Cancelled.blocks_followers());
        assert!(!Status::Skipped.blocks_followers());
        assert!(!Status::Success.blocks_followers());
    }
}
