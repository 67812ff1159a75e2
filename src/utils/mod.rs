// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Utility modules
//!
//! Common utilities for the rexflow CLI.

pub mod colors;

pub use colors::*;

use std::time::Duration;

use crate::runtime::UnitResult;

/// Wall time between a unit starting and finishing
pub fn duration_of(result: &UnitResult) -> Option<Duration> {
    let started = result.started_at?;
    let finished = result.finished_at?;
    finished.duration_since(started).ok()
}
