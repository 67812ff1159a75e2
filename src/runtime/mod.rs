// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Run-time state
//!
//! Execution context and propagation, cancellation tokens with per-unit
//! timeouts, and the result state machine.

mod cancel;
mod context;
mod status;

pub use cancel::{effective_timeout, CancelReason, CancelToken, Coordinator, UnitScope};
pub use context::{
    input_env_name, normalize_id, output_key, value_to_string, ContextDelta, ExecutionContext,
    UnitContext,
};
pub use status::{Status, UnitResult};
