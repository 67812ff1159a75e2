// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Cancellation tokens and per-unit timeouts
//!
//! Every unit runs under a child of its parent's token. Cancelling a token
//! cancels its whole subtree, never its parent. A [`UnitScope`] races the
//! unit's work against its token and an optional timer; the timer lives
//! inside the guarded future, so it is gone as soon as the work returns.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::{RexError, RexResult};

/// Why a token was cancelled
#[derive(Debug, Clone, PartialEq)]
pub enum CancelReason {
    /// The unit's effective timeout elapsed
    Timeout(Duration),
    /// Explicit cancellation, e.g. Ctrl-C
    Cancelled(String),
}

impl CancelReason {
    /// Convert the reason into the error the pipelines report
    pub fn into_error(self) -> RexError {
        match self {
            Self::Timeout(after) => RexError::Timeout { after },
            Self::Cancelled(reason) => RexError::Cancelled { reason },
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.clone().into_error())
    }
}

/// Cancellation token carrying the reason it was cancelled
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    parent: Option<Arc<CancelToken>>,
}

impl CancelToken {
    /// Create a root token
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child token; cancelling `self` cancels the child
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            reason: Arc::new(OnceLock::new()),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Cancel this token and its subtree. The first reason wins.
    pub fn cancel(&self, reason: CancelReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    /// Cancel with a free-form reason
    pub fn cancel_with(&self, reason: impl Into<String>) {
        self.cancel(CancelReason::Cancelled(reason.into()));
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the token is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The reason this token (or the nearest cancelled ancestor) was cancelled
    pub fn reason(&self) -> Option<CancelReason> {
        if !self.is_cancelled() {
            return None;
        }

        self.reason
            .get()
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.reason()))
            .or_else(|| Some(CancelReason::Cancelled("cancelled".into())))
    }

    /// The cancellation as an error, if cancelled
    pub fn error(&self) -> Option<RexError> {
        self.reason().map(CancelReason::into_error)
    }
}

/// Effective timeout for a unit
///
/// Non-positive or non-finite values mean "no timeout", and so does a value
/// too large for a `Duration`. With a positive
/// ceiling the result is never longer than the ceiling, including for units
/// that declare no timeout of their own.
pub fn effective_timeout(unit_secs: Option<f64>, ceiling_secs: Option<f64>) -> Option<Duration> {
    let positive = |t: &f64| t.is_finite() && *t > 0.0;
    let unit = unit_secs.filter(positive);
    let ceiling = ceiling_secs.filter(positive);

    let secs = match (unit, ceiling) {
        (Some(u), Some(c)) => u.min(c),
        (Some(u), None) => u,
        (None, Some(c)) => c,
        (None, None) => return None,
    };

    Duration::try_from_secs_f64(secs).ok()
}

/// Derives per-unit scopes under an optional global timeout ceiling
#[derive(Debug, Clone, Copy, Default)]
pub struct Coordinator {
    ceiling: Option<f64>,
}

impl Coordinator {
    /// Create a coordinator with a global ceiling in seconds
    pub fn new(ceiling_secs: Option<f64>) -> Self {
        Self {
            ceiling: ceiling_secs,
        }
    }

    pub fn ceiling(&self) -> Option<f64> {
        self.ceiling
    }

    /// Derive the scope a unit runs in
    pub fn scope(&self, parent: &CancelToken, unit_timeout_secs: Option<f64>) -> UnitScope {
        UnitScope {
            token: parent.child(),
            timeout: effective_timeout(unit_timeout_secs, self.ceiling),
        }
    }
}

/// Child token and timeout for a single unit run
#[derive(Debug, Clone)]
pub struct UnitScope {
    token: CancelToken,
    timeout: Option<Duration>,
}

impl UnitScope {
    /// The child token handed to the unit's work
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `work` until it finishes, the token is cancelled, or the timeout
    /// elapses. On expiry the child token is cancelled with a timeout reason.
    pub async fn guard<F, T>(&self, work: F) -> RexResult<T>
    where
        F: Future<Output = RexResult<T>>,
    {
        if let Some(err) = self.token.error() {
            return Err(err);
        }

        let timeout = self.timeout;
        let timer = async move {
            match timeout {
                Some(after) => {
                    tokio::time::sleep(after).await;
                    after
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.cancellation()),
            after = timer => {
                tracing::debug!(?after, "unit timed out");
                self.token.cancel(CancelReason::Timeout(after));
                Err(self.cancellation())
            }
            result = work => result,
        }
    }

    fn cancellation(&self) -> RexError {
        self.token.error().unwrap_or_else(|| RexError::Cancelled {
            reason: "cancelled".into(),
        })
    }
}
