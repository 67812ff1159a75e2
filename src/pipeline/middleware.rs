// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Ordered middleware chain (onion model)
//!
//! The first registered middleware is the outermost layer. Each one gets a
//! [`Next`] handle to the rest of the chain and decides whether, and when,
//! to call it. All layers share one context and mutate it in place.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{RexError, RexResult};

/// One layer of a [`Pipeline`]
#[async_trait]
pub trait Middleware<C: Send>: Send + Sync {
    /// Name used in trace logs
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Handle the context. Call `next.run(ctx)` at most once to continue
    /// with the rest of the chain; not calling it short-circuits.
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> RexResult<()>;
}

/// Handle to the remainder of the chain
pub struct Next<'a, C: Send> {
    chain: &'a [Arc<dyn Middleware<C>>],
    position: usize,
    called: AtomicBool,
}

impl<'a, C: Send> Next<'a, C> {
    fn new(chain: &'a [Arc<dyn Middleware<C>>], position: usize) -> Self {
        Self {
            chain,
            position,
            called: AtomicBool::new(false),
        }
    }

    /// Run the remaining middlewares
    ///
    /// A second call from the same middleware fails with
    /// [`RexError::NextCalledTwice`] without touching the context.
    pub async fn run(&self, ctx: &mut C) -> RexResult<()> {
        if self.called.swap(true, Ordering::SeqCst) {
            return Err(RexError::NextCalledTwice {
                position: self.position,
            });
        }

        dispatch(self.chain, self.position + 1, ctx).await
    }

    /// Whether the rest of the chain has been entered
    pub fn was_called(&self) -> bool {
        self.called.load(Ordering::SeqCst)
    }
}

async fn dispatch<C: Send>(
    chain: &[Arc<dyn Middleware<C>>],
    position: usize,
    ctx: &mut C,
) -> RexResult<()> {
    let Some((current, rest)) = chain.split_first() else {
        return Ok(());
    };

    tracing::trace!(position, middleware = current.name(), "entering middleware");
    let result = current.handle(ctx, Next::new(rest, position)).await;
    tracing::trace!(position, ok = result.is_ok(), "leaving middleware");
    result
}

/// Ordered list of middlewares over a context type
pub struct Pipeline<C: Send> {
    middleware: Vec<Arc<dyn Middleware<C>>>,
}

impl<C: Send> Default for Pipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send> Pipeline<C> {
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
        }
    }

    /// Append a middleware; registration order is execution order
    pub fn use_middleware(&mut self, middleware: impl Middleware<C> + 'static) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Builder form of [`Pipeline::use_middleware`]
    pub fn with(mut self, middleware: impl Middleware<C> + 'static) -> Self {
        self.use_middleware(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Run the chain against `ctx`
    pub async fn pipe(&self, ctx: &mut C) -> RexResult<()> {
        dispatch(&self.middleware, 0, ctx).await
    }
}

impl<C: Send> std::fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.middleware.len())
            .finish()
    }
}
