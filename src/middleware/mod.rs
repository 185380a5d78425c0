//! Composable request/response processor chain (SPEC_FULL §4.4).
//!
//! A [`MiddlewareChain`] holds an ordered list of [`Middleware`] plus one
//! terminal handler. Building the chain materializes a single handler by
//! wrapping right-to-left, so the first-registered middleware sees the
//! message first. Both stateless (a bare closure) and stateful (an object
//! retaining per-instance state, like [`validation::ValidationMiddleware`])
//! middleware are expressed through the same trait.
//!
//! # Canonical Import Path
//!
//! ```no_run
//! use cowgnition::middleware::{Context, Middleware, MiddlewareChain};
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;

pub mod validation;

/// A boxed, `Send` future, matching the teacher's `BoxFuture` idiom.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The continuation a middleware invokes to proceed down the chain.
pub type NextFn =
    Arc<dyn Fn(Context, Vec<u8>) -> BoxFuture<'static, Result<Option<Vec<u8>>>> + Send + Sync>;

/// Per-message context threaded down the chain (SPEC_FULL §4.4).
#[derive(Clone)]
pub struct Context {
    /// Correlation ID for this message, attached to every tracing span
    /// emitted while handling it (SPEC_FULL §10.5).
    pub correlation_id: Uuid,
    /// Cancellation signal shared with the transport's read/write calls.
    pub cancellation: CancellationToken,
    /// The request method, set once the validation middleware has
    /// classified the message. `None` until then, and for responses.
    pub method: Option<String>,
}

impl Context {
    /// A fresh context with a new correlation ID and no method set yet.
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            cancellation,
            method: None,
        }
    }
}

/// A single processor in the chain. Implementations may call `next` to
/// continue processing or return without calling it to short-circuit.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process one message, optionally delegating to `next`.
    async fn handle(&self, ctx: Context, message: Vec<u8>, next: NextFn) -> Result<Option<Vec<u8>>>;
}

/// Wraps a plain async closure as a stateless [`Middleware`].
pub struct FnMiddleware<F>(F);

impl<F> FnMiddleware<F> {
    /// Build a stateless middleware from a closure matching
    /// [`Middleware::handle`]'s signature.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Context, Vec<u8>, NextFn) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Vec<u8>>>> + Send + 'static,
{
    async fn handle(&self, ctx: Context, message: Vec<u8>, next: NextFn) -> Result<Option<Vec<u8>>> {
        (self.0)(ctx, message, next).await
    }
}

/// An ordered sequence of middleware plus a terminal handler, materialized
/// into a single callable handler at construction time. Immutable
/// thereafter (SPEC_FULL §3).
pub struct MiddlewareChain {
    handler: NextFn,
}

impl MiddlewareChain {
    /// Build the chain. `middlewares[0]` sees each message first.
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>, terminal: NextFn) -> Self {
        let mut handler = terminal;
        for mw in middlewares.into_iter().rev() {
            let inner = handler;
            handler = Arc::new(move |ctx: Context, bytes: Vec<u8>| {
                let mw = Arc::clone(&mw);
                let inner = Arc::clone(&inner);
                Box::pin(async move { mw.handle(ctx, bytes, inner).await }) as BoxFuture<'static, _>
            });
        }
        Self { handler }
    }

    /// Run one message through the full chain.
    pub async fn process(&self, ctx: Context, message: Vec<u8>) -> Result<Option<Vec<u8>>> {
        (self.handler)(ctx, message).await
    }
}
