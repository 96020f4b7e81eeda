//! The handler capability.
//!
//! Handlers are registered explicitly into the router; nothing is discovered
//! at runtime. A handler either returns a response or fails, and a failure
//! (or panic) is turned into a `500` by the dispatcher.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use super::request::HandlerRequest;
use super::response::Response;

/// Request handling capability bound to a route.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: HandlerRequest) -> anyhow::Result<Response>;
}

/// Adapts an async closure into a [`Handler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap a closure as a handler.
///
/// ```ignore
/// let hello = handler_fn(|req| async move {
///     Ok(Response::text(format!("hello {}", req.param("name").unwrap_or("world"))))
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    async fn handle(&self, request: HandlerRequest) -> anyhow::Result<Response> {
        (self.f)(request).await
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}
