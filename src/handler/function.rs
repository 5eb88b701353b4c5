//! Handler trait and closure adapter.

use std::future::Future;
use std::pin::Pin;

use super::Response;
use crate::request::Request;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Request-processing callback.
///
/// Called once per request, after every required input stream has been
/// terminated. The returned [`Response`] is framed and sent by the
/// connection.
pub trait Handler: Send + Sync + 'static {
    /// Handle a ready request.
    fn call(&self, request: Request) -> BoxFuture<'static, Response>;
}

/// Wrapper turning an async closure into a [`Handler`].
pub struct FnHandler<F> {
    handler: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    /// Create a new closure handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        Box::pin((self.handler)(request))
    }
}

/// Build a [`Handler`] from an async closure.
pub fn handler_fn<F, Fut>(handler: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FnHandler::new(handler)
}
