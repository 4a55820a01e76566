use crate::checker::LimitChecker;
use crate::enforcement::with_limit_check;
use crate::error::EnforcementError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that takes one permit per request from a [`LimitChecker`].
///
/// The permit is handed back if the inner service fails, so only successful calls count
/// against the limit.
#[derive(Debug)]
pub struct LimitLayer<C: ?Sized> {
    checker: Arc<C>,
}

impl<C: ?Sized> Clone for LimitLayer<C> {
    fn clone(&self) -> Self {
        Self { checker: self.checker.clone() }
    }
}

impl<C> LimitLayer<C> {
    pub fn new(checker: C) -> Self {
        Self { checker: Arc::new(checker) }
    }
}

impl<C: ?Sized> LimitLayer<C> {
    /// Share an existing checker, e.g. one handed out by a factory.
    pub fn from_shared(checker: Arc<C>) -> Self {
        Self { checker }
    }
}

impl<S, C> Layer<S> for LimitLayer<C>
where
    C: LimitChecker + ?Sized + 'static,
{
    type Service = LimitService<S, C>;

    fn layer(&self, service: S) -> Self::Service {
        LimitService { inner: service, checker: self.checker.clone() }
    }
}

/// Middleware service produced by [`LimitLayer`].
#[derive(Debug)]
pub struct LimitService<S, C: ?Sized> {
    inner: S,
    checker: Arc<C>,
}

impl<S: Clone, C: ?Sized> Clone for LimitService<S, C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), checker: self.checker.clone() }
    }
}

impl<S, C, Req> Service<Req> for LimitService<S, C>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    S::Response: Send + 'static,
    C: LimitChecker + ?Sized + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = EnforcementError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(EnforcementError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let checker = self.checker.clone();
        // Take the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move { with_limit_check(&*checker, move || inner.call(req)).await })
    }
}
