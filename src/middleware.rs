//! Tower middleware guarding a handler with a [`RateLimiter`].
//!
//! Per request:
//! 1. If the [`Policy`] does not apply, the inner service is called directly and no
//!    counter is touched.
//! 2. Otherwise the scope is extracted and the limiter checks and records the request.
//! 3. Allowed requests reach the inner service. Rejected requests never do: the
//!    rejection handler builds the response instead (default: [`Forbidden`]).
//!
//! Limiter failures are absorbed by the limiter itself, so the service's error type is
//! the inner service's.

use crate::limiter::{Decision, RateLimiter};
use crate::policy::Policy;
use crate::request::RequestMeta;
use crate::telemetry::{emit_best_effort, NullSink, RateLimitEvent, TelemetrySink};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::ServiceFn;
use tower_layer::Layer;
use tower_service::Service;

/// Default body of a rejection.
pub const DEFAULT_REJECTION_MESSAGE: &str = "Rate limit exceeded";

/// HTTP 403-equivalent returned to over-limit callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forbidden {
    message: String,
}

impl Forbidden {
    /// Status code a framework adapter should use.
    pub const STATUS: u16 = 403;

    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn status(&self) -> u16 {
        Self::STATUS
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Default for Forbidden {
    fn default() -> Self {
        Self::new(DEFAULT_REJECTION_MESSAGE)
    }
}

impl fmt::Display for Forbidden {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", Self::STATUS, self.message)
    }
}

impl From<Forbidden> for (u16, String) {
    fn from(forbidden: Forbidden) -> Self {
        (Forbidden::STATUS, forbidden.message)
    }
}

/// Builds the response for a rejected request.
pub type RejectFn<Req, Res> = Arc<dyn Fn(&Req) -> Res + Send + Sync>;

/// A layer that enforces rate limits using a [`RateLimiter`].
pub struct RateLimitLayer<L, Req, Res, K = NullSink> {
    limiter: Arc<L>,
    policy: Policy<Req>,
    reject: RejectFn<Req, Res>,
    sink: K,
}

impl<L, Req, Res, K: Clone> Clone for RateLimitLayer<L, Req, Res, K> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            policy: self.policy.clone(),
            reject: self.reject.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<L, Req, Res, K: fmt::Debug> fmt::Debug for RateLimitLayer<L, Req, Res, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitLayer")
            .field("limiter", &"<limiter>")
            .field("policy", &self.policy)
            .field("reject", &"<rejection handler>")
            .field("sink", &self.sink)
            .finish()
    }
}

impl<L, Req, Res> RateLimitLayer<L, Req, Res, NullSink>
where
    L: RateLimiter + 'static,
    Req: RequestMeta + 'static,
    Res: From<Forbidden> + 'static,
{
    /// Limit every request per client address; rejections become [`Forbidden`].
    pub fn new(limiter: L) -> Self {
        Self::with_rejection(limiter, |_: &Req| Res::from(Forbidden::default()))
    }
}

impl<L, Req, Res> RateLimitLayer<L, Req, Res, NullSink>
where
    L: RateLimiter + 'static,
    Req: RequestMeta + 'static,
{
    /// Limit every request per client address with a custom rejection response.
    pub fn with_rejection<F>(limiter: L, reject: F) -> Self
    where
        F: Fn(&Req) -> Res + Send + Sync + 'static,
    {
        Self::from_parts(limiter, Policy::per_address(), reject)
    }
}

impl<L, Req, Res> RateLimitLayer<L, Req, Res, NullSink>
where
    L: RateLimiter + 'static,
{
    /// Assemble a layer from explicit strategies; works for any request type.
    pub fn from_parts<F>(limiter: L, policy: Policy<Req>, reject: F) -> Self
    where
        F: Fn(&Req) -> Res + Send + Sync + 'static,
    {
        Self { limiter: Arc::new(limiter), policy, reject: Arc::new(reject), sink: NullSink }
    }
}

impl<L, Req, Res, K> RateLimitLayer<L, Req, Res, K> {
    /// Replace the applicability predicate and scope extractor.
    pub fn policy(mut self, policy: Policy<Req>) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the rejection handler.
    pub fn on_rejected<F>(mut self, reject: F) -> Self
    where
        F: Fn(&Req) -> Res + Send + Sync + 'static,
    {
        self.reject = Arc::new(reject);
        self
    }

    /// Send a [`RateLimitEvent`] per request to `sink`.
    pub fn telemetry<K2>(self, sink: K2) -> RateLimitLayer<L, Req, Res, K2>
    where
        K2: TelemetrySink,
    {
        RateLimitLayer { limiter: self.limiter, policy: self.policy, reject: self.reject, sink }
    }

    pub fn limiter(&self) -> &Arc<L> {
        &self.limiter
    }

    /// Decorator form: guard a plain async handler function.
    pub fn wrap<F, Fut, E>(&self, handler: F) -> RateLimitService<ServiceFn<F>, L, Req, Res, K>
    where
        F: FnMut(Req) -> Fut,
        Fut: Future<Output = Result<Res, E>>,
        K: Clone,
    {
        self.layer(tower::service_fn(handler))
    }
}

impl<S, L, Req, Res, K: Clone> Layer<S> for RateLimitLayer<L, Req, Res, K> {
    type Service = RateLimitService<S, L, Req, Res, K>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, guard: self.clone() }
    }
}

/// Middleware service that enforces rate limits.
pub struct RateLimitService<S, L, Req, Res, K = NullSink> {
    inner: S,
    guard: RateLimitLayer<L, Req, Res, K>,
}

impl<S: Clone, L, Req, Res, K: Clone> Clone for RateLimitService<S, L, Req, Res, K> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), guard: self.guard.clone() }
    }
}

impl<S: fmt::Debug, L, Req, Res, K: fmt::Debug> fmt::Debug for RateLimitService<S, L, Req, Res, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitService")
            .field("inner", &self.inner)
            .field("guard", &self.guard)
            .finish()
    }
}

impl<S, L, Req, Res, K> Service<Req> for RateLimitService<S, L, Req, Res, K>
where
    S: Service<Req, Response = Res> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    L: RateLimiter + 'static,
    Req: Send + 'static,
    Res: Send + 'static,
    K: TelemetrySink,
    <K as Service<RateLimitEvent>>::Future: Send + 'static,
{
    type Response = Res;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Res, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let guard = self.guard.clone();
        // Keep the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if !guard.policy.applies(&req) {
                emit_best_effort(guard.sink.clone(), RateLimitEvent::Bypassed).await;
                return inner.call(req).await;
            }

            let scope = guard.policy.scope(&req);
            let decision = guard.limiter.check_and_record(&scope).await;
            match decision {
                Decision::Allowed { total, remaining } => {
                    let limit = total + remaining + 1;
                    emit_best_effort(
                        guard.sink.clone(),
                        RateLimitEvent::Allowed { scope, total, limit },
                    )
                    .await;
                    inner.call(req).await
                }
                Decision::Denied { total, limit } => {
                    tracing::warn!(scope = %scope, total, limit, "rate limit exceeded");
                    emit_best_effort(
                        guard.sink.clone(),
                        RateLimitEvent::Rejected { scope, total, limit },
                    )
                    .await;
                    Ok((guard.reject)(&req))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_defaults_to_generic_message() {
        let forbidden = Forbidden::default();
        assert_eq!(forbidden.status(), 403);
        assert_eq!(forbidden.message(), "Rate limit exceeded");
        assert_eq!(forbidden.to_string(), "403 Rate limit exceeded");

        let (status, body): (u16, String) = Forbidden::new("slow down").into();
        assert_eq!((status, body.as_str()), (403, "slow down"));
    }
}
