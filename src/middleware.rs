//! Tower middleware that gates HTTP requests on a remote decision.
//!
//! Per request:
//!
//! ```text
//! PENDING -> CHECKED_ALLOWED -> FORWARDED           (decision headers attached)
//!         -> CHECKED_DENIED  -> REJECTED(429)       (decision headers attached)
//!         -> CHECK_FAILED    -> REJECTED(503)       (DenyOnFailure, no rate-limit headers)
//!                            -> FORWARDED           (AllowOnFailure, no rate-limit headers)
//! ```
//!
//! Nothing is retained between requests. Dropping the response future drops
//! the in-flight call to the decision service with it.

use crate::client::DecisionSource;
use crate::mapper::{HeaderMapper, RequestMapper};
use crate::policy::{DynamicConfig, FailurePolicy};
use crate::telemetry::{emit_best_effort, CheckEvent, NullSink, TelemetrySink};
use crate::types::{CheckDecision, CheckRequest};
use futures::future::BoxFuture;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Request, Response, StatusCode};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower_layer::Layer;
use tower_service::Service;

/// Body detail of a 429 rejection.
pub const DENIED_DETAIL: &str = "rate limited";
/// Body detail of a 503 rejection.
pub const UNAVAILABLE_DETAIL: &str = "rate limit service unavailable";

/// A layer that enforces remote rate-limit decisions.
pub struct EnforcementLayer<C, M = HeaderMapper, T = NullSink> {
    source: Arc<C>,
    mapper: Arc<M>,
    cost: NonZeroU32,
    policy: DynamicConfig<FailurePolicy>,
    sink: T,
}

impl<C, M, T: Clone> Clone for EnforcementLayer<C, M, T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            mapper: self.mapper.clone(),
            cost: self.cost,
            policy: self.policy.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<C> EnforcementLayer<C>
where
    C: DecisionSource,
{
    /// Layer with the header mapper, a cost of 1, fail-closed policy and no telemetry.
    pub fn new(source: C) -> Self {
        Self {
            source: Arc::new(source),
            mapper: Arc::new(HeaderMapper),
            cost: NonZeroU32::MIN,
            policy: DynamicConfig::new(FailurePolicy::default()),
            sink: NullSink,
        }
    }
}

impl<C, M, T> EnforcementLayer<C, M, T> {
    /// Replace the request mapper.
    pub fn with_mapper<M2>(self, mapper: M2) -> EnforcementLayer<C, M2, T> {
        EnforcementLayer {
            source: self.source,
            mapper: Arc::new(mapper),
            cost: self.cost,
            policy: self.policy,
            sink: self.sink,
        }
    }

    /// Units every request consumes.
    pub fn with_cost(mut self, cost: NonZeroU32) -> Self {
        self.cost = cost;
        self
    }

    /// Disposition of requests whose check fails.
    ///
    /// Installs a fresh policy handle: clones of the layer made before this
    /// call keep their own policy. Use
    /// [`failure_policy_handle`](Self::failure_policy_handle) for shared
    /// runtime switching.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = DynamicConfig::new(policy);
        self
    }

    /// Shorthand for [`with_failure_policy`](Self::with_failure_policy).
    pub fn deny_on_failure(self, deny: bool) -> Self {
        self.with_failure_policy(FailurePolicy::from_deny_on_failure(deny))
    }

    /// Send one [`CheckEvent`] per request to `sink`.
    pub fn with_sink<T2>(self, sink: T2) -> EnforcementLayer<C, M, T2>
    where
        T2: TelemetrySink,
    {
        EnforcementLayer {
            source: self.source,
            mapper: self.mapper,
            cost: self.cost,
            policy: self.policy,
            sink,
        }
    }

    /// Handle for switching the failure policy while the layer is live.
    ///
    /// Services already built from this layer observe updates.
    pub fn failure_policy_handle(&self) -> DynamicConfig<FailurePolicy> {
        self.policy.clone()
    }

    pub fn cost(&self) -> u32 {
        self.cost.get()
    }
}

impl<S, C, M, T: Clone> Layer<S> for EnforcementLayer<C, M, T> {
    type Service = EnforcementService<S, C, M, T>;

    fn layer(&self, inner: S) -> Self::Service {
        EnforcementService {
            inner,
            source: self.source.clone(),
            mapper: self.mapper.clone(),
            cost: self.cost,
            policy: self.policy.clone(),
            sink: self.sink.clone(),
        }
    }
}

/// Middleware service produced by [`EnforcementLayer`].
pub struct EnforcementService<S, C, M = HeaderMapper, T = NullSink> {
    inner: S,
    source: Arc<C>,
    mapper: Arc<M>,
    cost: NonZeroU32,
    policy: DynamicConfig<FailurePolicy>,
    sink: T,
}

impl<S: Clone, C, M, T: Clone> Clone for EnforcementService<S, C, M, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            source: self.source.clone(),
            mapper: self.mapper.clone(),
            cost: self.cost,
            policy: self.policy.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<S, C, M, T, ReqBody, ResBody> Service<Request<ReqBody>> for EnforcementService<S, C, M, T>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    C: DecisionSource + 'static,
    M: RequestMapper<ReqBody> + 'static,
    T: TelemetrySink,
    T::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // Keep the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let source = self.source.clone();
        let policy = self.policy.clone();
        let sink = self.sink.clone();
        let target = self.mapper.map(&req);
        let cost = self.cost.get();

        Box::pin(async move {
            let started = Instant::now();
            let checked = match CheckRequest::for_target(target, cost) {
                Ok(check) => source.check(&check).await.map(|decision| (check, decision)),
                Err(invalid) => Err(invalid.into()),
            };

            match checked {
                Ok((check, decision)) if decision.allowed() => {
                    emit_best_effort(
                        sink,
                        CheckEvent::Allowed {
                            resource: check.resource().to_string(),
                            subject: check.subject().to_string(),
                            remaining: decision.remaining(),
                            limit: decision.limit(),
                            elapsed: started.elapsed(),
                        },
                    )
                    .await;
                    let headers = decision.headers().clone();
                    req.extensions_mut().insert(decision);
                    let mut response = inner.call(req).await?;
                    relay_headers(response.headers_mut(), &headers, false);
                    Ok(response)
                }
                Ok((check, decision)) => {
                    tracing::debug!(
                        resource = check.resource(),
                        subject = check.subject(),
                        retry_after_ms = decision.retry_after_ms(),
                        "request rate limited"
                    );
                    emit_best_effort(
                        sink,
                        CheckEvent::Denied {
                            resource: check.resource().to_string(),
                            subject: check.subject().to_string(),
                            retry_after: decision.retry_after(),
                            elapsed: started.elapsed(),
                        },
                    )
                    .await;
                    Ok(denied_response(&decision))
                }
                Err(err) => {
                    let policy = *policy.get();
                    tracing::warn!(
                        kind = %err.kind(),
                        policy = %policy,
                        error = %err,
                        "rate limit check failed"
                    );
                    emit_best_effort(
                        sink,
                        CheckEvent::Failed { kind: err.kind(), policy, elapsed: started.elapsed() },
                    )
                    .await;
                    match policy {
                        FailurePolicy::DenyOnFailure => Ok(unavailable_response()),
                        FailurePolicy::AllowOnFailure => inner.call(req).await,
                    }
                }
            }
        })
    }
}

/// Copy decision headers onto `target`.
///
/// On the forwarding path the headers count as set before the downstream
/// handler ran, so values it set itself are kept (`overwrite = false`).
/// Entries that are not valid HTTP headers are skipped.
fn relay_headers(
    target: &mut HeaderMap,
    headers: &std::collections::BTreeMap<String, String>,
    overwrite: bool,
) {
    for (name, value) in headers {
        let parsed = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value));
        match parsed {
            (Ok(name), Ok(value)) => {
                if overwrite || !target.contains_key(&name) {
                    target.insert(name, value);
                }
            }
            _ => tracing::warn!(header = %name, "skipping invalid rate limit header"),
        }
    }
}

fn json_response<B: From<String>>(status: StatusCode, body: serde_json::Value) -> Response<B> {
    let mut response = Response::new(B::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn denied_response<B: From<String>>(decision: &CheckDecision) -> Response<B> {
    let mut response = json_response(
        StatusCode::TOO_MANY_REQUESTS,
        serde_json::json!({
            "detail": DENIED_DETAIL,
            "retry_after_ms": decision.retry_after_ms(),
        }),
    );
    relay_headers(response.headers_mut(), decision.headers(), true);
    response
}

fn unavailable_response<B: From<String>>() -> Response<B> {
    json_response(
        StatusCode::SERVICE_UNAVAILABLE,
        serde_json::json!({ "detail": UNAVAILABLE_DETAIL }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn relay_skips_invalid_entries() {
        let mut headers = BTreeMap::new();
        headers.insert("X-RateLimit-Limit".to_string(), "10".to_string());
        headers.insert("bad header".to_string(), "1".to_string());
        headers.insert("X-Bad-Value".to_string(), "line\nbreak".to_string());

        let mut target = HeaderMap::new();
        relay_headers(&mut target, &headers, true);
        assert_eq!(target.len(), 1);
        assert_eq!(target["x-ratelimit-limit"], "10");
    }

    #[test]
    fn relay_respects_downstream_values_unless_overwriting() {
        let mut headers = BTreeMap::new();
        headers.insert("X-RateLimit-Remaining".to_string(), "9".to_string());

        let mut target = HeaderMap::new();
        target.insert("x-ratelimit-remaining", HeaderValue::from_static("custom"));
        relay_headers(&mut target, &headers, false);
        assert_eq!(target["x-ratelimit-remaining"], "custom");
        relay_headers(&mut target, &headers, true);
        assert_eq!(target["x-ratelimit-remaining"], "9");
    }

    #[test]
    fn unavailable_response_is_bare_503() {
        let response: Response<String> = unavailable_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().len(), 1);
        let body: serde_json::Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["detail"], UNAVAILABLE_DETAIL);
    }
}
