use async_trait::async_trait;
use limitforge::{CheckDecision, CheckError, CheckRequest, DecisionSource, TransportError};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::BoxCloneService;

/// What the stub decision source answers with.
#[derive(Clone, Debug)]
pub enum StubOutcome {
    Decision(Value),
    ProtocolFailure(u16),
    Malformed,
    Timeout,
}

/// In-process decision source that records every request it sees.
#[derive(Clone)]
pub struct StubSource {
    outcome: Arc<Mutex<StubOutcome>>,
    seen: Arc<Mutex<Vec<CheckRequest>>>,
}

impl StubSource {
    pub fn new(outcome: StubOutcome) -> Self {
        Self { outcome: Arc::new(Mutex::new(outcome)), seen: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn allowing(remaining: u64, limit: u64) -> Self {
        Self::new(StubOutcome::Decision(json!({
            "allowed": true,
            "remaining": remaining,
            "limit": limit,
            "reset_at": 1700000000u64,
        })))
    }

    pub fn denying(limit: u64, retry_after_ms: u64) -> Self {
        Self::new(StubOutcome::Decision(json!({
            "allowed": false,
            "remaining": 0,
            "limit": limit,
            "retry_after_ms": retry_after_ms,
        })))
    }

    pub fn set(&self, outcome: StubOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn seen(&self) -> Vec<CheckRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionSource for StubSource {
    async fn check(&self, request: &CheckRequest) -> Result<CheckDecision, CheckError> {
        self.seen.lock().unwrap().push(request.clone());
        let outcome = self.outcome.lock().unwrap().clone();
        match outcome {
            StubOutcome::Decision(body) => CheckDecision::from_json(body),
            StubOutcome::ProtocolFailure(status) => {
                Err(CheckError::Protocol { status, detail: "stub".into() })
            }
            StubOutcome::Malformed => Err(CheckError::MalformedResponse("stub".into())),
            StubOutcome::Timeout => Err(TransportError::Timeout {
                elapsed: Duration::from_secs(1),
                timeout: Duration::from_secs(1),
            }
            .into()),
        }
    }
}

/// Decision source that never answers. Records when a check starts and when
/// its future is dropped.
#[derive(Clone, Default)]
pub struct HangingSource {
    started: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

impl HangingSource {
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DecisionSource for HangingSource {
    async fn check(&self, _request: &CheckRequest) -> Result<CheckDecision, CheckError> {
        let _guard = SetOnDrop(self.dropped.clone());
        self.started.store(true, Ordering::SeqCst);
        std::future::pending::<Result<CheckDecision, CheckError>>().await
    }
}

/// Downstream service that counts calls and echoes the decision it was handed.
#[derive(Clone, Default)]
pub struct Downstream {
    pub calls: Arc<AtomicUsize>,
}

impl Downstream {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn service(
        &self,
    ) -> BoxCloneService<http::Request<String>, http::Response<String>, Infallible> {
        let calls = self.calls.clone();
        BoxCloneService::new(tower::service_fn(move |req: http::Request<String>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let seen_remaining = req
                    .extensions()
                    .get::<CheckDecision>()
                    .map(|d| d.remaining().to_string())
                    .unwrap_or_else(|| "none".to_string());
                Ok::<_, Infallible>(http::Response::new(format!("ok remaining={seen_remaining}")))
            }
        }))
    }
}

pub fn request(
    method: http::Method,
    path: &str,
    headers: &[(&str, &str)],
) -> http::Request<String> {
    let mut builder = http::Request::builder().method(method).uri(path);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(String::new()).unwrap()
}

pub fn has_rate_limit_headers(headers: &http::HeaderMap) -> bool {
    headers.keys().any(|k| {
        let name = k.as_str();
        name.starts_with("x-ratelimit") || name == "retry-after"
    })
}
