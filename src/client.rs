//! Decision client for the remote rate-limit service.
//!
//! The client performs exactly one round trip per check: no retries, no
//! caching. Outcomes are either a validated [`CheckDecision`] or a classified
//! [`CheckError`]:
//!
//! | Remote outcome | Result |
//! |---|---|
//! | network failure / timeout | `CheckError::Transport` |
//! | 200 with a valid `allowed: true` body | `Ok(decision)` |
//! | 429 with a valid `allowed: false` body | `Ok(decision)` |
//! | 200/429 with unusable body | `CheckError::MalformedResponse` |
//! | 429 without a decision document | `CheckError::Protocol` |
//! | any other status | `CheckError::Protocol` |

use crate::error::{CheckError, ConfigError, TransportError};
use crate::timeout::TimeoutPolicy;
use crate::types::{CheckDecision, CheckRequest, HealthStatus};
use async_trait::async_trait;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Header carrying the opaque API key on every call to the service.
pub const API_KEY_HEADER: &str = "X-API-Key";
/// Path of the decision endpoint, relative to the base URL.
pub const CHECK_PATH: &str = "/v1/check";
/// Path of the health endpoint, relative to the base URL.
pub const HEALTH_PATH: &str = "/v1/health";

const DETAIL_MAX_CHARS: usize = 200;

/// Anything that can answer a check request.
///
/// The enforcement middleware depends on this trait rather than on
/// [`DecisionClient`] directly, so it can be driven by a stub in tests or by a
/// different transport.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Perform one check.
    async fn check(&self, request: &CheckRequest) -> Result<CheckDecision, CheckError>;
}

#[async_trait]
impl<T> DecisionSource for Arc<T>
where
    T: DecisionSource + ?Sized,
{
    async fn check(&self, request: &CheckRequest) -> Result<CheckDecision, CheckError> {
        (**self).check(request).await
    }
}

/// HTTP client for `POST {base_url}/v1/check`.
#[derive(Clone)]
pub struct DecisionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: TimeoutPolicy,
}

impl fmt::Debug for DecisionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout.duration())
            .finish()
    }
}

impl DecisionClient {
    /// Start building a client.
    pub fn builder() -> DecisionClientBuilder {
        DecisionClientBuilder::new()
    }

    /// Client with the default timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::builder().base_url(base_url).api_key(api_key).build()
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Configured bound on one round trip.
    pub fn timeout(&self) -> Duration {
        self.timeout.duration()
    }

    /// Probe `GET {base_url}/v1/health`. Non-authoritative; used for status display.
    pub async fn health(&self) -> Result<HealthStatus, CheckError> {
        fetch_health(&self.http, &self.base_url, &self.timeout).await
    }

    async fn round_trip(&self, request: &CheckRequest) -> Result<CheckDecision, CheckError> {
        let url = format!("{}{}", self.base_url, CHECK_PATH);
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        let status = response.status();
        let body = response.bytes().await.map_err(TransportError::from_reqwest)?;
        interpret_response(status, &body)
    }
}

#[async_trait]
impl DecisionSource for DecisionClient {
    async fn check(&self, request: &CheckRequest) -> Result<CheckDecision, CheckError> {
        let started = Instant::now();
        let result = self.timeout.execute(|| self.round_trip(request)).await;
        match &result {
            Ok(decision) => tracing::debug!(
                resource = request.resource(),
                subject = request.subject(),
                cost = request.cost(),
                allowed = decision.allowed(),
                remaining = decision.remaining(),
                elapsed = ?started.elapsed(),
                "rate limit check"
            ),
            Err(err) => tracing::debug!(
                resource = request.resource(),
                subject = request.subject(),
                kind = %err.kind(),
                error = %err,
                "rate limit check failed"
            ),
        }
        result
    }
}

/// Unauthenticated client for `GET {base_url}/v1/health`.
///
/// The health endpoint takes no API key, so status displays can probe a
/// service without holding credentials.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    http: reqwest::Client,
    base_url: String,
    timeout: TimeoutPolicy,
}

impl HealthProbe {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the service once.
    pub async fn health(&self) -> Result<HealthStatus, CheckError> {
        fetch_health(&self.http, &self.base_url, &self.timeout).await
    }
}

async fn fetch_health(
    http: &reqwest::Client,
    base_url: &str,
    timeout: &TimeoutPolicy,
) -> Result<HealthStatus, CheckError> {
    let url = format!("{base_url}{HEALTH_PATH}");
    timeout
        .execute(|| async {
            let response = http.get(&url).send().await.map_err(TransportError::from_reqwest)?;
            let status = response.status();
            let body = response.bytes().await.map_err(TransportError::from_reqwest)?;
            if !status.is_success() {
                return Err(CheckError::Protocol {
                    status: status.as_u16(),
                    detail: body_detail(&body),
                });
            }
            serde_json::from_slice::<HealthStatus>(&body)
                .map_err(|e| CheckError::MalformedResponse(format!("health body: {e}")))
        })
        .await
}

/// Turn one HTTP response into a decision or a classified failure.
pub(crate) fn interpret_response(
    status: StatusCode,
    body: &[u8],
) -> Result<CheckDecision, CheckError> {
    let expect_allowed = match status {
        StatusCode::OK => true,
        StatusCode::TOO_MANY_REQUESTS => false,
        other => {
            return Err(CheckError::Protocol { status: other.as_u16(), detail: body_detail(body) })
        }
    };

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) if !expect_allowed => {
            return Err(not_a_decision(status, body));
        }
        Err(e) => {
            return Err(CheckError::MalformedResponse(format!("body is not JSON: {e}")));
        }
    };

    // A 429 without a decision document is the service refusing the call itself.
    if !expect_allowed && value.get("allowed").is_none() {
        return Err(not_a_decision(status, body));
    }

    let decision = CheckDecision::from_json(value)?;

    if decision.allowed() != expect_allowed {
        return Err(CheckError::MalformedResponse(format!(
            "status {} contradicts allowed={}",
            status.as_u16(),
            decision.allowed()
        )));
    }
    Ok(decision)
}

fn not_a_decision(status: StatusCode, body: &[u8]) -> CheckError {
    CheckError::Protocol {
        status: status.as_u16(),
        detail: format!("no decision in body: {}", body_detail(body)),
    }
}

fn body_detail(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    trimmed.chars().take(DETAIL_MAX_CHARS).collect()
}

/// Builder for [`DecisionClient`].
#[derive(Debug, Default)]
pub struct DecisionClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    http: Option<reqwest::Client>,
}

impl DecisionClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service root, e.g. `https://limits.internal`. A trailing slash is ignored.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Opaque API key sent as `X-API-Key`.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Bound on one round trip. Defaults to one second.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reuse an existing HTTP client (connection pool, TLS settings).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the client, validating inputs.
    pub fn build(mut self) -> Result<DecisionClient, ConfigError> {
        let api_key = self.api_key.take().ok_or(ConfigError::Missing("api_key"));
        let probe = self.build_health_probe()?;
        let api_key = api_key?;
        if api_key.is_empty() {
            return Err(ConfigError::Invalid { key: "api_key", reason: "must not be empty".into() });
        }
        Ok(DecisionClient {
            http: probe.http,
            base_url: probe.base_url,
            api_key,
            timeout: probe.timeout,
        })
    }

    /// Build a [`HealthProbe`]. Any API key set on the builder is ignored.
    pub fn build_health_probe(self) -> Result<HealthProbe, ConfigError> {
        let base_url = self.base_url.ok_or(ConfigError::Missing("base_url"))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "base_url",
                reason: format!("expected an http(s) URL, got `{base_url}`"),
            });
        }
        let timeout = self.timeout.unwrap_or(crate::timeout::DEFAULT_CHECK_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigError::Invalid { key: "timeout", reason: "must be non-zero".into() });
        }
        if timeout == Duration::MAX {
            return Err(ConfigError::Invalid { key: "timeout", reason: "must be finite".into() });
        }
        Ok(HealthProbe {
            http: self.http.unwrap_or_default(),
            base_url,
            timeout: TimeoutPolicy::new(timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn ok_status_yields_allowed_decision() {
        let d = interpret_response(
            StatusCode::OK,
            &body(json!({"allowed": true, "remaining": 9, "limit": 10, "reset_at": 1700000000})),
        )
        .unwrap();
        assert!(d.allowed());
        assert_eq!(d.remaining(), 9);
        assert_eq!(d.reset_at(), Some(1700000000));
    }

    #[test]
    fn limited_status_yields_denied_decision() {
        let d = interpret_response(
            StatusCode::TOO_MANY_REQUESTS,
            &body(json!({"allowed": false, "remaining": 0, "limit": 10, "retry_after_ms": 2000})),
        )
        .unwrap();
        assert!(!d.allowed());
        assert_eq!(d.retry_after_ms(), Some(2000));
    }

    #[test]
    fn other_statuses_are_protocol_errors() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::INTERNAL_SERVER_ERROR, StatusCode::CREATED]
        {
            let err = interpret_response(status, b"{\"detail\":\"nope\"}").unwrap_err();
            assert_eq!(err.status(), Some(status.as_u16()));
        }
    }

    #[test]
    fn limited_status_without_decision_is_protocol_error() {
        let err = interpret_response(StatusCode::TOO_MANY_REQUESTS, b"slow down").unwrap_err();
        assert_eq!(err.status(), Some(429));
        let err = interpret_response(
            StatusCode::TOO_MANY_REQUESTS,
            &body(json!({"detail": "too many admin calls"})),
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn unparsable_ok_body_is_malformed() {
        let err = interpret_response(StatusCode::OK, b"<html>").unwrap_err();
        assert!(matches!(err, CheckError::MalformedResponse(_)));
    }

    #[test]
    fn incomplete_limited_decision_is_malformed() {
        let err =
            interpret_response(StatusCode::TOO_MANY_REQUESTS, &body(json!({"allowed": false})))
                .unwrap_err();
        assert!(matches!(err, CheckError::MalformedResponse(_)));
    }

    #[test]
    fn status_contradicting_allowed_is_malformed() {
        let err = interpret_response(
            StatusCode::OK,
            &body(json!({"allowed": false, "remaining": 0, "limit": 10})),
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::MalformedResponse(_)));
    }

    #[test]
    fn wrong_field_types_are_malformed() {
        let err = interpret_response(
            StatusCode::OK,
            &body(json!({"allowed": "yes", "remaining": 1, "limit": 10})),
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::MalformedResponse(_)));
    }

    #[test]
    fn builder_validates_and_trims() {
        let client = DecisionClient::builder()
            .base_url("http://localhost:8000/")
            .api_key("k1")
            .timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.timeout(), Duration::from_millis(250));
        assert!(!format!("{:?}", client).contains("k1"));

        assert_eq!(
            DecisionClient::builder().api_key("k").build().unwrap_err(),
            ConfigError::Missing("base_url")
        );
        assert_eq!(
            DecisionClient::builder().base_url("http://x").build().unwrap_err(),
            ConfigError::Missing("api_key")
        );
        assert!(matches!(
            DecisionClient::new("localhost:8000", "k").unwrap_err(),
            ConfigError::Invalid { key: "base_url", .. }
        ));
        assert!(matches!(
            DecisionClient::builder()
                .base_url("http://x")
                .api_key("k")
                .timeout(Duration::ZERO)
                .build()
                .unwrap_err(),
            ConfigError::Invalid { key: "timeout", .. }
        ));
        assert!(matches!(
            DecisionClient::builder()
                .base_url("http://x")
                .api_key("k")
                .timeout(Duration::MAX)
                .build()
                .unwrap_err(),
            ConfigError::Invalid { key: "timeout", .. }
        ));
    }

    #[test]
    fn health_probe_needs_no_api_key() {
        let probe = DecisionClient::builder()
            .base_url("http://localhost:8000/")
            .build_health_probe()
            .unwrap();
        assert_eq!(probe.base_url(), "http://localhost:8000");
        assert!(matches!(
            DecisionClient::builder().build_health_probe().unwrap_err(),
            ConfigError::Missing("base_url")
        ));
    }

    #[test]
    fn body_detail_is_bounded() {
        let long = "x".repeat(1000);
        assert_eq!(body_detail(long.as_bytes()).len(), DETAIL_MAX_CHARS);
        assert_eq!(body_detail(b"  "), "<empty body>");
    }
}
