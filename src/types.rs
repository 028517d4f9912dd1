//! Check request and decision types.
//!
//! [`CheckRequest`] is what the client sends; [`CheckDecision`] is the
//! validated verdict it hands back. Neither outlives a single inbound request.

use crate::error::{CheckError, InvalidRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Header carrying the window capacity.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Header carrying the units left in the window.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// Header carrying the window reset time.
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
/// Header carrying the advisory backoff in seconds.
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Resource and subject derived from an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckTarget {
    /// Protected operation, e.g. `POST:/orders`.
    pub resource: String,
    /// Caller identity, e.g. an API key, client id, or `anonymous`.
    pub subject: String,
}

impl CheckTarget {
    pub fn new(resource: impl Into<String>, subject: impl Into<String>) -> Self {
        Self { resource: resource.into(), subject: subject.into() }
    }
}

/// One rate-limit check, serialized as the request body of `POST /v1/check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRequest {
    resource: String,
    subject: String,
    cost: u32,
}

impl CheckRequest {
    /// Build a validated request. Resource and subject must be non-empty and
    /// cost at least 1.
    pub fn new(
        resource: impl Into<String>,
        subject: impl Into<String>,
        cost: u32,
    ) -> Result<Self, InvalidRequest> {
        let resource = resource.into();
        let subject = subject.into();
        if resource.is_empty() {
            return Err(InvalidRequest::EmptyResource);
        }
        if subject.is_empty() {
            return Err(InvalidRequest::EmptySubject);
        }
        if cost == 0 {
            return Err(InvalidRequest::ZeroCost);
        }
        Ok(Self { resource, subject, cost })
    }

    /// Build a request with the default cost of 1.
    pub fn single(
        resource: impl Into<String>,
        subject: impl Into<String>,
    ) -> Result<Self, InvalidRequest> {
        Self::new(resource, subject, 1)
    }

    /// Build from a mapped target.
    pub fn for_target(target: CheckTarget, cost: u32) -> Result<Self, InvalidRequest> {
        Self::new(target.resource, target.subject, cost)
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

/// Decision document as it appears on the wire. Every field is optional here
/// so that validation, not deserialization, decides what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct DecisionPayload {
    pub allowed: Option<bool>,
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
    pub reset_at: Option<u64>,
    pub retry_after_ms: Option<u64>,
    pub algorithm: Option<String>,
    pub headers: Option<BTreeMap<String, serde_json::Value>>,
}

/// Validated verdict for exactly one [`CheckRequest`].
///
/// Fields are read-only; a decision is never modified after the client builds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckDecision {
    allowed: bool,
    remaining: u64,
    limit: u64,
    reset_at: Option<u64>,
    retry_after_ms: Option<u64>,
    algorithm: Option<String>,
    headers: BTreeMap<String, String>,
}

impl CheckDecision {
    /// Validate a wire payload.
    ///
    /// `allowed`, `remaining` and `limit` are required and `remaining` may not
    /// exceed `limit`. Headers are taken verbatim when present, except that an
    /// allowed decision never carries `Retry-After`; otherwise they are derived
    /// from the numeric fields.
    pub(crate) fn from_payload(payload: DecisionPayload) -> Result<Self, String> {
        let allowed = payload.allowed.ok_or("missing field `allowed`")?;
        let remaining = payload.remaining.ok_or("missing field `remaining`")?;
        let limit = payload.limit.ok_or("missing field `limit`")?;
        if remaining > limit {
            return Err(format!("remaining ({remaining}) exceeds limit ({limit})"));
        }

        let headers = match payload.headers {
            Some(raw) => {
                let mut headers = BTreeMap::new();
                for (name, value) in raw {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        other => {
                            return Err(format!("header `{name}` has non-scalar value {other}"))
                        }
                    };
                    // Backoff hints only accompany denials.
                    if allowed && name.eq_ignore_ascii_case(HEADER_RETRY_AFTER) {
                        continue;
                    }
                    headers.insert(name, value);
                }
                headers
            }
            None => derive_headers(
                allowed,
                remaining,
                limit,
                payload.reset_at,
                payload.retry_after_ms,
            ),
        };

        Ok(Self {
            allowed,
            remaining,
            limit,
            reset_at: payload.reset_at,
            retry_after_ms: payload.retry_after_ms,
            algorithm: payload.algorithm,
            headers,
        })
    }

    /// Validate a decision document, e.g. one produced by a test double.
    pub fn from_json(value: serde_json::Value) -> Result<Self, CheckError> {
        let payload: DecisionPayload = serde_json::from_value(value)
            .map_err(|e| CheckError::MalformedResponse(e.to_string()))?;
        Self::from_payload(payload).map_err(CheckError::MalformedResponse)
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window reset in the server's unit (epoch seconds for the reference service).
    pub fn reset_at(&self) -> Option<u64> {
        self.reset_at
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after_ms
    }

    /// Advisory backoff as a duration.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    /// Algorithm name reported by the service, if any. Informational only.
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// Headers to relay to the original caller.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

fn derive_headers(
    allowed: bool,
    remaining: u64,
    limit: u64,
    reset_at: Option<u64>,
    retry_after_ms: Option<u64>,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert(HEADER_LIMIT.to_string(), limit.to_string());
    headers.insert(HEADER_REMAINING.to_string(), remaining.to_string());
    if let Some(reset) = reset_at {
        headers.insert(HEADER_RESET.to_string(), reset.to_string());
    }
    if !allowed {
        if let Some(ms) = retry_after_ms {
            headers.insert(HEADER_RETRY_AFTER.to_string(), retry_after_secs(ms).to_string());
        }
    }
    headers
}

/// Milliseconds to whole seconds, rounding up.
pub(crate) fn retry_after_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

/// Response of `GET /v1/health`. Presentational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}
