//! Error types for decision checks and configuration.
//!
//! Every way a check can fail is classified into a [`FailureKind`]. The
//! enforcement middleware collapses all of them into one caller-visible
//! outcome, but the classification is kept so telemetry and custom failure
//! handling can tell them apart.
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The remote service could not be reached.
    Transport,
    /// The remote answered with a status that carries no decision.
    Protocol,
    /// The remote answered with a decision status but an unusable body.
    MalformedResponse,
    /// The check request itself was invalid and never sent.
    InvalidRequest,
}

impl FailureKind {
    /// Stable lowercase label, used in logs and telemetry.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Protocol => "protocol",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The network call to the decision service did not complete.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured timeout elapsed before a response arrived.
    #[error("decision service timed out after {elapsed:?} (limit: {timeout:?})")]
    Timeout { elapsed: Duration, timeout: Duration },
    /// The connection could not be established (DNS, refused, TLS).
    #[error("could not connect to decision service: {0}")]
    Connect(#[source] reqwest::Error),
    /// Any other failure while sending the request or reading the body.
    #[error("request to decision service failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl TransportError {
    /// Classify a `reqwest` error.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Connect(err)
        } else {
            TransportError::Request(err)
        }
    }
}

/// A check request failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRequest {
    #[error("resource must not be empty")]
    EmptyResource,
    #[error("subject must not be empty")]
    EmptySubject,
    #[error("cost must be at least 1")]
    ZeroCost,
}

/// Failure of a single check round trip.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Status outside the decision-bearing pair.
    #[error("decision service returned HTTP {status}: {detail}")]
    Protocol { status: u16, detail: String },
    /// Decision status with a body that is not a valid decision.
    #[error("malformed decision response: {0}")]
    MalformedResponse(String),
    #[error("invalid check request: {0}")]
    InvalidRequest(#[from] InvalidRequest),
}

impl CheckError {
    /// Classification of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            CheckError::Transport(_) => FailureKind::Transport,
            CheckError::Protocol { .. } => FailureKind::Protocol,
            CheckError::MalformedResponse(_) => FailureKind::MalformedResponse,
            CheckError::InvalidRequest(_) => FailureKind::InvalidRequest,
        }
    }

    /// Check if the remote call timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CheckError::Transport(TransportError::Timeout { .. }))
    }

    /// HTTP status for protocol failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            CheckError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Configuration could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        let proto = CheckError::Protocol { status: 500, detail: "boom".into() };
        assert_eq!(proto.kind(), FailureKind::Protocol);
        assert_eq!(proto.status(), Some(500));

        let malformed = CheckError::MalformedResponse("missing limit".into());
        assert_eq!(malformed.kind(), FailureKind::MalformedResponse);
        assert!(malformed.status().is_none());

        let invalid: CheckError = InvalidRequest::EmptySubject.into();
        assert_eq!(invalid.kind(), FailureKind::InvalidRequest);

        let timeout: CheckError = TransportError::Timeout {
            elapsed: Duration::from_millis(1010),
            timeout: Duration::from_secs(1),
        }
        .into();
        assert_eq!(timeout.kind(), FailureKind::Transport);
        assert!(timeout.is_timeout());
    }

    #[test]
    fn display_includes_status_and_detail() {
        let err = CheckError::Protocol { status: 401, detail: "invalid api key".into() };
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("invalid api key"));
    }

    #[test]
    fn timeout_display_includes_durations() {
        let err = TransportError::Timeout {
            elapsed: Duration::from_millis(5100),
            timeout: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("timed out"));
        assert!(msg.contains("5.1"));
    }

    #[test]
    fn failure_kind_labels() {
        assert_eq!(FailureKind::Transport.to_string(), "transport");
        assert_eq!(FailureKind::MalformedResponse.as_str(), "malformed_response");
    }
}
