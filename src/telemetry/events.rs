use crate::error::FailureKind;
use crate::policy::FailurePolicy;
use std::fmt;
use std::time::Duration;

/// One event per request that passes through the enforcement middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckEvent {
    /// The service allowed the request and it was forwarded.
    Allowed {
        resource: String,
        subject: String,
        remaining: u64,
        limit: u64,
        /// Time spent waiting for the decision.
        elapsed: Duration,
    },
    /// The service denied the request and it was rejected with 429.
    Denied {
        resource: String,
        subject: String,
        retry_after: Option<Duration>,
        elapsed: Duration,
    },
    /// No decision could be obtained; `policy` says what happened to the request.
    Failed {
        kind: FailureKind,
        policy: FailurePolicy,
        elapsed: Duration,
    },
}

impl CheckEvent {
    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            CheckEvent::Allowed { .. } => "allowed",
            CheckEvent::Denied { .. } => "denied",
            CheckEvent::Failed { .. } => "failed",
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            CheckEvent::Allowed { elapsed, .. }
            | CheckEvent::Denied { elapsed, .. }
            | CheckEvent::Failed { elapsed, .. } => *elapsed,
        }
    }
}

impl fmt::Display for CheckEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckEvent::Allowed { resource, subject, remaining, limit, elapsed } => write!(
                f,
                "Allowed({} by {}, remaining={}/{}, elapsed={:?})",
                resource, subject, remaining, limit, elapsed
            ),
            CheckEvent::Denied { resource, subject, retry_after, elapsed } => write!(
                f,
                "Denied({} by {}, retry_after={:?}, elapsed={:?})",
                resource, subject, retry_after, elapsed
            ),
            CheckEvent::Failed { kind, policy, elapsed } => {
                write!(f, "Failed(kind={}, policy={}, elapsed={:?})", kind, policy, elapsed)
            }
        }
    }
}
