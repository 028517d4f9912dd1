//! Timeout policy for outbound checks

use crate::error::{CheckError, TransportError};
use std::future::Future;
use std::time::{Duration, Instant};

/// Default bound on one check round trip.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl TimeoutPolicy {
    /// Create a timeout policy. Panics if duration is zero or `Duration::MAX`.
    pub fn new(duration: Duration) -> Self {
        assert!(
            duration > Duration::ZERO && duration < Duration::MAX,
            "timeout duration must be non-zero and finite",
        );
        Self { duration }
    }

    /// Inspect the configured timeout duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `operation`, dropping it and reporting a transport timeout once the
    /// duration elapses.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, CheckError>
    where
        Fut: Future<Output = Result<T, CheckError>>,
        Op: FnOnce() -> Fut,
    {
        let start = Instant::now();

        match tokio::time::timeout(self.duration, operation()).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = start.elapsed();
                Err(TransportError::Timeout { elapsed, timeout: self.duration }.into())
            }
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_TIMEOUT)
    }
}
