//! Failure policy and live-updatable configuration handles.
//!
//! [`FailurePolicy`] decides what happens to an inbound request when the
//! limiter cannot be consulted. The default is fail-closed: a limiter outage
//! becomes an outage of every gated endpoint. Deployments that prefer
//! availability can switch to fail-open, at build time or at runtime through
//! a [`DynamicConfig`] handle.
//!
//! `DynamicConfig` uses `ArcSwap` for lock-free reads; feature `adaptive-rwlock`
//! switches to `RwLock`.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "adaptive-rwlock")]
use std::sync::RwLock;

#[cfg(not(feature = "adaptive-rwlock"))]
use arc_swap::ArcSwap;

/// Disposition of a request whose check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FailurePolicy {
    /// Reject with 503 Service Unavailable (fail-closed).
    #[default]
    DenyOnFailure,
    /// Forward the request without rate-limit headers (fail-open).
    AllowOnFailure,
}

impl FailurePolicy {
    /// `true` maps to [`FailurePolicy::DenyOnFailure`].
    pub fn from_deny_on_failure(deny: bool) -> Self {
        if deny {
            FailurePolicy::DenyOnFailure
        } else {
            FailurePolicy::AllowOnFailure
        }
    }

    pub fn denies(self) -> bool {
        matches!(self, FailurePolicy::DenyOnFailure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::DenyOnFailure => "fail_closed",
            FailurePolicy::AllowOnFailure => "fail_open",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared value with cheap reads and whole-value updates.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    #[cfg(not(feature = "adaptive-rwlock"))]
    inner: Arc<ArcSwap<T>>,
    #[cfg(feature = "adaptive-rwlock")]
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            Self { inner: Arc::new(RwLock::new(value)) }
        }
    }

    /// Snapshot the current value.
    #[cfg(not(feature = "adaptive-rwlock"))]
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Snapshot the current value (clone under the RwLock backend).
    #[cfg(feature = "adaptive-rwlock")]
    pub fn get(&self) -> Arc<T>
    where
        T: Clone,
    {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::new(guard.clone())
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            self.inner.store(Arc::new(value));
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            *self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fail_closed() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::DenyOnFailure);
        assert!(FailurePolicy::default().denies());
    }

    #[test]
    fn from_flag() {
        assert_eq!(FailurePolicy::from_deny_on_failure(true), FailurePolicy::DenyOnFailure);
        assert_eq!(FailurePolicy::from_deny_on_failure(false), FailurePolicy::AllowOnFailure);
        assert_eq!(FailurePolicy::AllowOnFailure.to_string(), "fail_open");
    }

    #[test]
    fn handles_share_updates() {
        let a = DynamicConfig::new(FailurePolicy::DenyOnFailure);
        let b = a.clone();
        b.set(FailurePolicy::AllowOnFailure);
        assert_eq!(*a.get(), FailurePolicy::AllowOnFailure);
    }
}
