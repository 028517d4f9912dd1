//! Convenient re-exports for common limitforge types.
pub use crate::{
    client::{DecisionClient, DecisionClientBuilder, DecisionSource},
    config::LimitforgeConfig,
    error::{CheckError, ConfigError, FailureKind},
    mapper::{HeaderMapper, RequestMapper},
    middleware::{EnforcementLayer, EnforcementService},
    policy::FailurePolicy,
    telemetry::{CheckEvent, LogSink, MemorySink, TelemetrySink},
    types::{CheckDecision, CheckRequest, CheckTarget},
};
