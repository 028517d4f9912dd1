//! Telemetry for the enforcement middleware.
//!
//! Every request that passes through [`EnforcementLayer`](crate::EnforcementLayer)
//! produces exactly one [`CheckEvent`]. Events flow into a [`TelemetrySink`],
//! which is a `tower::Service<CheckEvent>` so sinks compose with ordinary tower
//! combinators. Emission is best effort and never changes the request outcome.

pub mod events;
pub mod sinks;

pub use events::CheckEvent;
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
