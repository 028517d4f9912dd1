#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # limitforge
//!
//! Client and tower middleware for a remote rate-limit decision service.
//!
//! ## Features
//!
//! - **Decision client** for `POST /v1/check`, one round trip per check, with
//!   classified failures (transport, protocol, malformed response)
//! - **Enforcement middleware** as a tower `Layer` over `http` requests:
//!   forward on allow, 429 on deny, rate-limit headers relayed in both cases
//! - **Explicit failure policy**: fail-closed (503) by default, fail-open on
//!   request, switchable at runtime
//! - **Pluggable request mapping** from inbound request to `(resource, subject)`
//! - **Telemetry sinks** receiving one event per gated request
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use limitforge::{DecisionClient, EnforcementLayer, FailurePolicy};
//! use std::time::Duration;
//! use tower::ServiceBuilder;
//!
//! # fn main() -> Result<(), limitforge::ConfigError> {
//! let client = DecisionClient::builder()
//!     .base_url("http://localhost:8000")
//!     .api_key("lf_live_key")
//!     .timeout(Duration::from_millis(500))
//!     .build()?;
//!
//! let svc = ServiceBuilder::new()
//!     .layer(EnforcementLayer::new(client).with_failure_policy(FailurePolicy::DenyOnFailure))
//!     .service_fn(|_req: http::Request<String>| async {
//!         Ok::<_, std::convert::Infallible>(http::Response::new(String::from("ok")))
//!     });
//! # let _ = svc;
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure policy
//!
//! With [`FailurePolicy::DenyOnFailure`] every gated endpoint returns 503
//! while the decision service is unreachable or misbehaving. Choose
//! [`FailurePolicy::AllowOnFailure`] where availability matters more than
//! strict enforcement.

pub mod client;
pub mod config;
pub mod error;
pub mod mapper;
pub mod middleware;
pub mod policy;
pub mod prelude;
pub mod telemetry;
pub mod timeout;
pub mod types;

// Re-exports
pub use client::{DecisionClient, DecisionClientBuilder, DecisionSource, HealthProbe};
pub use config::LimitforgeConfig;
pub use error::{CheckError, ConfigError, FailureKind, InvalidRequest, TransportError};
pub use mapper::{HeaderMapper, RequestMapper};
pub use middleware::{EnforcementLayer, EnforcementService};
pub use policy::{DynamicConfig, FailurePolicy};
pub use timeout::TimeoutPolicy;
pub use types::{CheckDecision, CheckRequest, CheckTarget, HealthStatus};
