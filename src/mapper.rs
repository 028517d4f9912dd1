//! Mapping inbound requests to check targets.
//!
//! The enforcement path only sees a [`RequestMapper`]. Header-based subject
//! selection lives in [`HeaderMapper`], which is merely the default; any
//! `Fn(&Request<B>) -> CheckTarget` can take its place.

use crate::types::CheckTarget;
use http::Request;

/// Header consulted first for the subject.
pub const CLIENT_ID_HEADER: &str = "x-client-id";
/// Header consulted second for the subject.
pub const API_KEY_SUBJECT_HEADER: &str = "x-api-key";
/// Subject used when no identifying header is present.
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Pure function from inbound request metadata to `(resource, subject)`.
pub trait RequestMapper<B>: Send + Sync {
    fn map(&self, request: &Request<B>) -> CheckTarget;
}

impl<B, F> RequestMapper<B> for F
where
    F: Fn(&Request<B>) -> CheckTarget + Send + Sync,
{
    fn map(&self, request: &Request<B>) -> CheckTarget {
        self(request)
    }
}

/// Default mapper: `resource = "<METHOD>:<path>"`, subject from
/// `x-client-id`, then `x-api-key`, then `"anonymous"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderMapper;

impl<B> RequestMapper<B> for HeaderMapper {
    fn map(&self, request: &Request<B>) -> CheckTarget {
        let resource = format!("{}:{}", request.method(), request.uri().path());
        let subject = [CLIENT_ID_HEADER, API_KEY_SUBJECT_HEADER]
            .iter()
            .find_map(|name| {
                request
                    .headers()
                    .get(*name)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.is_empty())
            })
            .unwrap_or(ANONYMOUS_SUBJECT);
        CheckTarget::new(resource, subject)
    }
}
