//! The request-processing stages around the resolve endpoint.
//!
//! [`observe`] wraps everything in the tracing span and the per-request
//! outcome record; [`panic_guard`] is the error boundary below it; the
//! remaining stages run inside the boundary via [`route`].

pub mod auth;
pub mod cors;
pub mod observe;
pub mod panic_guard;
pub mod rate_limit;

use crate::Inner;
use crate::handler;
use crate::outcome::RequestOutcome;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::ORIGIN;
use hyper::{Request, Response, StatusCode};
use shared::http::make_error_response;
use std::sync::Arc;

/// The stages inside the crash boundary, in order: authentication,
/// anonymous rate limiting, then CORS reflection around the routed
/// endpoint. A rejecting stage writes its response directly and the rest
/// of the chain never runs.
pub(crate) async fn route(
    inner: Arc<Inner>,
    req: Request<Incoming>,
) -> (Response<Full<Bytes>>, RequestOutcome) {
    let mut outcome = RequestOutcome::default();

    let client_id = match auth::authenticate(req.headers(), &inner.auth) {
        Ok(client_id) => client_id,
        Err(err) => {
            outcome.error = Some(err.to_string());
            return (auth::unauthorized_response(), outcome);
        }
    };
    outcome.client_id = client_id.clone();

    // Authenticated clients are never rate limited; the anonymous
    // population shares one budget.
    if client_id.is_empty() {
        if let Some(limiter) = &inner.limiter {
            if !limiter.allow() {
                outcome.error = Some("anonymous rate limit exceeded".to_string());
                return (rate_limit::rejection_response(limiter), outcome);
            }
        }
    }

    let origin = req.headers().get(ORIGIN).cloned();
    let mut response = match req.uri().path() {
        "/resolve" => handler::resolve(&inner, req, &mut outcome).await,
        _ => make_error_response(StatusCode::NOT_FOUND),
    };
    cors::apply(&mut response, origin.as_ref());

    (response, outcome)
}
