//! The observability layer: opens the request span, maintains the
//! in-flight gauge and duration histogram, and emits exactly one
//! structured log line per request once everything downstream (including
//! a recovered crash) has produced a response.

use crate::Inner;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT};
use crate::middleware::panic_guard;
use crate::outcome::RequestMeta;
use http_body_util::Full;
use hyper::body::{Body as _, Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use shared::{gauge, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

pub(crate) async fn handle(inner: Arc<Inner>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let span = tracing::info_span!("request", method = %req.method(), url = %req.uri());

    async move {
        let _inflight = InflightGuard::acquire();
        let started = Instant::now();
        let meta = RequestMeta::from_request(&req);

        let (response, outcome) = panic_guard::run(inner, req).await;

        let duration = started.elapsed();
        histogram!(REQUEST_DURATION).record(duration.as_secs_f64());

        let status = response.status().as_u16();
        let size = response.body().size_hint().exact().unwrap_or(0);

        if response.status() == StatusCode::OK && outcome.error.is_none() {
            tracing::info!(
                status,
                duration_ms = duration.as_millis() as u64,
                size,
                method = %meta.method,
                remote_addr = %meta.remote_addr,
                url = %meta.url,
                user_agent = %meta.user_agent,
                client_id = %outcome.client_id,
                "request",
            );
        } else {
            tracing::error!(
                status,
                duration_ms = duration.as_millis() as u64,
                size,
                method = %meta.method,
                remote_addr = %meta.remote_addr,
                url = %meta.url,
                user_agent = %meta.user_agent,
                client_id = %outcome.client_id,
                error = outcome.error.as_deref().unwrap_or(""),
                stack = outcome.stack.as_deref().unwrap_or(""),
                "request",
            );
        }

        response
    }
    .instrument(span)
    .await
}

/// Keeps the concurrent-request gauge balanced on every exit path.
struct InflightGuard;

impl InflightGuard {
    fn acquire() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}
