//! Token-bucket rate limiting for anonymous clients.
//!
//! One bucket is shared by the whole anonymous population; there is no
//! per-client partitioning. Authenticated clients never consult it.

use http::header::{CONTENT_TYPE, HeaderValue};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use parking_lot::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    per_second: f64,
    burst: u32,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `burst` is the bucket capacity and the initial fill; `per_second`
    /// is the sustained refill rate (0 grants only the initial burst).
    pub fn new(per_second: f64, burst: u32) -> Self {
        RateLimiter {
            per_second,
            burst,
            state: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        let mut bucket = self.state.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.per_second).min(f64::from(self.burst));
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn per_second(&self) -> f64 {
        self.per_second
    }
}

pub fn rejection_response(limiter: &RateLimiter) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": format!(
            "Anonymous request rate limit of {} req/sec exceeded. Try again later.",
            limiter.per_second()
        ),
    });
    let mut res = Response::new(Full::new(Bytes::from(body.to_string())));
    *res.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    res
}
