use hyper::Request;
use shared::http::PeerAddr;

/// Request-scoped record accumulated across the middleware stages and
/// flushed to the log exactly once per request. Owned by a single request's
/// processing lifetime, never shared across requests.
#[derive(Debug, Default)]
pub struct RequestOutcome {
    /// Resolved client identity; empty for anonymous callers.
    pub client_id: String,
    /// Internal error text. Never sent to clients.
    pub error: Option<String>,
    /// Stack trace captured by the crash guard, when a panic occurred.
    pub stack: Option<String>,
}

/// Immutable request facts captured before the inner stages run, so the
/// final log line can be written even when the request itself has been
/// consumed by the handler.
#[derive(Debug)]
pub struct RequestMeta {
    pub method: String,
    pub url: String,
    pub remote_addr: String,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        // Prefer the forwarding header set by the edge; fall back to the
        // connection peer address.
        let remote_addr = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string())
            .or_else(|| {
                req.extensions()
                    .get::<PeerAddr>()
                    .map(|peer| peer.0.to_string())
            })
            .unwrap_or_else(|| "-".to_string());

        let user_agent = req
            .headers()
            .get(http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        RequestMeta {
            method: req.method().to_string(),
            url: req.uri().to_string(),
            remote_addr,
            user_agent,
        }
    }
}
