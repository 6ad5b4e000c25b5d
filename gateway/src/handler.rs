//! The `/resolve` endpoint: translates the query parameter into a pipeline
//! call and the outcome back into a JSON response.
//!
//! A failed resolution can still carry a useful partially-resolved URL
//! (a short link may expand fully while the title fetch times out), so
//! failures answer 203 Non-Authoritative Information with a partial body
//! rather than a bare error. The one exception is cancellation, which gets
//! the nonstandard 499 with no body.

use crate::Inner;
use crate::outcome::RequestOutcome;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};
use resolver::ErrorKind;
use serde::Serialize;
use url::Url;

const MAX_AGE_OK_SECS: u64 = 365 * 24 * 60 * 60;
const MAX_AGE_ERR_SECS: u64 = 5 * 60;

#[derive(Debug, Serialize)]
struct ResolveBody<'a> {
    given_url: &'a str,
    resolved_url: &'a str,
    title: &'a str,
    /// Always a list in the encoded response, never null.
    intermediate_urls: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub(crate) async fn resolve<B>(
    inner: &Inner,
    req: Request<B>,
    outcome: &mut RequestOutcome,
) -> Response<Full<Bytes>> {
    let given_url = match query_param(req.uri().query(), "url") {
        Some(value) if !value.is_empty() => value,
        _ => {
            outcome.error = Some("missing arg url".to_string());
            return send_error(StatusCode::BAD_REQUEST, "Missing arg url");
        }
    };
    if !is_valid_input(&given_url) {
        outcome.error = Some(format!("invalid arg url: {given_url}"));
        return send_error(StatusCode::BAD_REQUEST, "Invalid url");
    }

    match inner.resolver.resolve(&given_url).await {
        Ok(resolution) => send_json(
            StatusCode::OK,
            &ResolveBody {
                given_url: &given_url,
                resolved_url: &resolution.resolved_url,
                title: &resolution.title,
                intermediate_urls: &resolution.intermediate_urls,
                error: None,
            },
        ),
        Err(err) => {
            outcome.error = Some(format!("error resolving url: {err}"));

            if err.kind == ErrorKind::Canceled {
                // The caller's connection is gone; the 499 status exists
                // for our own instrumentation, not for the client.
                return shared::http::make_error_response(client_closed_status());
            }

            send_json(
                StatusCode::NON_AUTHORITATIVE_INFORMATION,
                &ResolveBody {
                    given_url: &given_url,
                    resolved_url: &err.partial.resolved_url,
                    title: &err.partial.title,
                    intermediate_urls: &err.partial.intermediate_urls,
                    // Fixed category string; the real error stays in logs.
                    error: Some(err.public_message()),
                },
            )
        }
    }
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn is_valid_input(given_url: &str) -> bool {
    // Url::parse only accepts absolute URLs, so a successful parse plus a
    // non-empty host covers scheme and host requirements in one go.
    match Url::parse(given_url) {
        Ok(parsed) => parsed.host_str().is_some_and(|host| !host.is_empty()),
        Err(_) => false,
    }
}

/// Nonstandard 499 Client Closed Request.
fn client_closed_status() -> StatusCode {
    StatusCode::from_u16(499).expect("499 is in the valid status range")
}

fn send_json<T: Serialize>(code: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let mut res = Response::new(Full::new(Bytes::from(bytes)));
    *res.status_mut() = code;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(&cache_control_value(code)) {
        res.headers_mut().insert(CACHE_CONTROL, value);
    }
    res
}

fn send_error(code: StatusCode, message: &str) -> Response<Full<Bytes>> {
    send_json(code, &serde_json::json!({ "error": message }))
}

/// Good results may be cached aggressively by edges; anything else only
/// briefly, to bound the staleness of failures.
fn cache_control_value(code: StatusCode) -> String {
    let max_age = if code == StatusCode::OK {
        MAX_AGE_OK_SECS
    } else {
        MAX_AGE_ERR_SECS
    };
    format!("public,max-age={max_age}")
}
