//! CORS reflection: when a request carries an `Origin` header it is echoed
//! into `Access-Control-Allow-Origin`, and `Vary: Origin` is added so edge
//! caches keep per-origin variants apart. Requests without an Origin get no
//! CORS headers at all.

use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue, VARY};
use http_body_util::Full;
use hyper::Response;
use hyper::body::Bytes;

pub fn apply(response: &mut Response<Full<Bytes>>, origin: Option<&HeaderValue>) {
    let Some(origin) = origin else { return };
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Origin"));
}
