use crate::http::make_error_response;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

/// Health and readiness endpoints, served on the internal admin listener.
pub struct AdminService<F> {
    is_ready: F,
}

impl<F> AdminService<F>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F) -> Self {
        Self { is_ready }
    }
}

impl<F> Service<Request<Incoming>> for AdminService<F>
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let ready = (self.is_ready)();

        Box::pin(async move {
            let ok = || Response::new(Full::new(Bytes::from("ok\n")));

            let res = match (req.method(), req.uri().path()) {
                (&Method::GET, "/health") => ok(),
                (&Method::GET, "/ready") if ready => ok(),
                (&Method::GET, "/ready") => make_error_response(StatusCode::SERVICE_UNAVAILABLE),
                (&Method::GET, _) => make_error_response(StatusCode::NOT_FOUND),
                _ => make_error_response(StatusCode::METHOD_NOT_ALLOWED),
            };
            Ok(res)
        })
    }
}
