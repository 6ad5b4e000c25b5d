//! The HTTP service in front of the resolution pipeline.
//!
//! Every request passes through a fixed chain, outermost first: tracing
//! span, observability record, crash guard, authentication, anonymous rate
//! limiting, CORS reflection, and finally the resolve endpoint. Rejections
//! write their response directly and skip the rest of the chain; the
//! observability layer wraps everything, so it always sees the final
//! status.

pub mod config;
pub mod errors;
pub mod handler;
pub mod metrics_defs;
pub mod middleware;
pub mod outcome;

use errors::GatewayError;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use middleware::auth::AuthMap;
use middleware::rate_limit::RateLimiter;
use resolver::Resolver;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Process-wide state shared by every request: the pipeline, the auth map
/// and the anonymous rate budget. Constructed once at startup.
pub(crate) struct Inner {
    pub resolver: Arc<dyn Resolver>,
    pub auth: AuthMap,
    pub limiter: Option<RateLimiter>,
}

#[derive(Clone)]
pub struct GatewayService {
    inner: Arc<Inner>,
}

impl GatewayService {
    pub fn new(config: &config::Config, resolver: Arc<dyn Resolver>) -> Result<Self, GatewayError> {
        let auth = middleware::auth::parse_auth_map(config.auth_tokens.as_deref().unwrap_or(""))?;
        let limiter = config
            .rate_limit
            .as_ref()
            .map(|rl| RateLimiter::new(rl.per_second, rl.burst));
        Ok(GatewayService {
            inner: Arc::new(Inner {
                resolver,
                auth,
                limiter,
            }),
        })
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(middleware::observe::handle(inner, req).await) })
    }
}

/// Serve the gateway and admin listeners until `shutdown` fires.
pub async fn run(
    config: config::Config,
    resolver: Arc<dyn Resolver>,
    grace: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<(), GatewayError> {
    config.validate()?;
    let service = GatewayService::new(&config, resolver)?;

    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        service,
        grace,
        shutdown.clone(),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(|| true),
        grace,
        shutdown,
    );

    tokio::try_join!(gateway_task, admin_task)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use hyper_util::client::legacy::Client;
    use hyper_util::client::legacy::connect::HttpConnector;
    use hyper_util::rt::TokioExecutor;
    use resolver::{ErrorKind, Outcome, Resolution, ResolveError};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    /// Pipeline stand-in returning a scripted outcome, or panicking.
    struct StubResolver {
        outcome: fn(&str) -> Outcome,
    }

    #[async_trait]
    impl Resolver for StubResolver {
        async fn resolve(&self, url: &str) -> Outcome {
            (self.outcome)(url)
        }
    }

    fn ok_outcome(url: &str) -> Outcome {
        Ok(Resolution {
            given_url: url.to_string(),
            resolved_url: url.to_string(),
            title: "a title".to_string(),
            intermediate_urls: Vec::new(),
        })
    }

    fn timeout_outcome(url: &str) -> Outcome {
        Err(ResolveError::new(
            ErrorKind::Timeout,
            Resolution {
                given_url: url.to_string(),
                resolved_url: url.to_string(),
                ..Resolution::default()
            },
            "deadline exceeded after 3 redirects",
        ))
    }

    fn canceled_outcome(url: &str) -> Outcome {
        Err(ResolveError::canceled(Resolution {
            given_url: url.to_string(),
            resolved_url: url.to_string(),
            ..Resolution::default()
        }))
    }

    fn panicking_outcome(_url: &str) -> Outcome {
        panic!("resolver blew up");
    }

    fn test_config() -> config::Config {
        serde_yaml::from_str(
            r#"
listener: {host: "127.0.0.1", port: 1}
admin_listener: {host: "127.0.0.1", port: 1}
auth_tokens: "client-1:token-1"
rate_limit: {per_second: 0, burst: 2}
"#,
        )
        .unwrap()
    }

    async fn start_gateway(
        config: &config::Config,
        outcome: fn(&str) -> Outcome,
    ) -> (SocketAddr, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service =
            GatewayService::new(config, Arc::new(StubResolver { outcome })).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(shared::http::serve(
            listener,
            service,
            Duration::from_millis(200),
            shutdown_rx,
        ));
        (addr, shutdown_tx)
    }

    async fn get(
        addr: SocketAddr,
        path_and_query: &str,
        headers: &[(&str, &str)],
    ) -> (hyper::StatusCode, hyper::HeaderMap, Bytes) {
        let client: Client<HttpConnector, Full<Bytes>> =
            Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let mut builder = Request::builder().uri(format!("http://{addr}{path_and_query}"));
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let req = builder.body(Full::new(Bytes::new())).unwrap();
        let res = client.request(req).await.unwrap();
        let status = res.status();
        let response_headers = res.headers().clone();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, response_headers, body)
    }

    fn json(body: &Bytes) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn resolves_a_valid_url() {
        let (addr, _shutdown) = start_gateway(&test_config(), ok_outcome).await;

        let (status, headers, body) = get(addr, "/resolve?url=https://example.com", &[]).await;
        assert_eq!(status, 200);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["cache-control"], "public,max-age=31536000");

        let body = json(&body);
        assert_eq!(body["given_url"], "https://example.com");
        assert_eq!(body["resolved_url"], "https://example.com");
        assert_eq!(body["title"], "a title");
        assert_eq!(body["intermediate_urls"], serde_json::json!([]));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn rejects_missing_and_invalid_urls() {
        let (addr, _shutdown) = start_gateway(&test_config(), ok_outcome).await;

        let (status, _, body) = get(addr, "/resolve", &[]).await;
        assert_eq!(status, 400);
        assert_eq!(json(&body)["error"], "Missing arg url");

        let (status, _, body) = get(addr, "/resolve?url=not-a-url", &[]).await;
        assert_eq!(status, 400);
        assert_eq!(json(&body)["error"], "Invalid url");
    }

    #[tokio::test]
    async fn failed_resolution_returns_partial_result() {
        let (addr, _shutdown) = start_gateway(&test_config(), timeout_outcome).await;

        let (status, headers, body) = get(addr, "/resolve?url=https://example.com", &[]).await;
        assert_eq!(status, 203);
        assert_eq!(headers["cache-control"], "public,max-age=300");

        let body = json(&body);
        assert_eq!(body["error"], "request timeout");
        assert_eq!(body["resolved_url"], "https://example.com");
        assert_eq!(body["intermediate_urls"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn canceled_resolution_returns_499_with_empty_body() {
        let (addr, _shutdown) = start_gateway(&test_config(), canceled_outcome).await;

        let (status, _, body) = get(addr, "/resolve?url=https://example.com", &[]).await;
        assert_eq!(status.as_u16(), 499);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn auth_accepts_known_tokens_and_rejects_unknown_ones() {
        let (addr, _shutdown) = start_gateway(&test_config(), ok_outcome).await;
        let path = "/resolve?url=https://example.com";

        let (status, _, _) = get(addr, path, &[("Authorization", "Token token-1")]).await;
        assert_eq!(status, 200);

        // Scheme matching is case-insensitive.
        let (status, _, _) = get(addr, path, &[("Authorization", "TOKEN token-1")]).await;
        assert_eq!(status, 200);

        let (status, _, body) = get(addr, path, &[("Authorization", "Token nope")]).await;
        assert_eq!(status, 403);
        assert_eq!(json(&body)["error"], "unauthorized");

        let (status, _, _) = get(addr, path, &[("Authorization", "Bearer token-1")]).await;
        assert_eq!(status, 403);
    }

    #[tokio::test]
    async fn anonymous_requests_share_one_rate_budget() {
        let (addr, _shutdown) = start_gateway(&test_config(), ok_outcome).await;
        let path = "/resolve?url=https://example.com";

        // burst 2, refill 0: exactly two anonymous requests succeed.
        for _ in 0..2 {
            let (status, _, _) = get(addr, path, &[]).await;
            assert_eq!(status, 200);
        }
        let (status, _, body) = get(addr, path, &[]).await;
        assert_eq!(status, 429);
        assert!(
            json(&body)["error"]
                .as_str()
                .unwrap()
                .contains("rate limit")
        );

        // Authenticated clients bypass the bucket entirely.
        let (status, _, _) = get(addr, path, &[("Authorization", "Token token-1")]).await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let (addr, _shutdown) = start_gateway(&test_config(), panicking_outcome).await;

        let (status, _, body) = get(addr, "/resolve?url=https://example.com", &[]).await;
        assert_eq!(status, 500);
        assert!(body.is_empty());

        // The server survived and keeps answering.
        let (status, _, _) = get(addr, "/resolve", &[]).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn reflects_cors_origin_on_endpoint_responses() {
        let (addr, _shutdown) = start_gateway(&test_config(), ok_outcome).await;

        let (_, headers, _) = get(
            addr,
            "/resolve?url=https://example.com",
            &[("Origin", "https://app.example.com")],
        )
        .await;
        assert_eq!(
            headers["access-control-allow-origin"],
            "https://app.example.com"
        );
        assert_eq!(headers["vary"], "Origin");

        let (_, headers, _) = get(addr, "/resolve?url=https://example.com", &[]).await;
        assert!(!headers.contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let (addr, _shutdown) = start_gateway(&test_config(), ok_outcome).await;
        let (status, _, _) = get(addr, "/other", &[]).await;
        assert_eq!(status, 404);
    }
}
