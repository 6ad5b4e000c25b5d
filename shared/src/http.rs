use http_body_util::Full;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Peer address of the accepted connection. Injected into request extensions
/// so services behind the accept loop can report where a request came from.
#[derive(Clone, Copy, Debug)]
pub struct PeerAddr(pub SocketAddr);

/// Bind `host:port` and serve `service` until `shutdown` fires, then drain
/// in-flight connections for at most `grace`.
pub async fn run_http_service<S, B>(
    host: &str,
    port: u16,
    service: S,
    grace: Duration,
    shutdown: watch::Receiver<bool>,
) -> io::Result<()>
where
    S: Service<Request<Incoming>, Response = Response<B>> + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    serve(listener, service, grace, shutdown).await
}

/// Serve on an already-bound listener. Split out from [`run_http_service`] so
/// callers can bind to an ephemeral port and read the address back first.
pub async fn serve<S, B>(
    listener: TcpListener,
    service: S,
    grace: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()>
where
    S: Service<Request<Incoming>, Response = Response<B>> + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let service_arc = Arc::new(service);
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let _ = stream.set_nodelay(true);
                let io = TokioIo::new(stream);
                let svc = WithPeerAddr {
                    inner: service_arc.clone(),
                    peer: peer_addr,
                };

                // Hand the connection to hyper; auto-detect h1/h2 on this
                // socket. The graceful watcher sends GOAWAY / closes idle
                // connections once shutdown begins.
                let conn = graceful.watch(
                    Builder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .into_owned(),
                );
                tokio::spawn(async move {
                    let _ = conn.await;
                });
            }
            _ = shutdown.changed() => break,
        }
    }

    tracing::info!("shutdown started, draining in-flight connections");
    tokio::select! {
        _ = graceful.shutdown() => {
            tracing::info!("all connections drained");
        }
        _ = tokio::time::sleep(grace) => {
            tracing::warn!(grace_secs = grace.as_secs(), "grace period elapsed, dropping remaining connections");
        }
    }
    Ok(())
}

/// Wraps the shared service per connection to stamp [`PeerAddr`] onto every
/// request before it reaches the inner service.
struct WithPeerAddr<S> {
    inner: Arc<S>,
    peer: SocketAddr,
}

impl<S, B> Service<Request<Incoming>> for WithPeerAddr<S>
where
    S: Service<Request<Incoming>, Response = Response<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn call(&self, mut req: Request<Incoming>) -> Self::Future {
        req.extensions_mut().insert(PeerAddr(self.peer));
        self.inner.call(req)
    }
}

/// An empty-bodied response with the given status.
pub fn make_error_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::new()));
    *res.status_mut() = status;
    res
}
