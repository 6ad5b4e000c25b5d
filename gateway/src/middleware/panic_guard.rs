//! The error boundary: runs the inner stages in their own task so a panic
//! is contained to the one request that caused it.
//!
//! A recovered panic produces a bodyless 500 and a bounded stack trace in
//! the outcome record; the server keeps serving. Dropping the boundary
//! future (the client hung up) aborts the task, which is how cancellation
//! reaches a coalesced call owner.

use crate::Inner;
use crate::middleware::route;
use crate::outcome::RequestOutcome;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use parking_lot::Mutex;
use shared::http::make_error_response;
use std::backtrace::Backtrace;
use std::sync::Arc;
use std::sync::Once;
use tokio::task::JoinHandle;
use tracing::Instrument;

const MAX_STACK_BYTES: usize = 8 * 1024;

static HOOK: Once = Once::new();
static LAST_PANIC_STACK: Mutex<Option<String>> = Mutex::new(None);

pub(crate) async fn run(
    inner: Arc<Inner>,
    req: Request<Incoming>,
) -> (Response<Full<Bytes>>, RequestOutcome) {
    install_panic_hook();

    let mut task = AbortOnDrop(tokio::spawn(route(inner, req).in_current_span()));
    match (&mut task.0).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            let message = panic_message(err.into_panic());
            let outcome = RequestOutcome {
                error: Some(format!("panic: {message}")),
                stack: LAST_PANIC_STACK.lock().take(),
                ..RequestOutcome::default()
            };
            (
                make_error_response(StatusCode::INTERNAL_SERVER_ERROR),
                outcome,
            )
        }
        Err(err) => {
            let outcome = RequestOutcome {
                error: Some(format!("handler task failed: {err}")),
                ..RequestOutcome::default()
            };
            (
                make_error_response(StatusCode::INTERNAL_SERVER_ERROR),
                outcome,
            )
        }
    }
}

/// Aborting on drop propagates the caller's cancellation into the handler
/// task instead of leaving it running detached.
struct AbortOnDrop(JoinHandle<(Response<Full<Bytes>>, RequestOutcome)>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The hook captures a backtrace at the actual panic site; the guard can
/// only observe the join error afterwards, long past the unwound frames.
fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let mut stack = Backtrace::force_capture().to_string();
            if stack.len() > MAX_STACK_BYTES {
                let mut end = MAX_STACK_BYTES;
                while !stack.is_char_boundary(end) {
                    end -= 1;
                }
                stack.truncate(end);
            }
            *LAST_PANIC_STACK.lock() = Some(stack);
            previous(info);
        }));
    });
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
