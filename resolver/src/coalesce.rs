//! Coalesces concurrent resolutions of the same canonical URL into a
//! single call to the wrapped resolver.
//!
//! The first caller for a key becomes the owner and performs the call;
//! every later caller for the same key attaches as a waiter and receives
//! the owner's outcome verbatim, success or error. The in-flight entry is
//! removed as soon as the call completes. If the owner's future is dropped
//! mid-call, a guard removes the entry and the closed channel is reported
//! to waiters as cancellation; no waiter is promoted to a new owner.

use crate::canonical::canonicalize;
use crate::metrics_defs::COALESCED_WAITS;
use crate::{Outcome, Resolution, ResolveError, Resolver};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

type Registry = Mutex<HashMap<String, broadcast::Sender<Outcome>>>;

pub struct CoalescedResolver {
    inner: Arc<dyn Resolver>,
    inflight: Registry,
}

enum Entry {
    Owner(broadcast::Sender<Outcome>),
    Waiter(broadcast::Receiver<Outcome>),
}

impl CoalescedResolver {
    pub fn new(inner: Arc<dyn Resolver>) -> Self {
        CoalescedResolver {
            inner,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically attach to the in-flight call for `key`, or register a new
    /// one and become its owner.
    fn join(&self, key: &str) -> Entry {
        let mut inflight = self.inflight.lock();
        if let Some(tx) = inflight.get(key) {
            Entry::Waiter(tx.subscribe())
        } else {
            // Capacity 1: each call broadcasts exactly one outcome.
            let (tx, _) = broadcast::channel(1);
            inflight.insert(key.to_string(), tx.clone());
            Entry::Owner(tx)
        }
    }
}

#[async_trait]
impl Resolver for CoalescedResolver {
    async fn resolve(&self, url: &str) -> Outcome {
        // Canonicalizing here as well as in the fetcher is slightly wasteful
        // but lets differently-spelled requests coalesce onto one call.
        let key = canonicalize(url);

        match self.join(&key) {
            Entry::Waiter(mut rx) => {
                counter!(COALESCED_WAITS).increment(1);
                tracing::debug!(key = %key, "attached to in-flight resolution");
                match rx.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ResolveError::canceled(Resolution {
                        given_url: key.clone(),
                        resolved_url: key,
                        ..Resolution::default()
                    })),
                }
            }
            Entry::Owner(tx) => {
                let guard = InflightGuard {
                    inflight: &self.inflight,
                    key: &key,
                };
                let outcome = self.inner.resolve(&key).await;
                // Remove the entry before broadcasting so late arrivals
                // start a fresh call instead of waiting on a completed one.
                guard.finish();
                let _ = tx.send(outcome.clone());
                outcome
            }
        }
    }
}

/// Removes the in-flight entry when the owner finishes or is dropped
/// mid-call. A drop without `finish` closes the broadcast channel, which
/// waiters observe as cancellation.
struct InflightGuard<'a> {
    inflight: &'a Registry,
    key: &'a str,
}

impl InflightGuard<'_> {
    fn finish(self) {}
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.lock().remove(self.key);
    }
}
