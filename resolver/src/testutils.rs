use crate::{ErrorKind, Outcome, Resolution, ResolveError, Resolver};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Test resolver that returns a scripted outcome after an optional delay
/// and counts how many calls actually reach it.
pub struct ScriptedResolver {
    calls: AtomicUsize,
    delay: Duration,
    outcome: Outcome,
}

impl ScriptedResolver {
    pub fn new(outcome: Outcome) -> Self {
        ScriptedResolver {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            outcome,
        }
    }

    pub fn titled(title: &str) -> Self {
        Self::new(Ok(Resolution {
            title: title.to_string(),
            ..Resolution::default()
        }))
    }

    pub fn failing(detail: &str) -> Self {
        Self::new(Err(ResolveError::new(
            ErrorKind::Upstream,
            Resolution::default(),
            detail,
        )))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, url: &str) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.outcome {
            Ok(resolution) => Ok(Resolution {
                given_url: url.to_string(),
                resolved_url: url.to_string(),
                ..resolution.clone()
            }),
            Err(err) => Err(err.clone()),
        }
    }
}
