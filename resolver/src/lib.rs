//! The resolution pipeline: a decorator stack over a single
//! `resolve(url) -> Result<Resolution, ResolveError>` contract.
//!
//! [`build`] composes the stack at startup: the HTTP fetcher at the bottom,
//! wrapped in the result cache when one is configured, wrapped in the
//! request coalescer so concurrent identical resolutions share one upstream
//! call.

pub mod cache;
pub mod canonical;
pub mod coalesce;
pub mod config;
pub mod fetch;
pub mod metrics_defs;

#[cfg(test)]
pub(crate) mod testutils;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of resolving a URL. Immutable once produced; cloned to every
/// caller coalesced onto the same call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub given_url: String,
    pub resolved_url: String,
    pub title: String,
    pub intermediate_urls: Vec<String>,
}

/// Broad failure category, used to pick the client-facing error message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    UnsafeTarget,
    Canceled,
    Upstream,
}

/// Resolution failure carrying a best-effort partial result.
///
/// A failed resolution may still have followed some redirects, so the
/// partial resolution is kept for the response body. `detail` is for logs
/// only; clients see the fixed category string from [`public_message`].
///
/// [`public_message`]: ResolveError::public_message
#[derive(Clone, Debug, thiserror::Error)]
#[error("{detail}")]
pub struct ResolveError {
    pub kind: ErrorKind,
    pub partial: Resolution,
    detail: String,
}

impl ResolveError {
    pub fn new(kind: ErrorKind, partial: Resolution, detail: impl Into<String>) -> Self {
        ResolveError {
            kind,
            partial,
            detail: detail.into(),
        }
    }

    pub fn canceled(partial: Resolution) -> Self {
        ResolveError::new(ErrorKind::Canceled, partial, "resolution canceled")
    }

    /// Fixed error category exposed to clients instead of `detail`.
    pub fn public_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::Timeout => "request timeout",
            ErrorKind::UnsafeTarget => "unsafe URL",
            ErrorKind::Canceled | ErrorKind::Upstream => "resolve error",
        }
    }
}

pub type Outcome = Result<Resolution, ResolveError>;

/// The resolve contract implemented by every layer of the pipeline.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Outcome;
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Compose the pipeline from configuration.
pub fn build(config: &config::Config) -> Result<Arc<dyn Resolver>, BuildError> {
    let mut resolver: Arc<dyn Resolver> = Arc::new(fetch::HttpResolver::new(config)?);

    if let Some(cache_config) = &config.cache {
        let store = cache::MokaStore::new(
            cache_config.max_capacity,
            Duration::from_secs(cache_config.ttl_secs),
        );
        resolver = Arc::new(cache::CachedResolver::new(resolver, Arc::new(store)));
    } else {
        tracing::info!("result cache disabled; add a cache section to enable it");
    }

    // Coalesce concurrent requests regardless of whether they are cached.
    Ok(Arc::new(coalesce::CoalescedResolver::new(resolver)))
}
