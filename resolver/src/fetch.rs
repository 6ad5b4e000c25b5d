//! The base resolver: follows redirects hop by hop, collecting intermediate
//! URLs, and extracts the final page's title.
//!
//! Each hop is checked against the configured [`TargetPolicy`] and charged
//! against one overall deadline covering the whole resolution.

use crate::canonical::canonicalize;
use crate::config::Config;
use crate::{ErrorKind, Outcome, Resolution, ResolveError, Resolver};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use url::{Host, Url};

const USER_AGENT: &str = concat!("unfurl/", env!("CARGO_PKG_VERSION"));

/// Upper bound on how much of a response body is read for the title.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Which targets the fetcher may dial.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetPolicy {
    /// Public hosts on default HTTP ports only. Loopback, private,
    /// link-local and internal-looking targets are rejected before dialing.
    /// Note this is a URL-level check; address-level enforcement after DNS
    /// resolution is the dialer's concern.
    PublicOnly,
    /// No restrictions. For tests and trusted deployments.
    AllowAll,
}

pub struct HttpResolver {
    client: reqwest::Client,
    timeout: Duration,
    max_redirects: usize,
    policy: TargetPolicy,
}

impl HttpResolver {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        // Redirects are followed manually so every hop is recorded and
        // policy-checked.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()?;
        let policy = if config.allow_private_targets {
            TargetPolicy::AllowAll
        } else {
            TargetPolicy::PublicOnly
        };
        Ok(HttpResolver {
            client,
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_redirects: config.max_redirects,
            policy,
        })
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, url: &str) -> Outcome {
        let deadline = Instant::now() + self.timeout;

        let mut current = match Url::parse(&canonicalize(url)) {
            Ok(parsed) => parsed,
            Err(err) => {
                return Err(ResolveError::new(
                    ErrorKind::Upstream,
                    Resolution {
                        given_url: url.to_string(),
                        resolved_url: url.to_string(),
                        ..Resolution::default()
                    },
                    format!("invalid url: {err}"),
                ));
            }
        };
        let mut intermediates: Vec<String> = Vec::new();

        for _hop in 0..=self.max_redirects {
            if let Err(reason) = check_target(&current, self.policy) {
                return Err(ResolveError::new(
                    ErrorKind::UnsafeTarget,
                    partial(url, &current, &intermediates),
                    reason,
                ));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ResolveError::new(
                    ErrorKind::Timeout,
                    partial(url, &current, &intermediates),
                    "resolution deadline exceeded",
                ));
            }

            let response = match self
                .client
                .get(current.clone())
                .timeout(remaining)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let kind = if err.is_timeout() {
                        ErrorKind::Timeout
                    } else {
                        ErrorKind::Upstream
                    };
                    return Err(ResolveError::new(
                        kind,
                        partial(url, &current, &intermediates),
                        format!("fetch failed: {err}"),
                    ));
                }
            };

            if response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| current.join(value).ok());
                if let Some(next) = location {
                    intermediates.push(current.to_string());
                    current = next;
                    continue;
                }
                // Redirect status without a usable Location; treat as final.
            }

            let title = if is_html(&response) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, read_prefix(response)).await {
                    Ok(Ok(body)) => extract_title(&body),
                    Ok(Err(err)) => {
                        tracing::debug!(url = %current, error = %err, "could not read body for title");
                        String::new()
                    }
                    Err(_) => {
                        return Err(ResolveError::new(
                            ErrorKind::Timeout,
                            partial(url, &current, &intermediates),
                            "timed out reading body",
                        ));
                    }
                }
            } else {
                String::new()
            };

            return Ok(Resolution {
                given_url: url.to_string(),
                resolved_url: canonicalize(current.as_str()),
                title,
                intermediate_urls: intermediates,
            });
        }

        Err(ResolveError::new(
            ErrorKind::Upstream,
            partial(url, &current, &intermediates),
            "too many redirects",
        ))
    }
}

fn partial(given: &str, current: &Url, intermediates: &[String]) -> Resolution {
    Resolution {
        given_url: given.to_string(),
        resolved_url: canonicalize(current.as_str()),
        title: String::new(),
        intermediate_urls: intermediates.to_vec(),
    }
}

fn is_html(response: &reqwest::Response) -> bool {
    match response.headers().get(reqwest::header::CONTENT_TYPE) {
        Some(value) => value
            .to_str()
            .map(|value| value.contains("html"))
            .unwrap_or(false),
        None => true,
    }
}

async fn read_prefix(mut response: reqwest::Response) -> Result<String, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        buf.extend_from_slice(&chunk);
        if buf.len() >= MAX_BODY_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn extract_title(body: &str) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    let document = Html::parse_document(body);
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
        .map(|title| title.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn check_target(url: &Url, policy: TargetPolicy) -> Result<(), String> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme {other}")),
    }
    if policy == TargetPolicy::AllowAll {
        return Ok(());
    }

    if let Some(port) = url.port() {
        if port != 80 && port != 443 {
            return Err(format!("unsafe port {port}"));
        }
    }

    match url.host() {
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => {
            if domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
            {
                Err(format!("unsafe host {domain}"))
            } else {
                Ok(())
            }
        }
        None => Err("missing host".to_string()),
    }
}

fn check_ip(ip: IpAddr) -> Result<(), String> {
    let blocked = match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // unique-local fc00::/7 and link-local fe80::/10
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    };
    if blocked {
        Err(format!("unsafe ip {ip}"))
    } else {
        Ok(())
    }
}
