use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Rate limit cannot be negative")]
    NegativeRateLimit,
}

/// Gateway configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for resolve traffic
    pub listener: Listener,
    /// Listener for health/readiness endpoints
    pub admin_listener: Listener,
    /// Comma-separated "client-id:token-value" entries. Requests carrying
    /// one of these tokens are authenticated and exempt from rate limiting.
    #[serde(default)]
    pub auth_tokens: Option<String>,
    /// Token bucket for anonymous clients; omit to disable limiting.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// How long slow clients get to finish writing or reading around the
    /// resolution budget; also part of the shutdown grace period.
    #[serde(default = "default_client_patience_secs")]
    pub client_patience_secs: u64,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        if let Some(rate_limit) = &self.rate_limit {
            if rate_limit.per_second < 0.0 {
                return Err(ValidationError::NegativeRateLimit);
            }
        }
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained tokens per second granted to the anonymous population
    /// (0 grants only the initial burst).
    pub per_second: f64,
    /// Bucket capacity: how far above the sustained rate bursts may go.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_client_patience_secs() -> u64 {
    1
}

fn default_burst() -> u32 {
    2
}
