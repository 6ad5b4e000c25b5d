use serde::Deserialize;

/// Resolution pipeline configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Overall budget for a single resolution, including all redirects and
    /// the title fetch.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum redirects followed before giving up.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Permit resolving loopback/private/link-local targets. Off in any
    /// deployment reachable from untrusted callers.
    #[serde(default)]
    pub allow_private_targets: bool,
    /// Result cache; omit to disable caching.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            request_timeout_secs: default_request_timeout_secs(),
            max_redirects: default_max_redirects(),
            allow_private_targets: false,
            cache: Some(CacheConfig::default()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
    /// TTL for cached results. Expiry is lazy: an expired entry surfaces as
    /// a miss on the next lookup.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    10
}

fn default_cache_capacity() -> u64 {
    100_000
}

fn default_cache_ttl_secs() -> u64 {
    // 120 hours; good resolutions stay useful for days
    120 * 60 * 60
}
