use crate::config::ValidationError;
use crate::middleware::auth::AuthConfigError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("auth configuration error: {0}")]
    AuthConfig(#[from] AuthConfigError),
}
