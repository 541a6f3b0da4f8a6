use thiserror::Error;

/// Unified error type for the pinger
#[derive(Error, Debug)]
pub enum PingerError {
    // Proxy setup errors
    #[error("Malformed proxy spec: {0}")]
    MalformedProxySpec(String),

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProxyProtocol(String),

    #[error("Proxy transport setup failed: {0}")]
    Transport(String),

    // Poll errors
    #[error("Rate limited by server (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Result type alias for pinger operations
pub type Result<T> = std::result::Result<T, PingerError>;

impl PingerError {
    /// Check if this error came from a 429 response
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PingerError::RateLimited { .. })
    }
}

// Convert from reqwest errors
impl From<reqwest::Error> for PingerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PingerError::Timeout
        } else if let Some(status) = err.status() {
            PingerError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            PingerError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(PingerError::RateLimited { retry_after_secs: 5 }.is_rate_limited());
        assert!(!PingerError::Timeout.is_rate_limited());
        assert!(!PingerError::Http {
            status: 429,
            body: String::new()
        }
        .is_rate_limited());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            PingerError::UnsupportedProxyProtocol("ftp".to_string()).to_string(),
            "Unsupported proxy protocol: ftp"
        );
        assert_eq!(
            PingerError::RateLimited { retry_after_secs: 60 }.to_string(),
            "Rate limited by server (retry after 60s)"
        );
    }
}
