//! Error types for the kit.
//!
//! Every fallible operation in the crate returns [`KitError`]. The variants map
//! onto the failure classes the HTTP stack has to tell apart:
//!
//! - [`KitError::TransientTransport`]: handshake-level socket fault, retried
//!   inside the transport before it surfaces.
//! - [`KitError::HttpStatus`]: non-success status other than 404.
//! - [`KitError::Timeout`]: the timeout guard's own timer fired.
//! - [`KitError::Canceled`]: the caller canceled. Never retried.
//! - [`KitError::PathEscapesRoot`]: a `..` segment tried to leave the root.
//!
//! A 404 is not an error at all; it comes back as a normal response.
use std::time::Duration;
use url::Url;

pub type Result<T> = std::result::Result<T, KitError>;

#[derive(Debug, thiserror::Error)]
pub enum KitError {
    #[error("Transient transport fault: {0}")]
    TransientTransport(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: Url },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation canceled")]
    Canceled,

    #[error("Path escapes root: {0}")]
    PathEscapesRoot(String),

    #[error("Redirect limit exceeded ({0} redirects)")]
    RedirectLimit(usize),

    #[error("Redirect from {0} has no usable Location header")]
    MissingLocation(Url),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Response body already consumed")]
    BodyConsumed,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl KitError {
    /// True when the failure was caused by the caller's cancellation signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, KitError::Canceled)
    }

    /// True for the handshake-level transport fault that the transport retries on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, KitError::TransientTransport(_))
    }

    /// Status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            KitError::HttpStatus { status, .. } => Some(*status),
            KitError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("timeout_secs must be at least 1")]
    ZeroTimeout,

    #[error("max_redirects must be at least 1")]
    ZeroRedirects,

    #[error("user_agent must not be empty")]
    EmptyUserAgent,

    #[error("cannot read config file: {0}")]
    Unreadable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_canceled_counts_as_cancellation() {
        assert!(KitError::Canceled.is_cancellation());
        assert!(!KitError::Timeout(Duration::from_secs(1)).is_cancellation());
        assert!(!KitError::TransientTransport("x".into()).is_cancellation());
    }

    #[test]
    fn status_is_exposed_for_http_errors() {
        let err = KitError::HttpStatus {
            status: 503,
            url: Url::parse("https://example.com/").unwrap(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.to_string(), "HTTP 503 for https://example.com/");
        assert_eq!(KitError::Canceled.status(), None);
    }

    #[test]
    fn timeout_message_carries_the_bound() {
        let err = KitError::Timeout(Duration::from_secs(3));
        assert_eq!(err.to_string(), "Operation timed out after 3s");
    }
}
