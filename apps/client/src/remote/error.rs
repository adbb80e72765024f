//! Remote store errors and their retry classification.

use thiserror::Error;

/// How the sync engine should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying after a backoff.
    Temporary,
    /// Retrying cannot help; abort the pass.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited by remote")]
    RateLimited,

    #[error("remote server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("request rejected {status}: {message}")]
    Client { status: u16, message: String },

    #[error("unreadable response: {0}")]
    Parse(String),
}

impl RemoteError {
    /// Classify an unsuccessful HTTP status.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(message),
            408 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::Server { status, message },
            _ => Self::Client { status, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Timeout | Self::RateLimited | Self::Server { .. } => {
                ErrorKind::Temporary
            }
            Self::Unauthorized(_) | Self::Client { .. } | Self::Parse(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.kind() == ErrorKind::Temporary
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(RemoteError::from_status(429, String::new()).kind(), ErrorKind::Temporary);
        assert_eq!(RemoteError::from_status(503, "down".into()).kind(), ErrorKind::Temporary);
        assert_eq!(RemoteError::from_status(408, String::new()), RemoteError::Timeout);
        assert_eq!(RemoteError::from_status(401, "expired".into()).kind(), ErrorKind::Permanent);
        assert_eq!(RemoteError::from_status(422, "bad row".into()).kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_parse_errors_are_permanent() {
        assert!(!RemoteError::Parse("eof".into()).is_temporary());
        assert!(RemoteError::Network("reset".into()).is_temporary());
    }
}
