use std::fmt;
use thiserror::Error;

/// Main error type for persona-chat
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteServiceError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ChatError {
    /// Only configuration problems stop the process; everything else leaves
    /// the conversation usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Input rejected before any state was touched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyInput,

    #[error("unknown persona '{0}'")]
    UnknownPersona(String),

    #[error("a response is still being generated")]
    Busy,
}

/// Failure reported by (or on the way to) the completion service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteServiceError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteServiceError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Auth, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Quota, message)
    }

    pub fn content_policy(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::ContentPolicy, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unknown, message)
    }

    /// Map an HTTP status from the completion endpoint to an error kind
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 | 404 => RemoteErrorKind::InvalidRequest,
            401 | 403 => RemoteErrorKind::Auth,
            429 => RemoteErrorKind::Quota,
            500..=599 => RemoteErrorKind::Server,
            _ => RemoteErrorKind::Unknown,
        };
        Self::new(kind, message)
    }
}

/// Classification of remote failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Connection refused, DNS, timeouts
    Network,
    /// Missing or rejected credential (401, 403)
    Auth,
    /// Rate limited or out of quota (429)
    Quota,
    /// Prompt or reply blocked by the provider's safety filters
    ContentPolicy,
    /// Provider-side failure (5xx)
    Server,
    /// Malformed request (400)
    InvalidRequest,
    Unknown,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Network => "network error",
            Self::Auth => "authentication failed",
            Self::Quota => "quota exceeded",
            Self::ContentPolicy => "blocked by content policy",
            Self::Server => "server error",
            Self::InvalidRequest => "invalid request",
            Self::Unknown => "unexpected error",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RemoteServiceError::from_status(401, "x").kind,
            RemoteErrorKind::Auth
        );
        assert_eq!(
            RemoteServiceError::from_status(403, "x").kind,
            RemoteErrorKind::Auth
        );
        assert_eq!(
            RemoteServiceError::from_status(429, "x").kind,
            RemoteErrorKind::Quota
        );
        assert_eq!(
            RemoteServiceError::from_status(503, "x").kind,
            RemoteErrorKind::Server
        );
        assert_eq!(
            RemoteServiceError::from_status(400, "x").kind,
            RemoteErrorKind::InvalidRequest
        );
        assert_eq!(
            RemoteServiceError::from_status(418, "x").kind,
            RemoteErrorKind::Unknown
        );
    }

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(ChatError::Configuration("no key".into()).is_fatal());
        assert!(!ChatError::from(ValidationError::EmptyInput).is_fatal());
        assert!(!ChatError::from(RemoteServiceError::quota("slow down")).is_fatal());
    }

    #[test]
    fn test_display_includes_kind() {
        let err = RemoteServiceError::quota("try later");
        assert_eq!(err.to_string(), "quota exceeded: try later");
    }
}
