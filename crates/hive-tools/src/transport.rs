use async_trait::async_trait;
use hive_core::ErrorKind;
use std::time::Duration;

/// Failure reported by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, reset, DNS failure, and the like.
    #[error("network error: {0}")]
    Network(String),

    /// A non-success status not covered by a more specific variant.
    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Credentials missing or rejected.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The remote refused the payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The endpoint or target record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The transport gave up at its own deadline.
    #[error("transport deadline exceeded")]
    Timeout,
}

impl TransportError {
    /// Map to the invoker's failure taxonomy: network, 5xx, and 429 are
    /// transient; auth, validation, not-found, and other 4xx are permanent.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Network(_) => ErrorKind::TransientRemoteError,
            TransportError::Status { status, .. } if *status >= 500 || *status == 429 => {
                ErrorKind::TransientRemoteError
            }
            TransportError::Status { .. }
            | TransportError::Auth(_)
            | TransportError::Validation(_)
            | TransportError::NotFound(_) => ErrorKind::PermanentRemoteError,
            TransportError::Timeout => ErrorKind::Timeout,
        }
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => TransportError::Auth(message),
            400 | 422 => TransportError::Validation(message),
            404 => TransportError::NotFound(message),
            _ => TransportError::Status { status, message },
        }
    }
}

/// Raw channel to remote capability endpoints, supplied externally.
///
/// Implementations add no retry logic of their own; the invoker owns
/// deadlines and retries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `payload` to `endpoint` and return the raw result.
    async fn send(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, TransportError>;

    /// Cheap reachability check used before the first real call to an endpoint.
    async fn probe(&self, endpoint: &str, deadline: Duration) -> Result<(), TransportError> {
        let _ = (endpoint, deadline);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            TransportError::from_status(503, "down").kind(),
            ErrorKind::TransientRemoteError
        );
        assert_eq!(
            TransportError::from_status(429, "slow down").kind(),
            ErrorKind::TransientRemoteError
        );
        assert!(matches!(
            TransportError::from_status(401, "no"),
            TransportError::Auth(_)
        ));
        assert!(matches!(
            TransportError::from_status(422, "bad field"),
            TransportError::Validation(_)
        ));
        assert_eq!(
            TransportError::from_status(409, "conflict").kind(),
            ErrorKind::PermanentRemoteError
        );
        assert_eq!(
            TransportError::NotFound("x".into()).kind(),
            ErrorKind::PermanentRemoteError
        );
        assert_eq!(TransportError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            TransportError::Network("reset".into()).kind(),
            ErrorKind::TransientRemoteError
        );
    }
}
