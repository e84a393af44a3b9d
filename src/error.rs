use crate::domain::callback::{CorrelationId, ReleaseReason};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not configured: {0}")]
    NotConfigured(String),
    #[error(
        "Correlation mismatch: received {received}, outstanding request is {}",
        outstanding(.expected)
    )]
    CorrelationMismatch {
        expected: Option<CorrelationId>,
        received: CorrelationId,
    },
    #[error("No active selection: {0}")]
    NoActiveSelection(String),
    #[error("Upstream error: {0}")]
    UpstreamError(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// A suspended flow or native handle was torn down before it resolved.
    #[error("Released: {0}")]
    Released(ReleaseReason),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

fn outstanding(expected: &Option<CorrelationId>) -> String {
    expected
        .as_ref()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for BridgeError {
    fn from(err: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_mismatch_message_without_outstanding_request() {
        let err = BridgeError::CorrelationMismatch {
            expected: None,
            received: CorrelationId::from("abc"),
        };
        assert_eq!(
            err.to_string(),
            "Correlation mismatch: received abc, outstanding request is none"
        );
    }
}
