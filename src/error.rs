//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror. Every variant maps to a
//! stable [`ErrorKind`] so transport layers never leak internal state.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Key is empty or exceeds the configured maximum length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Serialized value exceeds the configured maximum size
    #[error("Value too large: {size} bytes exceeds limit of {limit} bytes")]
    ValueTooLarge { size: usize, limit: usize },

    /// Increment/decrement on a value that is not an integer
    #[error("Type mismatch for key '{0}': value is not numeric")]
    TypeMismatch(String),

    /// Benchmark scenario failed validation
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// Compression, decompression or encoding failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Entry-count or memory ceiling reached
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Operation did not finish within its deadline
    #[error("Operation timed out after {0} ms")]
    OperationTimeout(u64),

    /// Module used before `initialize`
    #[error("Module not initialized: {0}")]
    NotInitialized(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled by its caller
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == Error Kind ==
/// Stable, transport-friendly identifier of an error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidKey,
    ValueTooLarge,
    TypeMismatch,
    InvalidScenario,
    SerializationError,
    CapacityExceeded,
    OperationTimeout,
    NotInitialized,
    InvalidConfig,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Returns the stable wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidKey => "INVALID_KEY",
            ErrorKind::ValueTooLarge => "VALUE_TOO_LARGE",
            ErrorKind::TypeMismatch => "TYPE_MISMATCH",
            ErrorKind::InvalidScenario => "INVALID_SCENARIO",
            ErrorKind::SerializationError => "SERIALIZATION_ERROR",
            ErrorKind::CapacityExceeded => "CAPACITY_EXCEEDED",
            ErrorKind::OperationTimeout => "OPERATION_TIMEOUT",
            ErrorKind::NotInitialized => "NOT_INITIALIZED",
            ErrorKind::InvalidConfig => "INVALID_CONFIG",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Error Severity ==
/// Severity bucket used by the error statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub const ALL: [ErrorSeverity; 4] = [
        ErrorSeverity::Low,
        ErrorSeverity::Medium,
        ErrorSeverity::High,
        ErrorSeverity::Critical,
    ];
}

impl CacheError {
    // == Kind ==
    /// Returns the stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::InvalidKey(_) => ErrorKind::InvalidKey,
            CacheError::ValueTooLarge { .. } => ErrorKind::ValueTooLarge,
            CacheError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            CacheError::InvalidScenario(_) => ErrorKind::InvalidScenario,
            CacheError::Serialization(_) => ErrorKind::SerializationError,
            CacheError::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            CacheError::OperationTimeout(_) => ErrorKind::OperationTimeout,
            CacheError::NotInitialized(_) => ErrorKind::NotInitialized,
            CacheError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            CacheError::Cancelled(_) => ErrorKind::Cancelled,
            CacheError::Internal(_) => ErrorKind::Internal,
        }
    }

    // == Severity ==
    /// Classifies the error for severity breakdowns.
    ///
    /// Caller mistakes are low, pressure and timeouts are high, anything that
    /// suggests stored data is damaged is critical.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CacheError::InvalidKey(_)
            | CacheError::ValueTooLarge { .. }
            | CacheError::Cancelled(_) => ErrorSeverity::Low,
            CacheError::TypeMismatch(_)
            | CacheError::InvalidScenario(_)
            | CacheError::InvalidConfig(_) => ErrorSeverity::Medium,
            CacheError::CapacityExceeded(_)
            | CacheError::OperationTimeout(_)
            | CacheError::NotInitialized(_) => ErrorSeverity::High,
            CacheError::Serialization(_) | CacheError::Internal(_) => ErrorSeverity::Critical,
        }
    }

    // == Is Retryable ==
    /// Returns true for transient failures worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CacheError::OperationTimeout(_) | CacheError::CapacityExceeded(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            CacheError::InvalidKey(_)
            | CacheError::InvalidScenario(_)
            | CacheError::InvalidConfig(_)
            | CacheError::TypeMismatch(_) => StatusCode::BAD_REQUEST,
            CacheError::ValueTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::CapacityExceeded(_) | CacheError::NotInitialized(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::OperationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Cancelled(_) => StatusCode::CONFLICT,
            CacheError::Serialization(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// == Error Info ==
/// Serializable error description carried inside structured results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CacheError> for ErrorInfo {
    fn from(error: &CacheError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "error": {
                "kind": self.kind().as_str(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (CacheError::InvalidKey("k".into()), StatusCode::BAD_REQUEST),
            (
                CacheError::ValueTooLarge { size: 10, limit: 5 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                CacheError::CapacityExceeded("full".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (CacheError::OperationTimeout(5), StatusCode::GATEWAY_TIMEOUT),
            (
                CacheError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected_status) in test_cases {
            assert_eq!(error.into_response().status(), expected_status);
        }
    }

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(
            CacheError::TypeMismatch("k".into()).kind().as_str(),
            "TYPE_MISMATCH"
        );
        assert_eq!(
            CacheError::Serialization("x".into()).kind().as_str(),
            "SERIALIZATION_ERROR"
        );
        let json = serde_json::to_string(&ErrorKind::NotInitialized).unwrap();
        assert_eq!(json, "\"NOT_INITIALIZED\"");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CacheError::OperationTimeout(10).is_retryable());
        assert!(!CacheError::InvalidKey("k".into()).is_retryable());
    }
}
