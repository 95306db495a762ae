//! Advisory service error types

use thiserror::Error;

/// Service failure with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[allow(dead_code)] // Raised by inference backends
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Unavailable, message)
    }

    #[allow(dead_code)] // Raised by inference backends
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::InvalidInput, message)
    }

    #[allow(dead_code)] // Raised by inference backends
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Unknown, message)
    }
}

/// Error classification shown next to a failed reply or analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Backend unreachable or overloaded - worth retrying
    Unavailable,
    /// Backend rejected the input (e.g. unreadable photo)
    InvalidInput,
    Unknown,
}

impl ServiceErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Unavailable | Self::Unknown)
    }
}
