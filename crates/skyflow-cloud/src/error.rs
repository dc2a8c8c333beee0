//! Cloud core error types and failure classification

use thiserror::Error;

/// How a failed remote call should be treated by the layers above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The provider reports the resource as absent.
    NotFound,
    /// Network, timeout or 5xx-class failure. Worth another attempt.
    Retryable,
    /// Validation, conflict or any failure a retry cannot resolve.
    Terminal,
}

impl ErrorClass {
    /// Classify a provider status code.
    ///
    /// 404 is the only code with core-level meaning; 408, 429 and 5xx are
    /// transient, everything else is terminal.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => ErrorClass::NotFound,
            408 | 429 => ErrorClass::Retryable,
            500..=599 => ErrorClass::Retryable,
            _ => ErrorClass::Terminal,
        }
    }

    pub fn is_retryable(self) -> bool {
        self == ErrorClass::Retryable
    }
}

/// Errors that can be sorted into an [`ErrorClass`].
pub trait Classify {
    fn class(&self) -> ErrorClass;

    fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

/// Cloud core errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local state failures are never worth retrying
impl Classify for CloudError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Terminal
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
