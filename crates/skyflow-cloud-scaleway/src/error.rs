//! Scaleway provider error types

use skyflow_cloud::{Classify, ErrorClass, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScalewayError {
    #[error("Scaleway API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No IP with address {0} in the pool")]
    IpNotFound(String),

    #[error("{kind} {id} is still {state}")]
    Pending {
        kind: ResourceKind,
        id: String,
        state: String,
    },

    #[error("{kind} {id}: {operation} failed: {source}")]
    Operation {
        kind: ResourceKind,
        id: String,
        operation: &'static str,
        #[source]
        source: Box<ScalewayError>,
    },

    #[error("{} failures: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<ScalewayError>),
}

fn join_errors(errors: &[ScalewayError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ScalewayError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        ScalewayError::Api {
            status,
            message: message.into(),
        }
    }

    /// Attach the resource kind, identifier and attempted operation.
    pub fn context(self, kind: ResourceKind, id: impl Into<String>, operation: &'static str) -> Self {
        ScalewayError::Operation {
            kind,
            id: id.into(),
            operation,
            source: Box::new(self),
        }
    }

    /// Collapse collected failures: `None` when empty, the error itself when
    /// there is only one.
    pub fn from_all(mut errors: Vec<ScalewayError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ScalewayError::Multiple(errors)),
        }
    }
}

impl Classify for ScalewayError {
    fn class(&self) -> ErrorClass {
        match self {
            ScalewayError::Api { status, .. } => ErrorClass::from_status(*status),
            ScalewayError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    ErrorClass::Retryable
                } else if let Some(status) = e.status() {
                    ErrorClass::from_status(status.as_u16())
                } else if e.is_request() {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::Terminal
                }
            }
            ScalewayError::Pending { .. } => ErrorClass::Retryable,
            ScalewayError::Operation { source, .. } => source.class(),
            _ => ErrorClass::Terminal,
        }
    }
}

/// Adds operation context to results coming out of a reconciler step.
pub trait ResultExt<T> {
    fn context(self, kind: ResourceKind, id: &str, operation: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, kind: ResourceKind, id: &str, operation: &'static str) -> Result<T> {
        self.map_err(|e| e.context(kind, id, operation))
    }
}

pub type Result<T> = std::result::Result<T, ScalewayError>;
