//! Common error types shared across crates.

use thiserror::Error;

/// Error condition carried from any pipeline stage to the error page.
///
/// Variants map to HTTP status codes rendered to the client:
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::Upstream`] → 500
/// - [`ServiceError::Status`] → whatever status the raising handler chose
///
/// The `Display` output is the message shown to end users. Internal detail
/// lives in [`ServiceError::detail`] and is only rendered in development.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// No route matched the request path.
    #[error("Not Found")]
    NotFound,

    /// A dependency (session store, identity store, template, compiler) failed.
    #[error("Internal Server Error")]
    Upstream {
        /// Diagnostic text for development builds.
        detail: String,
    },

    /// A route handler signalled a domain-specific failure.
    #[error("{message}")]
    Status {
        /// HTTP status code to answer with.
        status: u16,
        /// Message safe to show to users.
        message: String,
        /// Optional diagnostic text for development builds.
        detail: Option<String>,
    },
}

impl ServiceError {
    /// Shorthand for an upstream failure with the given diagnostic detail.
    pub fn upstream(detail: impl Into<String>) -> Self {
        ServiceError::Upstream {
            detail: detail.into(),
        }
    }

    /// Shorthand for a handler-raised error without detail.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ServiceError::Status {
            status,
            message: message.into(),
            detail: None,
        }
    }

    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::NotFound => 404,
            ServiceError::Upstream { .. } => 500,
            ServiceError::Status { status, .. } => *status,
        }
    }

    /// Diagnostic detail, if any. Never shown outside development.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ServiceError::NotFound => None,
            ServiceError::Upstream { detail } => Some(detail),
            ServiceError::Status { detail, .. } => detail.as_deref(),
        }
    }
}
