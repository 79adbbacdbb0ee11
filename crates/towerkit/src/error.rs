//! Error types for controller API operations.
//!
//! Errors are categorized so callers can tell start-up failures (unreachable
//! target, rejected credentials) apart from failures scoped to a single
//! request, which are logged and skipped.

use std::fmt;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of response body characters kept in error messages.
pub const BODY_EXCERPT_LEN: usize = 500;

/// Categories of controller errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Target unreachable (DNS, TCP, TLS, timeout).
    Connectivity,
    /// Credentials rejected or permission denied.
    Auth,
    /// The controller answered with an unexpected status.
    Remote,
    /// The response body could not be understood.
    Format,
}

impl ErrorCategory {
    /// Whether this category aborts a run when it happens before any resource work.
    #[must_use]
    pub fn is_fatal_at_start(&self) -> bool {
        matches!(self, Self::Connectivity | Self::Auth)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Connectivity => "Cannot reach the controller",
            Self::Auth => "Authentication or authorization failed",
            Self::Remote => "Unexpected controller response",
            Self::Format => "Malformed controller response",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Connectivity => "Make sure the host is reachable and the URL is correct",
            Self::Auth => "Check the username/password or token",
            Self::Remote => "Inspect the response body for details",
            Self::Format => "Check that the API prefix points at a controller API",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the controller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not complete the request.
    #[error("cannot connect to {target}: {message}")]
    Connectivity {
        /// URL or host that was being contacted.
        target: String,
        /// Transport error message.
        message: String,
    },

    /// Credentials were rejected.
    #[error("controller rejected credentials (HTTP {status})")]
    Auth {
        /// HTTP status (401 or 403).
        status: u16,
    },

    /// The controller returned an unexpected status.
    #[error("{method} {path} returned HTTP {status}: {body}")]
    Api {
        /// HTTP method.
        method: &'static str,
        /// Request path.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// Response body was not what we expected.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Create an API error, truncating the body.
    pub fn api(method: &'static str, path: impl Into<String>, status: u16, body: &str) -> Self {
        Self::Api {
            method,
            path: path.into(),
            status,
            body: excerpt(body),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Connectivity { .. } => ErrorCategory::Connectivity,
            Error::Auth { .. } => ErrorCategory::Auth,
            Error::Api { status, .. } if *status == 401 || *status == 403 => ErrorCategory::Auth,
            Error::Api { .. } => ErrorCategory::Remote,
            Error::InvalidResponse(_) => ErrorCategory::Format,
        }
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Auth { status } | Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is a 404 from the controller.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Truncate a response body for logging.
pub fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_LEN {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(BODY_EXCERPT_LEN).collect();
        format!("{cut}...")
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
