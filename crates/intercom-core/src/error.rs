//! Error taxonomy for orchestrator operations.
//!
//! Every orchestrator operation returns exactly one typed error carrying a
//! kind and a message. The API adapter maps kinds to HTTP statuses 1:1 and
//! never leaks internal detail for `Internal`.

use thiserror::Error;

/// Classification of a call operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request, e.g. a self-call. Maps to 400.
    Validation,
    /// Call or callee absent. Maps to 404.
    NotFound,
    /// A non-participant tried to mutate the call. Maps to 401.
    Unauthorized,
    /// Terminal-state violation, unreachable callee, or exhausted
    /// concurrency retries. Maps to 409.
    Conflict,
    /// Unexpected port or storage failure. Maps to 500.
    Internal,
}

impl ErrorKind {
    /// The HTTP status this kind maps to.
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }
}

/// A call operation failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CallError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CallError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.kind.status()
    }
}
