//! Structured error taxonomy shared by every component (§7).
//!
//! `ErrorKind` is the classification the HTTP layer and processors switch
//! on; `CoreError` is the concrete `thiserror` type carrying a message plus
//! that classification. Components never construct ad-hoc error types —
//! everything that can fail surfaces a `CoreError`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputInvalid,
    NotFound,
    Conflict,
    OrderViolation,
    ResourceUnsupported,
    ChainUnavailable,
    PricingStale,
    AuthorizationRequired,
    Internal,
}

impl ErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InputInvalid => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::OrderViolation => 409,
            ErrorKind::ResourceUnsupported => 422,
            ErrorKind::ChainUnavailable | ErrorKind::PricingStale => 503,
            ErrorKind::AuthorizationRequired => 403,
            ErrorKind::Internal => 500,
        }
    }

    /// Transient errors are retried by queue workers; all others fail the
    /// job permanently (§7 propagation rules).
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::ChainUnavailable | ErrorKind::PricingStale)
    }
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub retry_after_ms: Option<u64>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn with_retry_after(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }

    pub fn input_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputInvalid, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn order_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OrderViolation, message)
    }

    pub fn chain_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ChainUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<sea_orm::DbErr> for CoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        CoreError::internal(err.to_string())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::internal(err.to_string())
    }
}
