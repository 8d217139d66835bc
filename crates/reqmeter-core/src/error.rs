//! Shared error type across reqmeter crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid configuration or timing declaration.
    BadRequest,
    /// A timing annotation cannot be honored (e.g. unnamed long task).
    InvalidArgument,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::InvalidArgument => "INVALID_ARGUMENT",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ReqMeterError>;

/// Unified error type used by core and the HTTP integration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReqMeterError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl ReqMeterError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            ReqMeterError::BadRequest(_) => ClientCode::BadRequest,
            ReqMeterError::InvalidArgument(_) => ClientCode::InvalidArgument,
            ReqMeterError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            ReqMeterError::Internal(_) => ClientCode::Internal,
        }
    }
}
