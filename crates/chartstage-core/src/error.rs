//! Core error types
//!
//! Every failure a poll can end with is one of the variants below. The
//! variants carry structured fields so callers branch on the kind instead of
//! matching message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed or contradictory input
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Malformed opaque identifier
    #[error("Invalid identifier: {message}")]
    Decode { message: String },

    /// Transfer did not complete (non-2xx status, connection failure, ...)
    #[error("Failed to fetch {url}: {message}")]
    Fetch {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// Fetched document could not be parsed
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// Elapsed time reached the configured deadline
    #[error("Operation timed out: {elapsed_secs}s elapsed, timeout is {timeout_minutes} minute(s)")]
    Timeout {
        elapsed_secs: i64,
        timeout_minutes: u32,
    },

    /// Callback context carried a stage value this build does not know
    #[error("Unknown stage '{value}' in callback context")]
    UnknownStage { value: String },

    /// Cloud service error with a structured code
    #[error("Error: At {operation} - {code}: {message}")]
    Service {
        operation: String,
        code: String,
        message: String,
        origin: Option<String>,
    },

    /// Any other error bubbled up from an external collaborator
    #[error("Error: At {operation} - {message}")]
    External { operation: String, message: String },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Whether re-polling the same operation may succeed.
    ///
    /// Transfer and collaborator failures can be transient. Everything that
    /// comes from the request itself or from the deadline cannot change by
    /// polling again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Service { .. } | Self::External { .. }
        )
    }

    /// Error code reported to the invoker alongside a failed progress event
    pub fn handler_code(&self) -> HandlerErrorCode {
        match self {
            Self::Validation { .. }
            | Self::Decode { .. }
            | Self::Parse { .. }
            | Self::UnknownStage { .. } => HandlerErrorCode::InvalidRequest,
            Self::Timeout { .. } => HandlerErrorCode::NotStabilized,
            Self::Fetch { .. } => HandlerErrorCode::NetworkFailure,
            Self::Service { .. } => HandlerErrorCode::ServiceInternalError,
            Self::External { .. } => HandlerErrorCode::GeneralServiceException,
        }
    }
}

/// Error codes understood by the invoking lifecycle engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerErrorCode {
    InvalidRequest,
    NotStabilized,
    NetworkFailure,
    ServiceInternalError,
    GeneralServiceException,
}

pub type Result<T> = std::result::Result<T, CoreError>;
