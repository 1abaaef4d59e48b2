//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use chartstage_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Request, identifier, chart reference or values were invalid
    #[error("Validation failed: {message}")]
    #[diagnostic(code(chartstage::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A download or object storage call failed
    #[error("{message}")]
    #[diagnostic(code(chartstage::cli::fetch))]
    Fetch { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartstage::cli::io))]
    Io { message: String },

    /// The poll ran and reported FAILED
    #[error("Operation failed: {message}")]
    #[diagnostic(code(chartstage::cli::operation))]
    OperationFailed { message: String },

    /// Any other error from a collaborator
    #[error("{message}")]
    #[diagnostic(code(chartstage::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Fetch { .. } => exit_codes::FETCH_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::OperationFailed { .. } | CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: None,
        }
    }

    /// Create a validation error with help text
    pub fn validation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::Validation { .. }
            | CoreError::Decode { .. }
            | CoreError::Parse { .. }
            | CoreError::UnknownStage { .. } => CliError::validation(err.to_string()),
            CoreError::Fetch { .. } | CoreError::Service { .. } => CliError::Fetch {
                message: err.to_string(),
            },
            CoreError::Timeout { .. } | CoreError::External { .. } => CliError::Other {
                message: err.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::validation(format!("invalid JSON: {err}"))
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
