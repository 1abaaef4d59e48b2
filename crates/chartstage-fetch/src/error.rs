//! Error types for fetch operations

use chartstage_core::{CoreError, ExternalError, ServiceFault, classify};
use thiserror::Error;

/// Fetch operation errors
#[derive(Debug, Error)]
pub enum FetchError {
    // ============ Request Errors ============
    #[error("Invalid source URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    // ============ Object Storage Errors ============
    #[error("Object storage error: {code} - {message}")]
    ObjectStorage {
        /// Service operation that failed, e.g. `GetObject`
        operation: String,
        code: String,
        message: String,
    },

    #[error("Could not determine the region of bucket {bucket}")]
    RegionNotFound { bucket: String },

    // ============ IO Errors ============
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    pub(crate) fn network(url: &str, err: reqwest::Error) -> Self {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Convert into the reportable taxonomy.
    ///
    /// Transfer failures become `Fetch`, service faults keep their code and
    /// anything else is wrapped with `operation` as its source tag.
    pub fn into_core(self, operation: &str) -> CoreError {
        match self {
            FetchError::HttpStatus { url, status } => {
                tracing::error!(%url, status, "{operation}: got response {status}");
                CoreError::Fetch {
                    url,
                    status: Some(status),
                    message: format!("Got response {status}"),
                }
            }
            FetchError::Network { url, message } => {
                tracing::error!(%url, %message, "{operation}: network failure");
                CoreError::Fetch {
                    url,
                    status: None,
                    message,
                }
            }
            FetchError::InvalidUrl { url, reason } => {
                CoreError::validation(format!("{operation}: invalid URL '{url}': {reason}"))
            }
            other => classify(operation, &other),
        }
    }
}

impl ExternalError for FetchError {
    fn service_fault(&self) -> Option<ServiceFault> {
        match self {
            FetchError::ObjectStorage {
                operation,
                code,
                message,
            } => Some(ServiceFault {
                code: code.clone(),
                message: message.clone(),
                origin: Some(operation.clone()),
            }),
            _ => None,
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(e: url::ParseError) -> Self {
        FetchError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
