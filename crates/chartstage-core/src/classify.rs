//! Normalization of collaborator errors into [`CoreError`]

use crate::error::CoreError;

/// Structured detail exposed by errors that come from a cloud service API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFault {
    pub code: String,
    pub message: String,
    pub origin: Option<String>,
}

/// An error raised by something outside this workspace (object storage,
/// the chart engine, the cluster credential provider, the filesystem).
pub trait ExternalError: std::error::Error {
    /// The service fault behind this error, when it came from a service API
    fn service_fault(&self) -> Option<ServiceFault> {
        None
    }
}

impl ExternalError for std::io::Error {}

/// Wrap `err` into the uniform reportable form.
///
/// `operation` names what was being attempted and prefixes the message.
pub fn classify<E>(operation: &str, err: &E) -> CoreError
where
    E: ExternalError + ?Sized,
{
    match err.service_fault() {
        Some(fault) => {
            tracing::error!(
                operation,
                code = %fault.code,
                message = %fault.message,
                origin = fault.origin.as_deref().unwrap_or(""),
                "service error"
            );
            CoreError::Service {
                operation: operation.to_string(),
                code: fault.code,
                message: fault.message,
                origin: fault.origin,
            }
        }
        None => {
            tracing::error!(operation, error = %err, "operation failed");
            CoreError::External {
                operation: operation.to_string(),
                message: err.to_string(),
            }
        }
    }
}
